use std::process::ExitCode;

fn main() -> ExitCode {
    backoffice_cli::run()
}
