pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "backoffice",
    about = "Backoffice request workflow operator CLI",
    long_about = "Operate the backoffice request service: readiness, migrations, demo data, config inspection, and remote request listing.",
    after_help = "Examples:\n  backoffice doctor --json\n  backoffice seed\n  backoffice requests --server http://127.0.0.1:8080 --kind permit"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks and return structured status output")]
    Start,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load deterministic demo requests for every request kind and verify them")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, API token readiness, storage, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List requests from a running server")]
    Requests {
        #[arg(long, help = "Base URL of the running server, e.g. http://127.0.0.1:8080")]
        server: String,
        #[arg(long, help = "Filter by request kind (private_purchase, equipment_purchase, client_request, permit)")]
        kind: Option<String>,
        #[arg(long, help = "Filter by status wire name")]
        status: Option<String>,
        #[arg(long, default_value = "operator", help = "Value for the x-actor-id header")]
        actor_id: String,
        #[arg(long, default_value = "operator@localhost", help = "Value for the x-actor-email header")]
        actor_email: String,
        #[arg(long, default_value = "admin", help = "Value for the x-actor-role header")]
        actor_role: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start => commands::start::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Requests { server, kind, status, actor_id, actor_email, actor_role } => {
            commands::requests::run(commands::requests::RequestsArgs {
                server,
                kind,
                status,
                actor_id,
                actor_email,
                actor_role,
            })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
