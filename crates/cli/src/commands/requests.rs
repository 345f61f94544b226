//! Remote listing against a running server.
//!
//! The list endpoint answers with a paged envelope; older gateways in front
//! of it answer with bare arrays or `data`/`result` wrappers. All of them go
//! through `decode_rows`.

use crate::commands::{load_config, runtime, CommandResult};
use backoffice_core::decode_rows;
use backoffice_core::domain::request::Request;
use secrecy::ExposeSecret;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct RequestsArgs {
    pub server: String,
    pub kind: Option<String>,
    pub status: Option<String>,
    pub actor_id: String,
    pub actor_email: String,
    pub actor_role: String,
}

pub fn run(args: RequestsArgs) -> CommandResult {
    let config = match load_config("requests") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("requests") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let url = format!("{}/api/v1/requests", args.server.trim_end_matches('/'));
    let query: Vec<(&str, &str)> = [("kind", args.kind.as_deref()), ("status", args.status.as_deref())]
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect();

    let result = runtime.block_on(async {
        let response = reqwest::Client::new()
            .get(&url)
            .query(&query)
            .bearer_auth(config.auth.api_token.expose_secret())
            .header("x-actor-id", &args.actor_id)
            .header("x-actor-email", &args.actor_email)
            .header("x-actor-role", &args.actor_role)
            .send()
            .await
            .map_err(|error| ("server_unreachable", error.to_string(), 4u8))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|error| ("response_decode", error.to_string(), 5u8))?;
        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("server answered {status}"));
            return Err(("server_error", message, 6u8));
        }

        decode_rows::<Request>(body).map_err(|error| ("response_decode", error.to_string(), 5u8))
    });

    match result {
        Ok(rows) => CommandResult::success("requests", render_rows(&rows)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("requests", error_class, message, exit_code)
        }
    }
}

fn render_rows(rows: &[Request]) -> String {
    if rows.is_empty() {
        return "no requests matched".to_string();
    }
    let lines: Vec<String> = rows
        .iter()
        .map(|request| {
            format!(
                "  - {} [{}] {} v{} by {}",
                request.id, request.kind, request.status, request.version, request.created_by.email
            )
        })
        .collect();
    format!("{} request(s):\n{}", rows.len(), lines.join("\n"))
}
