pub mod config;
pub mod credentials;
pub mod migrate;

use procura_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

/// Exit codes shared across subcommands, ordered by how early in the command
/// lifecycle the failure happens.
pub mod exit {
    pub const OK: u8 = 0;
    pub const CONFIG: u8 = 2;
    pub const RUNTIME: u8 = 3;
    pub const CONNECT: u8 = 4;
    pub const DATABASE: u8 = 5;
}

/// Failure triple carried out of async command bodies: error class, message,
/// exit code.
pub(crate) type CommandFailure = (&'static str, String, u8);

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    command: &'a str,
    status: &'a str,
    error_class: Option<&'a str>,
    message: &'a str,
}

impl CommandResult {
    pub fn success(command: &str, message: impl AsRef<str>) -> Self {
        Self {
            exit_code: exit::OK,
            output: render(Envelope {
                command,
                status: "ok",
                error_class: None,
                message: message.as_ref(),
            }),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl AsRef<str>,
        exit_code: u8,
    ) -> Self {
        Self {
            exit_code,
            output: render(Envelope {
                command,
                status: "error",
                error_class: Some(error_class),
                message: message.as_ref(),
            }),
        }
    }
}

fn render(envelope: Envelope<'_>) -> String {
    serde_json::to_string(&envelope).unwrap_or_else(|error| {
        let message = error.to_string().replace('\\', "\\\\").replace('"', "\\\"");
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{message}\"}}"
        )
    })
}

/// Loads and validates the layered configuration, mapping failure to the
/// command's error envelope.
pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            exit::CONFIG,
        )
    })
}

/// Runs an async command body on a fresh current-thread runtime.
pub(crate) fn block_on<T>(
    command: &str,
    body: impl std::future::Future<Output = T>,
) -> Result<T, CommandResult> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                exit::RUNTIME,
            )
        },
    )?;
    Ok(runtime.block_on(body))
}
