pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "procura",
    about = "Procura operator CLI",
    long_about = "Operate Procura migrations, config inspection, and storefront credential management.",
    after_help = "Examples:\n  procura migrate\n  procura config\n  procura credentials status"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// Show effective configuration with per-field source attribution
    Config,
    #[command(subcommand, about = "Manage the storefront automation credential")]
    Credentials(CredentialsCommand),
}

#[derive(Debug, Subcommand)]
enum CredentialsCommand {
    /// Encrypt and store the storefront login credential
    Set {
        #[arg(long, help = "Storefront account email")]
        email: String,
        #[arg(long, help = "Storefront account password; encrypted before storage")]
        password: String,
        #[arg(long, help = "Storefront domain; defaults to the configured marketplace")]
        marketplace: Option<String>,
    },
    /// Show whether an automation credential is configured and active
    Status,
}

impl Command {
    fn execute(self) -> CommandResult {
        match self {
            Self::Migrate => commands::migrate::run(),
            Self::Config => CommandResult { exit_code: 0, output: commands::config::run() },
            Self::Credentials(CredentialsCommand::Set { email, password, marketplace }) => {
                commands::credentials::set(&email, &password, marketplace.as_deref())
            }
            Self::Credentials(CredentialsCommand::Status) => commands::credentials::status(),
        }
    }
}

pub fn run() -> ExitCode {
    let result = Cli::parse().command.execute();
    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
