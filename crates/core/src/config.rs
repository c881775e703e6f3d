use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vault::KEY_LEN;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub automation: AutomationConfig,
    pub vault: VaultConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AutomationConfig {
    pub enabled: bool,
    pub webdriver_url: String,
    pub marketplace: String,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub confirmation: ConfirmationMode,
}

#[derive(Clone, Debug)]
pub struct VaultConfig {
    pub key: SecretString,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// How an add-to-cart click is judged. Optimistic treats a successful click
/// as success even when no confirmation marker renders; strict requires one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationMode {
    Optimistic,
    Strict,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub vault_key: Option<String>,
    pub automation_enabled: Option<bool>,
    pub webdriver_url: Option<String>,
    pub marketplace: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("config file not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("config interpolation references unset variable `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated `${{` interpolation expression in config file")]
    UnterminatedInterpolation,
    #[error("environment override `{key}` has invalid value `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://procura.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            automation: AutomationConfig {
                enabled: false,
                webdriver_url: "http://localhost:9515".to_string(),
                marketplace: "amazon.com".to_string(),
                timeout_secs: 45,
                poll_interval_secs: 5,
                confirmation: ConfirmationMode::Optimistic,
            },
            vault: VaultConfig { key: String::new().into() },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for ConfirmationMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "optimistic" => Ok(Self::Optimistic),
            "strict" => Ok(Self::Strict),
            other => Err(ConfigError::Validation(format!(
                "confirmation mode must be optimistic or strict, got `{other}`"
            ))),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "log format must be compact, pretty, or json, got `{other}`"
            ))),
        }
    }
}

impl AppConfig {
    /// Layered load: defaults, then the config file, then `PROCURA_*`
    /// environment variables, then programmatic overrides. Later layers win.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => config.apply_patch(read_patch(&path)?),
            None if options.require_file => {
                let expected =
                    options.config_path.unwrap_or_else(|| PathBuf::from("procura.toml"));
                return Err(ConfigError::MissingConfigFile(expected));
            }
            None => {}
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            merge(&mut self.database.url, database.url);
            merge(&mut self.database.max_connections, database.max_connections);
            merge(&mut self.database.timeout_secs, database.timeout_secs);
        }
        if let Some(automation) = patch.automation {
            merge(&mut self.automation.enabled, automation.enabled);
            merge(&mut self.automation.webdriver_url, automation.webdriver_url);
            merge(&mut self.automation.marketplace, automation.marketplace);
            merge(&mut self.automation.timeout_secs, automation.timeout_secs);
            merge(&mut self.automation.poll_interval_secs, automation.poll_interval_secs);
            merge(&mut self.automation.confirmation, automation.confirmation);
        }
        if let Some(key) = patch.vault.and_then(|vault| vault.key) {
            self.vault.key = SecretString::from(key);
        }
        if let Some(server) = patch.server {
            merge(&mut self.server.bind_address, server.bind_address);
            merge(&mut self.server.health_check_port, server.health_check_port);
            merge(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }
        if let Some(logging) = patch.logging {
            merge(&mut self.logging.level, logging.level);
            merge(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        merge(&mut self.database.url, read_env("PROCURA_DATABASE_URL"));
        env_parsed(&mut self.database.max_connections, "PROCURA_DATABASE_MAX_CONNECTIONS")?;
        env_parsed(&mut self.database.timeout_secs, "PROCURA_DATABASE_TIMEOUT_SECS")?;

        env_parsed(&mut self.automation.enabled, "PROCURA_AUTOMATION_ENABLED")?;
        merge(&mut self.automation.webdriver_url, read_env("PROCURA_AUTOMATION_WEBDRIVER_URL"));
        merge(&mut self.automation.marketplace, read_env("PROCURA_AUTOMATION_MARKETPLACE"));
        env_parsed(&mut self.automation.timeout_secs, "PROCURA_AUTOMATION_TIMEOUT_SECS")?;
        env_parsed(&mut self.automation.poll_interval_secs, "PROCURA_AUTOMATION_POLL_INTERVAL_SECS")?;
        if let Some(value) = read_env("PROCURA_AUTOMATION_CONFIRMATION") {
            self.automation.confirmation = value.parse()?;
        }

        if let Some(value) = read_env("PROCURA_VAULT_KEY") {
            self.vault.key = SecretString::from(value);
        }

        merge(&mut self.server.bind_address, read_env("PROCURA_SERVER_BIND_ADDRESS"));
        env_parsed(&mut self.server.health_check_port, "PROCURA_SERVER_HEALTH_CHECK_PORT")?;
        env_parsed(&mut self.server.graceful_shutdown_secs, "PROCURA_SERVER_GRACEFUL_SHUTDOWN_SECS")?;

        // The short LOG_* aliases match what operators usually reach for.
        merge(
            &mut self.logging.level,
            read_env("PROCURA_LOGGING_LEVEL").or_else(|| read_env("PROCURA_LOG_LEVEL")),
        );
        if let Some(value) =
            read_env("PROCURA_LOGGING_FORMAT").or_else(|| read_env("PROCURA_LOG_FORMAT"))
        {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        merge(&mut self.database.url, overrides.database_url);
        merge(&mut self.logging.level, overrides.log_level);
        if let Some(key) = overrides.vault_key {
            self.vault.key = SecretString::from(key);
        }
        merge(&mut self.automation.enabled, overrides.automation_enabled);
        merge(&mut self.automation.webdriver_url, overrides.webdriver_url);
        merge(&mut self.automation.marketplace, overrides.marketplace);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_database()?;
        self.validate_automation()?;
        self.validate_vault()?;
        self.validate_server()?;
        self.validate_logging()
    }

    fn validate_database(&self) -> Result<(), ConfigError> {
        let url = self.database.url.trim();
        require(
            url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:",
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
        )?;
        require(
            self.database.max_connections > 0,
            "database.max_connections must be greater than zero",
        )?;
        require(
            (1..=300).contains(&self.database.timeout_secs),
            "database.timeout_secs must be in range 1..=300",
        )
    }

    fn validate_automation(&self) -> Result<(), ConfigError> {
        let automation = &self.automation;
        require(
            (1..=300).contains(&automation.timeout_secs),
            "automation.timeout_secs must be in range 1..=300",
        )?;
        require(
            (1..=3600).contains(&automation.poll_interval_secs),
            "automation.poll_interval_secs must be in range 1..=3600",
        )?;

        if !automation.enabled {
            return Ok(());
        }
        let url = automation.webdriver_url.trim();
        require(
            url.starts_with("http://") || url.starts_with("https://"),
            "automation.webdriver_url must start with http:// or https://",
        )?;
        require(
            !automation.marketplace.trim().is_empty(),
            "automation.marketplace must not be empty when automation is enabled",
        )
    }

    fn validate_vault(&self) -> Result<(), ConfigError> {
        let key = self.vault.key.expose_secret();
        if key.is_empty() {
            // An empty key only matters once the worker needs to decrypt.
            return require(
                !self.automation.enabled,
                "vault.key is required when automation is enabled. Provide a 32-byte key via PROCURA_VAULT_KEY",
            );
        }
        if key.len() != KEY_LEN {
            return Err(ConfigError::Validation(format!(
                "vault.key must be exactly {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        require(
            self.server.health_check_port > 0,
            "server.health_check_port must be greater than zero",
        )?;
        require(
            self.server.graceful_shutdown_secs > 0,
            "server.graceful_shutdown_secs must be greater than zero",
        )
    }

    fn validate_logging(&self) -> Result<(), ConfigError> {
        let level = self.logging.level.trim().to_ascii_lowercase();
        require(
            matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error"),
            "logging.level must be one of trace|debug|info|warn|error",
        )
    }
}

fn merge<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn require(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Validation(message.to_string()))
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => ["procura.toml", "config/procura.toml"]
            .into_iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists()),
    }
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${VAR}` in the raw file text with the named environment
/// variable. Unset variables are an error, not an empty string.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let expression = &rest[start + 2..];
        let Some(end) = expression.find('}') else {
            return Err(ConfigError::UnterminatedInterpolation);
        };
        let var = &expression[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        output.push_str(&value);
        rest = &expression[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parsed<T: FromStr>(slot: &mut T, key: &str) -> Result<(), ConfigError> {
    if let Some(value) = read_env(key) {
        *slot = value.parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        })?;
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    automation: Option<AutomationPatch>,
    vault: Option<VaultPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AutomationPatch {
    enabled: Option<bool>,
    webdriver_url: Option<String>,
    marketplace: Option<String>,
    timeout_secs: Option<u64>,
    poll_interval_secs: Option<u64>,
    confirmation: Option<ConfirmationMode>,
}

#[derive(Debug, Default, Deserialize)]
struct VaultPatch {
    key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
