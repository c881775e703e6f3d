use std::env;
use std::fmt::Display;
use std::fs;
use std::path::PathBuf;

use procura_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// Lists every effective config value with the layer it came from. Secrets
/// are reported as present or absent, never printed.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let mut report = Report::against_config_file();
    report.field("database.url", &config.database.url);
    report.field("database.max_connections", config.database.max_connections);
    report.field("database.timeout_secs", config.database.timeout_secs);

    report.field("automation.enabled", config.automation.enabled);
    report.field("automation.webdriver_url", &config.automation.webdriver_url);
    report.field("automation.marketplace", &config.automation.marketplace);
    report.field("automation.timeout_secs", config.automation.timeout_secs);
    report.field("automation.poll_interval_secs", config.automation.poll_interval_secs);
    report.field("automation.confirmation", format!("{:?}", config.automation.confirmation));

    let vault_key = if config.vault.key.expose_secret().trim().is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    };
    report.field("vault.key", vault_key);

    report.field("server.bind_address", &config.server.bind_address);
    report.field("server.health_check_port", config.server.health_check_port);
    report.field("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs);

    report.field("logging.level", &config.logging.level);
    report.field("logging.format", format!("{:?}", config.logging.format));

    report.render()
}

struct Report {
    file_path: Option<PathBuf>,
    file_doc: Option<Value>,
    lines: Vec<String>,
}

impl Report {
    /// Reads whichever config file `AppConfig::load` would have picked up,
    /// so source attribution matches what actually loaded.
    fn against_config_file() -> Self {
        let file_path = ["procura.toml", "config/procura.toml"]
            .into_iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists());
        let file_doc = file_path
            .as_deref()
            .and_then(|path| fs::read_to_string(path).ok())
            .and_then(|raw| raw.parse::<Value>().ok());

        Self { file_path, file_doc, lines: Vec::new() }
    }

    fn field(&mut self, key: &str, value: impl Display) {
        let source = self.source_of(key);
        self.lines.push(format!("- {key} = {value} (source: {source})"));
    }

    fn source_of(&self, key: &str) -> String {
        if let Some(env_key) = set_env_key(key) {
            return format!("env ({env_key})");
        }

        if self.file_doc.as_ref().is_some_and(|doc| contains_path(doc, key)) {
            let path = self
                .file_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({path})");
        }

        "default".to_string()
    }

    fn render(&self) -> String {
        let mut out =
            vec!["effective config (source precedence: env > file > default):".to_string()];
        out.extend(self.lines.iter().cloned());
        out.join("\n")
    }
}

/// Env var names follow the key path (`database.url` reads
/// `PROCURA_DATABASE_URL`); the logging keys also accept short aliases.
fn set_env_key(key: &str) -> Option<String> {
    let derived = format!("PROCURA_{}", key.replace('.', "_").to_uppercase());
    if env::var_os(&derived).is_some() {
        return Some(derived);
    }

    let alias = match key {
        "logging.level" => "PROCURA_LOG_LEVEL",
        "logging.format" => "PROCURA_LOG_FORMAT",
        _ => return None,
    };
    env::var_os(alias).is_some().then(|| alias.to_string())
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
