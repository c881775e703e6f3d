use chrono::Utc;
use secrecy::ExposeSecret;

use procura_core::config::AppConfig;
use procura_core::domain::credential::AutomationCredential;
use procura_core::vault::CredentialVault;
use procura_db::repositories::{CredentialRepository, SqlCredentialRepository};
use procura_db::{connect_with_settings, migrations, DbPool};

use crate::commands::{self, exit, CommandFailure, CommandResult};

/// Encrypts the password under the configured vault key and stores the
/// credential row. Plaintext never reaches the database.
pub fn set(email: &str, password: &str, marketplace: Option<&str>) -> CommandResult {
    let command = "credentials-set";

    if email.trim().is_empty() || password.is_empty() {
        return CommandResult::failure(
            command,
            "validation",
            "email and password are both required",
            exit::CONFIG,
        );
    }

    let config = match commands::load_config(command) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let key = config.vault.key.expose_secret().to_string();
    if key.trim().is_empty() {
        return CommandResult::failure(
            command,
            "vault_key",
            "vault.key must be configured before storing credentials",
            exit::CONFIG,
        );
    }
    let vault = match CredentialVault::new(key.as_bytes()) {
        Ok(vault) => vault,
        Err(error) => {
            return CommandResult::failure(command, "vault_key", error.to_string(), exit::CONFIG);
        }
    };

    let encrypted_password = match vault.encrypt(password) {
        Ok(ciphertext) => ciphertext,
        Err(error) => {
            return CommandResult::failure(command, "encryption", error.to_string(), exit::RUNTIME);
        }
    };

    let marketplace =
        marketplace.unwrap_or(config.automation.marketplace.as_str()).to_string();

    with_pool(command, &config, |pool| async move {
        let repo = SqlCredentialRepository::new(pool);
        let now = Utc::now();
        // Keep the original creation time on overwrite.
        let created_at = repo
            .get()
            .await
            .map_err(|error| ("db_read", error.to_string(), exit::DATABASE))?
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        repo.upsert(&AutomationCredential {
            email: email.to_string(),
            encrypted_password,
            marketplace,
            is_active: true,
            last_test_status: None,
            last_test_message: None,
            last_tested_at: None,
            created_at,
            updated_at: now,
        })
        .await
        .map_err(|error| ("db_write", error.to_string(), exit::DATABASE))?;

        Ok(CommandResult::success(command, "storefront credential stored"))
    })
}

/// Reports configuration state without decrypting anything.
pub fn status() -> CommandResult {
    let command = "credentials-status";

    let config = match commands::load_config(command) {
        Ok(config) => config,
        Err(result) => return result,
    };

    with_pool(command, &config, |pool| async move {
        let repo = SqlCredentialRepository::new(pool);
        let credential =
            repo.get().await.map_err(|error| ("db_read", error.to_string(), exit::DATABASE))?;

        let message = match credential {
            None => "configured: false".to_string(),
            Some(credential) => {
                let last_test = match (&credential.last_test_status, &credential.last_tested_at) {
                    (Some(status), Some(tested_at)) => {
                        format!("{status} at {}", tested_at.to_rfc3339())
                    }
                    _ => "never".to_string(),
                };
                format!(
                    "configured: {}, active: {}, email: {}, marketplace: {}, last_test: {last_test}",
                    credential.is_configured(),
                    credential.is_active,
                    credential.email,
                    credential.marketplace,
                )
            }
        };
        Ok(CommandResult::success(command, message))
    })
}

fn with_pool<F, Fut>(command: &str, config: &AppConfig, operation: F) -> CommandResult
where
    F: FnOnce(DbPool) -> Fut,
    Fut: std::future::Future<Output = Result<CommandResult, CommandFailure>>,
{
    let outcome = commands::block_on(command, async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), exit::CONNECT))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), exit::DATABASE))?;

        let result = operation(pool.clone()).await;
        pool.close().await;
        result
    });

    match outcome {
        Ok(Ok(result)) => result,
        Ok(Err((error_class, message, exit_code))) => {
            CommandResult::failure(command, error_class, message, exit_code)
        }
        Err(result) => result,
    }
}
