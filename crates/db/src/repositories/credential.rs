use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use procura_core::domain::credential::AutomationCredential;

use super::{decode_utc, decode_utc_opt, CredentialRepository, RepositoryError};
use crate::DbPool;

/// One credential row per deployment, pinned to id 1.
pub struct SqlCredentialRepository {
    pool: DbPool,
}

impl SqlCredentialRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CredentialRepository for SqlCredentialRepository {
    async fn get(&self) -> Result<Option<AutomationCredential>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                email,
                encrypted_password,
                marketplace,
                is_active,
                last_test_status,
                last_test_message,
                last_tested_at,
                created_at,
                updated_at
             FROM automation_credential
             WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(credential_from_row).transpose()
    }

    async fn upsert(&self, credential: &AutomationCredential) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO automation_credential (
                id,
                email,
                encrypted_password,
                marketplace,
                is_active,
                last_test_status,
                last_test_message,
                last_tested_at,
                created_at,
                updated_at
             ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                encrypted_password = excluded.encrypted_password,
                marketplace = excluded.marketplace,
                is_active = excluded.is_active,
                last_test_status = excluded.last_test_status,
                last_test_message = excluded.last_test_message,
                last_tested_at = excluded.last_tested_at,
                updated_at = excluded.updated_at",
        )
        .bind(&credential.email)
        .bind(&credential.encrypted_password)
        .bind(&credential.marketplace)
        .bind(credential.is_active)
        .bind(credential.last_test_status.as_deref())
        .bind(credential.last_test_message.as_deref())
        .bind(credential.last_tested_at.map(|value| value.to_rfc3339()))
        .bind(credential.created_at.to_rfc3339())
        .bind(credential.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_test(
        &self,
        status: &str,
        message: Option<&str>,
        tested_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE automation_credential
             SET last_test_status = ?,
                 last_test_message = ?,
                 last_tested_at = ?,
                 updated_at = ?
             WHERE id = 1",
        )
        .bind(status)
        .bind(message)
        .bind(tested_at.to_rfc3339())
        .bind(tested_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn credential_from_row(row: SqliteRow) -> Result<AutomationCredential, RepositoryError> {
    Ok(AutomationCredential {
        email: row.try_get("email")?,
        encrypted_password: row.try_get("encrypted_password")?,
        marketplace: row.try_get("marketplace")?,
        is_active: row.try_get("is_active")?,
        last_test_status: row.try_get("last_test_status")?,
        last_test_message: row.try_get("last_test_message")?,
        last_tested_at: decode_utc_opt("last_tested_at", row.try_get("last_tested_at")?)?,
        created_at: decode_utc("created_at", row.try_get("created_at")?)?,
        updated_at: decode_utc("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use procura_core::domain::credential::AutomationCredential;

    use super::SqlCredentialRepository;
    use crate::migrations;
    use crate::repositories::CredentialRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn sample_credential() -> AutomationCredential {
        AutomationCredential {
            email: "ops@example.com".to_string(),
            encrypted_password: "bm9uY2UtYW5kLWNpcGhlcnRleHQ=".to_string(),
            marketplace: "amazon.com".to_string(),
            is_active: true,
            last_test_status: None,
            last_test_message: None,
            last_tested_at: None,
            created_at: parse_ts("2026-03-01T09:00:00+00:00"),
            updated_at: parse_ts("2026-03-01T09:00:00+00:00"),
        }
    }

    #[tokio::test]
    async fn get_returns_none_before_first_upsert() {
        let pool = setup_pool().await;
        let repo = SqlCredentialRepository::new(pool.clone());

        assert_eq!(repo.get().await.expect("get"), None);

        pool.close().await;
    }

    #[tokio::test]
    async fn upsert_replaces_the_singleton_row() {
        let pool = setup_pool().await;
        let repo = SqlCredentialRepository::new(pool.clone());

        let credential = sample_credential();
        repo.upsert(&credential).await.expect("first upsert");
        assert_eq!(repo.get().await.expect("get"), Some(credential.clone()));

        let mut updated = credential.clone();
        updated.is_active = false;
        updated.last_test_status = Some("failed".to_string());
        updated.last_test_message = Some("login rejected".to_string());
        updated.last_tested_at = Some(parse_ts("2026-03-02T09:00:00+00:00"));
        updated.updated_at = parse_ts("2026-03-02T09:00:00+00:00");

        repo.upsert(&updated).await.expect("second upsert");
        assert_eq!(repo.get().await.expect("get"), Some(updated));

        pool.close().await;
    }

    #[tokio::test]
    async fn record_test_updates_only_the_test_columns() {
        let pool = setup_pool().await;
        let repo = SqlCredentialRepository::new(pool.clone());

        let credential = sample_credential();
        repo.upsert(&credential).await.expect("upsert");

        let tested_at = parse_ts("2026-03-03T12:00:00+00:00");
        repo.record_test("failed", Some("login rejected"), tested_at)
            .await
            .expect("record test");

        let stored = repo.get().await.expect("get").expect("row present");
        assert_eq!(stored.last_test_status.as_deref(), Some("failed"));
        assert_eq!(stored.last_test_message.as_deref(), Some("login rejected"));
        assert_eq!(stored.last_tested_at, Some(tested_at));
        assert_eq!(stored.email, credential.email);
        assert_eq!(stored.encrypted_password, credential.encrypted_password);

        pool.close().await;
    }

    #[tokio::test]
    async fn record_test_without_a_row_is_a_no_op() {
        let pool = setup_pool().await;
        let repo = SqlCredentialRepository::new(pool.clone());

        repo.record_test("ok", None, parse_ts("2026-03-03T12:00:00+00:00"))
            .await
            .expect("record test");
        assert_eq!(repo.get().await.expect("get"), None);

        pool.close().await;
    }
}
