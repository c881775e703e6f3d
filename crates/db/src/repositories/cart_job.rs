use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use procura_core::domain::job::{CartJob, CartJobId, CartJobState};
use procura_core::domain::request::RequestId;

use super::{decode_u32, decode_utc, CartJobRepository, RepositoryError};
use crate::DbPool;

const JOB_COLUMNS: &str =
    "id, request_id, product_url, quantity, state, attempt_count, last_error, created_at, updated_at";

pub struct SqlCartJobRepository {
    pool: DbPool,
}

impl SqlCartJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CartJobRepository for SqlCartJobRepository {
    async fn enqueue(&self, job: &CartJob) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO cart_job (
                id, request_id, product_url, quantity, state, attempt_count, last_error,
                created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.id.0)
        .bind(&job.request_id.0)
        .bind(&job.product_url)
        .bind(i64::from(job.quantity))
        .bind(job.state.as_str())
        .bind(i64::from(job.attempt_count))
        .bind(job.last_error.as_deref())
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<CartJob>, RepositoryError> {
        // Single worker: select-then-guard is enough; the guarded UPDATE still
        // protects against a concurrent claim.
        let candidate = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM cart_job
             WHERE state = 'queued'
             ORDER BY created_at ASC, id ASC
             LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = candidate else {
            return Ok(None);
        };
        let job = job_from_row(row)?;

        let result = sqlx::query(
            "UPDATE cart_job
             SET state = 'running', attempt_count = attempt_count + 1, updated_at = ?
             WHERE id = ? AND state = 'queued'",
        )
        .bind(now.to_rfc3339())
        .bind(&job.id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(CartJob {
            state: CartJobState::Running,
            attempt_count: job.attempt_count + 1,
            updated_at: now,
            ..job
        }))
    }

    async fn mark_completed(
        &self,
        id: &CartJobId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE cart_job SET state = 'completed', last_error = NULL, updated_at = ?
             WHERE id = ?",
        )
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(
        &self,
        id: &CartJobId,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE cart_job SET state = 'failed', last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn requeue(&self, id: &CartJobId, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE cart_job SET state = 'queued', updated_at = ?
             WHERE id = ? AND state = 'failed'",
        )
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_id(&self, id: &CartJobId) -> Result<Option<CartJob>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM cart_job WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(job_from_row).transpose()
    }

    async fn latest_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<CartJob>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM cart_job
             WHERE request_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        ))
        .bind(&request_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(job_from_row).transpose()
    }
}

fn job_from_row(row: SqliteRow) -> Result<CartJob, RepositoryError> {
    let state_raw = row.try_get::<String, _>("state")?;
    let state = CartJobState::parse(&state_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown cart job state `{state_raw}`")))?;

    Ok(CartJob {
        id: CartJobId(row.try_get("id")?),
        request_id: RequestId(row.try_get("request_id")?),
        product_url: row.try_get("product_url")?,
        quantity: decode_u32("quantity", row.try_get("quantity")?)?,
        state,
        attempt_count: decode_u32("attempt_count", row.try_get("attempt_count")?)?,
        last_error: row.try_get("last_error")?,
        created_at: decode_utc("created_at", row.try_get("created_at")?)?,
        updated_at: decode_utc("updated_at", row.try_get("updated_at")?)?,
    })
}
