use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use procura_core::domain::history::{HistoryAction, HistoryEntry, HistoryEntryId};
use procura_core::domain::request::{
    PurchaseRequest, RequestId, RequestLine, RequestStatus, Urgency,
};

use super::{decode_u32, decode_utc, decode_utc_opt, RepositoryError, RequestRepository};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id,
                request_number,
                requester_id,
                product_url,
                lines_json,
                quantity,
                justification,
                urgency,
                currency,
                estimated_price,
                status,
                approved_by,
                approved_at,
                rejected_by,
                rejected_at,
                rejection_reason,
                info_requested_at,
                info_request_note,
                purchased_by,
                purchased_at,
                purchase_notes,
                is_automatable,
                asin,
                added_to_cart,
                added_to_cart_at,
                cart_error,
                created_at,
                updated_at";

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn find_by_id(
        &self,
        id: &RequestId,
    ) -> Result<Option<PurchaseRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM purchase_request WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(request_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<PurchaseRequest>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM purchase_request ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(request_from_row).collect()
    }

    async fn create(
        &self,
        request: &PurchaseRequest,
        history: &HistoryEntry,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO purchase_request (
                id,
                request_number,
                requester_id,
                product_url,
                lines_json,
                quantity,
                justification,
                urgency,
                currency,
                estimated_price,
                status,
                approved_by,
                approved_at,
                rejected_by,
                rejected_at,
                rejection_reason,
                info_requested_at,
                info_request_note,
                purchased_by,
                purchased_at,
                purchase_notes,
                is_automatable,
                asin,
                added_to_cart,
                added_to_cart_at,
                cart_error,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.request_number)
        .bind(&request.requester_id)
        .bind(&request.product_url)
        .bind(encode_lines(&request.lines)?)
        .bind(i64::from(request.quantity))
        .bind(&request.justification)
        .bind(request.urgency.as_str())
        .bind(&request.currency)
        .bind(request.estimated_price.map(|value| value.to_string()))
        .bind(request.status.as_str())
        .bind(request.approved_by.as_deref())
        .bind(request.approved_at.map(|value| value.to_rfc3339()))
        .bind(request.rejected_by.as_deref())
        .bind(request.rejected_at.map(|value| value.to_rfc3339()))
        .bind(request.rejection_reason.as_deref())
        .bind(request.info_requested_at.map(|value| value.to_rfc3339()))
        .bind(request.info_request_note.as_deref())
        .bind(request.purchased_by.as_deref())
        .bind(request.purchased_at.map(|value| value.to_rfc3339()))
        .bind(request.purchase_notes.as_deref())
        .bind(request.is_automatable)
        .bind(request.asin.as_deref())
        .bind(request.added_to_cart)
        .bind(request.added_to_cart_at.map(|value| value.to_rfc3339()))
        .bind(request.cart_error.as_deref())
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        insert_history(&mut tx, history).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn apply_transition(
        &self,
        updated: &PurchaseRequest,
        expected_status: RequestStatus,
        history: &HistoryEntry,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = guarded_update(updated, expected_status)?.execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            // Status guard lost; the transaction is dropped without writes.
            return Ok(false);
        }

        insert_history(&mut tx, history).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn update_details(
        &self,
        updated: &PurchaseRequest,
        expected_status: RequestStatus,
    ) -> Result<bool, RepositoryError> {
        let result = guarded_update(updated, expected_status)?.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_cart_outcome(
        &self,
        id: &RequestId,
        added_to_cart: bool,
        added_to_cart_at: Option<DateTime<Utc>>,
        cart_error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE purchase_request SET
                added_to_cart = ?,
                added_to_cart_at = ?,
                cart_error = ?,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(added_to_cart)
        .bind(added_to_cart_at.map(|value| value.to_rfc3339()))
        .bind(cart_error)
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_history(&self, id: &RequestId) -> Result<Vec<HistoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, request_id, actor_id, action, old_status, new_status, comment, created_at
             FROM request_history
             WHERE request_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(history_from_row).collect()
    }

    async fn count_created_in_year(&self, year: i32) -> Result<u32, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM purchase_request WHERE substr(created_at, 1, 4) = ?",
        )
        .bind(format!("{year}"))
        .fetch_one(&self.pool)
        .await?;

        let count = row.try_get::<i64, _>("count")?;
        u32::try_from(count)
            .map_err(|_| RepositoryError::Decode(format!("negative request count: {count}")))
    }

    async fn status_counts(&self) -> Result<HashMap<RequestStatus, u32>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM purchase_request GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for row in rows {
            let status_raw = row.try_get::<String, _>("status")?;
            let status = RequestStatus::parse(&status_raw).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown request status `{status_raw}`"))
            })?;
            let count = row.try_get::<i64, _>("count")?;
            counts.insert(
                status,
                u32::try_from(count).map_err(|_| {
                    RepositoryError::Decode(format!("negative status count: {count}"))
                })?,
            );
        }
        Ok(counts)
    }
}

type GuardedUpdate<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn guarded_update(
    updated: &PurchaseRequest,
    expected_status: RequestStatus,
) -> Result<GuardedUpdate<'_>, RepositoryError> {
    Ok(sqlx::query(
        "UPDATE purchase_request SET
            product_url = ?,
            lines_json = ?,
            quantity = ?,
            justification = ?,
            urgency = ?,
            currency = ?,
            estimated_price = ?,
            status = ?,
            approved_by = ?,
            approved_at = ?,
            rejected_by = ?,
            rejected_at = ?,
            rejection_reason = ?,
            info_requested_at = ?,
            info_request_note = ?,
            purchased_by = ?,
            purchased_at = ?,
            purchase_notes = ?,
            is_automatable = ?,
            asin = ?,
            updated_at = ?
         WHERE id = ? AND status = ?",
    )
    .bind(&updated.product_url)
    .bind(encode_lines(&updated.lines)?)
    .bind(i64::from(updated.quantity))
    .bind(&updated.justification)
    .bind(updated.urgency.as_str())
    .bind(&updated.currency)
    .bind(updated.estimated_price.map(|value| value.to_string()))
    .bind(updated.status.as_str())
    .bind(updated.approved_by.as_deref())
    .bind(updated.approved_at.map(|value| value.to_rfc3339()))
    .bind(updated.rejected_by.as_deref())
    .bind(updated.rejected_at.map(|value| value.to_rfc3339()))
    .bind(updated.rejection_reason.as_deref())
    .bind(updated.info_requested_at.map(|value| value.to_rfc3339()))
    .bind(updated.info_request_note.as_deref())
    .bind(updated.purchased_by.as_deref())
    .bind(updated.purchased_at.map(|value| value.to_rfc3339()))
    .bind(updated.purchase_notes.as_deref())
    .bind(updated.is_automatable)
    .bind(updated.asin.as_deref())
    .bind(updated.updated_at.to_rfc3339())
    .bind(&updated.id.0)
    .bind(expected_status.as_str()))
}

async fn insert_history(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    history: &HistoryEntry,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO request_history (
            id, request_id, actor_id, action, old_status, new_status, comment, created_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&history.id.0)
    .bind(&history.request_id.0)
    .bind(&history.actor_id)
    .bind(history.action.as_str())
    .bind(history.old_status.as_ref().map(RequestStatus::as_str))
    .bind(history.new_status.as_str())
    .bind(&history.comment)
    .bind(history.created_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn encode_lines(lines: &[RequestLine]) -> Result<String, RepositoryError> {
    serde_json::to_string(lines)
        .map_err(|error| RepositoryError::Decode(format!("could not encode lines: {error}")))
}

fn request_from_row(row: SqliteRow) -> Result<PurchaseRequest, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = RequestStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown request status `{status_raw}`"))
    })?;

    let urgency_raw = row.try_get::<String, _>("urgency")?;
    let urgency = Urgency::parse(&urgency_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown urgency `{urgency_raw}`")))?;

    let lines_raw = row.try_get::<String, _>("lines_json")?;
    let lines: Vec<RequestLine> = serde_json::from_str(&lines_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid lines_json: {error}")))?;

    Ok(PurchaseRequest {
        id: RequestId(row.try_get("id")?),
        request_number: row.try_get("request_number")?,
        requester_id: row.try_get("requester_id")?,
        product_url: row.try_get("product_url")?,
        lines,
        quantity: decode_u32("quantity", row.try_get("quantity")?)?,
        justification: row.try_get("justification")?,
        urgency,
        currency: row.try_get("currency")?,
        estimated_price: parse_optional_decimal(
            "estimated_price",
            row.try_get("estimated_price")?,
        )?,
        status,
        approved_by: row.try_get("approved_by")?,
        approved_at: decode_utc_opt("approved_at", row.try_get("approved_at")?)?,
        rejected_by: row.try_get("rejected_by")?,
        rejected_at: decode_utc_opt("rejected_at", row.try_get("rejected_at")?)?,
        rejection_reason: row.try_get("rejection_reason")?,
        info_requested_at: decode_utc_opt(
            "info_requested_at",
            row.try_get("info_requested_at")?,
        )?,
        info_request_note: row.try_get("info_request_note")?,
        purchased_by: row.try_get("purchased_by")?,
        purchased_at: decode_utc_opt("purchased_at", row.try_get("purchased_at")?)?,
        purchase_notes: row.try_get("purchase_notes")?,
        is_automatable: row.try_get("is_automatable")?,
        asin: row.try_get("asin")?,
        added_to_cart: row.try_get("added_to_cart")?,
        added_to_cart_at: decode_utc_opt(
            "added_to_cart_at",
            row.try_get("added_to_cart_at")?,
        )?,
        cart_error: row.try_get("cart_error")?,
        created_at: decode_utc("created_at", row.try_get("created_at")?)?,
        updated_at: decode_utc("updated_at", row.try_get("updated_at")?)?,
    })
}

fn history_from_row(row: SqliteRow) -> Result<HistoryEntry, RepositoryError> {
    let action_raw = row.try_get::<String, _>("action")?;
    let action = HistoryAction::parse(&action_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown history action `{action_raw}`")))?;

    let old_status = row
        .try_get::<Option<String>, _>("old_status")?
        .map(|value| {
            RequestStatus::parse(&value)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown old_status `{value}`")))
        })
        .transpose()?;

    let new_status_raw = row.try_get::<String, _>("new_status")?;
    let new_status = RequestStatus::parse(&new_status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown new_status `{new_status_raw}`"))
    })?;

    Ok(HistoryEntry {
        id: HistoryEntryId(row.try_get("id")?),
        request_id: RequestId(row.try_get("request_id")?),
        actor_id: row.try_get("actor_id")?,
        action,
        old_status,
        new_status,
        comment: row.try_get("comment")?,
        created_at: decode_utc("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value
        .map(|raw| {
            raw.parse::<Decimal>().map_err(|error| {
                RepositoryError::Decode(format!("invalid decimal in `{column}`: `{raw}` ({error})"))
            })
        })
        .transpose()
}
