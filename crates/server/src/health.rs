use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use procura_db::DbPool;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    automation_enabled: bool,
}

/// Snapshot of the cart job queue, read in the same query that proves the
/// database is reachable and migrated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueueGauge {
    pub queued: i64,
    pub running: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: &'static str,
    pub database_detail: Option<String>,
    pub cart_queue: Option<QueueGauge>,
    pub automation_enabled: bool,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, automation_enabled: bool) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(HealthState { db_pool, automation_enabled })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    db_pool: DbPool,
    automation_enabled: bool,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(db_pool, automation_enabled)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let (report, code) = match read_queue_gauge(&state.db_pool).await {
        Ok(gauge) => (
            HealthReport {
                status: "ready",
                database: "ready",
                database_detail: None,
                cart_queue: Some(gauge),
                automation_enabled: state.automation_enabled,
                checked_at: Utc::now().to_rfc3339(),
            },
            StatusCode::OK,
        ),
        Err(error) => (
            HealthReport {
                status: "degraded",
                database: "degraded",
                database_detail: Some(error.to_string()),
                cart_queue: None,
                automation_enabled: state.automation_enabled,
                checked_at: Utc::now().to_rfc3339(),
            },
            StatusCode::SERVICE_UNAVAILABLE,
        ),
    };
    (code, Json(report))
}

async fn read_queue_gauge(pool: &DbPool) -> Result<QueueGauge, sqlx::Error> {
    let (queued, running) = sqlx::query_as::<_, (i64, i64)>(
        "SELECT
            COUNT(*) FILTER (WHERE state = 'queued'),
            COUNT(*) FILTER (WHERE state = 'running')
         FROM cart_job",
    )
    .fetch_one(pool)
    .await?;
    Ok(QueueGauge { queued, running })
}
