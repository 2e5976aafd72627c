use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use costgate_db::DbPool;
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

impl HealthCheck {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: "ready", detail: detail.into() }
    }

    fn degraded(check: &'static str, error: sqlx::Error) -> Self {
        warn!(
            event_name = "system.health.degraded",
            correlation_id = "health",
            check,
            error = %error,
            "health probe failed"
        );
        Self { status: "degraded", detail: format!("{check} query failed: {error}") }
    }

    fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

/// `workflow` is ready once the cost tables answer queries, i.e. migrations ran.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub workflow: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&state.db_pool).await {
        Ok(_) => HealthCheck::ready("database query succeeded"),
        Err(error) => HealthCheck::degraded("database", error),
    };
    let workflow = workflow_check(&state.db_pool).await;
    let ready = database.is_ready() && workflow.is_ready();

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        workflow,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn workflow_check(pool: &DbPool) -> HealthCheck {
    let counts = sqlx::query_as::<_, (i64, i64)>(
        "SELECT
            (SELECT COUNT(*) FROM cost_request WHERE status IN ('PENDING', 'APPROVED_L1', 'APPROVED_L2')),
            (SELECT COUNT(*) FROM ledger_transaction)",
    )
    .fetch_one(pool)
    .await;

    match counts {
        Ok((awaiting, ledger_entries)) => HealthCheck::ready(format!(
            "{awaiting} cost requests awaiting approval, {ledger_entries} ledger transactions"
        )),
        Err(error) => HealthCheck::degraded("workflow", error),
    }
}
