use std::sync::Arc;

use axum::Router;
use costgate_core::config::{AppConfig, ConfigError, LoadOptions};
use costgate_core::{
    ActorContext, ApplicationError, CostWorkflow, SyncReport, TracingAuditSink, UserId,
};
use costgate_db::{connect_with_config, migrations, DbPool, SqlCostRequestStore, SqlLedgerBook};
use thiserror::Error;
use tracing::info;

use crate::{costs, health};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub workflow: CostWorkflow,
}

impl Application {
    pub fn router(&self) -> Router {
        health::router(self.db_pool.clone())
            .nest("/api/v1/costs", costs::router(self.workflow.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("startup ledger sync failed: {0}")]
    StartupSync(#[source] ApplicationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let workflow = CostWorkflow::new(
        Arc::new(SqlCostRequestStore::new(db_pool.clone())),
        Arc::new(SqlLedgerBook::new(db_pool.clone())),
        Arc::new(TracingAuditSink),
    );

    if let Some(actor) = config.finance.startup_sync_actor.as_deref() {
        let report = startup_sync(&workflow, actor).await?;
        info!(
            event_name = "system.bootstrap.ledger_synced",
            correlation_id = "startup-sync",
            synced = report.synced_count,
            skipped = report.skipped_count,
            failed = report.failed_count,
            "startup ledger sweep finished"
        );
    }

    Ok(Application { config, db_pool, workflow })
}

async fn startup_sync(workflow: &CostWorkflow, actor: &str) -> Result<SyncReport, BootstrapError> {
    let ctx = ActorContext::new(UserId(actor.trim().to_string()), "startup-sync");
    workflow.sync_approved_to_ledger(&ctx).await.map_err(BootstrapError::StartupSync)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use costgate_core::config::{ConfigOverrides, LoadOptions};
    use tower::ServiceExt;

    use crate::bootstrap::{bootstrap, BootstrapError};

    fn options(database_url: &str, startup_sync_actor: Option<&str>) -> LoadOptions {
        LoadOptions {
            config_path: Some("costgate-test-does-not-exist.toml".into()),
            require_file: false,
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                startup_sync_actor: startup_sync_actor.map(str::to_string),
                ..ConfigOverrides::default()
            },
        }
    }

    #[tokio::test]
    async fn bootstrap_rejects_non_sqlite_database_url() {
        let result = bootstrap(options("postgres://localhost/costgate", None)).await;

        assert!(matches!(result, Err(BootstrapError::Config(_))));
        let message = result.err().expect("error").to_string();
        assert!(message.contains("database.url"));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_serves_routes() {
        let app = bootstrap(options("sqlite::memory:", Some("u-admin")))
            .await
            .expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('cost_request', 'ledger_transaction')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("tables");
        assert_eq!(table_count, 2);

        let response = app
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/costs/mine")
                    .header("x-actor-id", "u-1")
                    .header("x-actor-role", "STUDENT")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        app.db_pool.close().await;
    }
}
