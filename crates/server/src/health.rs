//! Readiness probe. The service is ready when the database answers, the
//! embedded schema is fully applied and the document root is a directory.

use std::path::{Path, PathBuf};

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use backoffice_db::{migrations, ping, DbPool};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

const READY: &str = "ready";
const DEGRADED: &str = "degraded";

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    storage_root: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Probe {
    pub status: &'static str,
    pub detail: String,
}

impl Probe {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: READY, detail: detail.into() }
    }

    fn degraded(component: &'static str, detail: String) -> Self {
        warn!(
            event_name = "system.health.degraded",
            correlation_id = "health",
            component,
            detail = %detail,
            "readiness probe failed"
        );
        Self { status: DEGRADED, detail }
    }

    fn is_ready(&self) -> bool {
        self.status == READY
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub status: &'static str,
    pub database: Probe,
    pub schema: Probe,
    pub documents: Probe,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, storage_root: PathBuf) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, storage_root })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<Readiness>) {
    let database = match ping(&state.db_pool).await {
        Ok(()) => Probe::ready("database answered"),
        Err(error) => Probe::degraded("database", format!("database query failed: {error}")),
    };
    // Without a database the schema ledger cannot be read either.
    let schema = if database.is_ready() {
        schema_probe(&state.db_pool).await
    } else {
        Probe { status: DEGRADED, detail: "skipped: database unavailable".to_string() }
    };
    let documents = documents_probe(&state.storage_root).await;

    let ready = database.is_ready() && schema.is_ready() && documents.is_ready();
    let readiness = Readiness {
        status: if ready { READY } else { DEGRADED },
        database,
        schema,
        documents,
        checked_at: Utc::now().to_rfc3339(),
    };
    let code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(readiness))
}

async fn schema_probe(pool: &DbPool) -> Probe {
    let expected = migrations::embedded_count();
    match migrations::applied_versions(pool).await {
        Ok(applied) if applied.len() >= expected => {
            Probe::ready(format!("{} of {expected} migrations applied", applied.len()))
        }
        Ok(applied) => Probe::degraded(
            "schema",
            format!("{} of {expected} migrations applied; run `backoffice migrate`", applied.len()),
        ),
        Err(error) => Probe::degraded("schema", format!("migration ledger unreadable: {error}")),
    }
}

async fn documents_probe(root: &Path) -> Probe {
    match tokio::fs::metadata(root).await {
        Ok(metadata) if metadata.is_dir() => {
            Probe::ready(format!("document root {}", root.display()))
        }
        Ok(_) => Probe::degraded("documents", format!("{} is not a directory", root.display())),
        Err(error) => Probe::degraded("documents", format!("{}: {error}", root.display())),
    }
}
