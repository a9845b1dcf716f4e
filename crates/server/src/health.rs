use std::path::PathBuf;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use haulquote_core::retrieval::{RuleCorpusIndex, SNAPSHOT_FILE};
use haulquote_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    index: Arc<RuleCorpusIndex>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub rule_index: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, index: Arc<RuleCorpusIndex>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, index })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let rule_index = index_check(&state.index);
    let ready = database.status == "ready" && rule_index.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "haulquote-server runtime initialized".to_string(),
        },
        database,
        rule_index,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

// An empty index is still serviceable; a vanished directory is not.
fn index_check(index: &RuleCorpusIndex) -> HealthCheck {
    let directory: PathBuf = index.directory().to_path_buf();
    if directory.is_dir() {
        HealthCheck {
            status: "ready",
            detail: format!(
                "{} rule documents indexed in {} ({SNAPSHOT_FILE})",
                index.len(),
                directory.display()
            ),
        }
    } else {
        HealthCheck {
            status: "degraded",
            detail: format!("index directory {} is missing", directory.display()),
        }
    }
}
