use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use hrdesk_core::config::LlmProvider;
use hrdesk_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    model: LlmProvider,
    started_at: DateTime<Utc>,
}

impl HealthState {
    pub fn new(db_pool: DbPool, model: LlmProvider) -> Self {
        Self { db_pool, model, started_at: Utc::now() }
    }
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
    /// Informational only: a missing model degrades classification to
    /// keyword shortcuts, it does not make the service unready.
    pub model: HealthCheck,
    pub uptime_secs: i64,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";
    let now = Utc::now();

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: format!("hrdesk-server {}", env!("CARGO_PKG_VERSION")),
        },
        database,
        model: model_check(state.model),
        uptime_secs: (now - state.started_at).num_seconds(),
        checked_at: now.to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM conversation_state")
        .fetch_one(pool)
        .await
    {
        Ok(_) => {
            HealthCheck { status: "ready", detail: "conversation store reachable".to_string() }
        }
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

fn model_check(provider: LlmProvider) -> HealthCheck {
    match provider {
        LlmProvider::Disabled => HealthCheck {
            status: "disabled",
            detail: "keyword classification only".to_string(),
        },
        LlmProvider::OpenAi => {
            HealthCheck { status: "configured", detail: "openai".to_string() }
        }
        LlmProvider::Ollama => {
            HealthCheck { status: "configured", detail: "ollama".to_string() }
        }
    }
}
