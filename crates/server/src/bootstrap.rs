use std::sync::Arc;

use hrdesk_agent::{ChatResponder, GuardrailPolicy, IntentClassifier};
use hrdesk_chat::{BotSettings, Capabilities, Router, Services, Stores};
use hrdesk_core::capabilities::InMemoryCalendar;
use hrdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use hrdesk_core::domain::action::TokenCodec;
use hrdesk_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::directory::EmployeeDirectory;
use crate::llm::HttpLlmClient;
use crate::notify::TemplateNotifier;
use crate::transport::LoggingTransport;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub router: Arc<Router>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("language model client could not be built: {0}")]
    Llm(#[source] anyhow::Error),
    #[error("notification templates failed to compile: {0}")]
    Templates(#[source] tera::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        environment = %config.bot.environment,
        "starting application bootstrap"
    );
    config.validate()?;

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
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

    let services = services(&config, db_pool.clone())?;
    info!(
        event_name = "system.bootstrap.services_ready",
        correlation_id = "bootstrap",
        model = if services.classifier.has_model() { "configured" } else { "disabled" },
        "conversation services assembled"
    );

    Ok(Application { config, db_pool, router: Arc::new(Router::new(Arc::new(services))) })
}

fn services(config: &AppConfig, db_pool: DbPool) -> Result<Services, BootstrapError> {
    let llm = HttpLlmClient::from_config(&config.llm).map_err(BootstrapError::Llm)?;
    let notifier =
        TemplateNotifier::new(&config.notifications).map_err(BootstrapError::Templates)?;

    let capabilities = Capabilities {
        identity: Arc::new(EmployeeDirectory::new(db_pool.clone())),
        calendar: Arc::new(InMemoryCalendar::default()),
        notifier: Arc::new(notifier),
        transport: Arc::new(LoggingTransport),
    };
    let tokens = TokenCodec::new(config.bot.token_secret.clone(), config.bot.token_ttl());

    Ok(Services::new(
        Stores::sqlite(db_pool),
        capabilities,
        tokens,
        BotSettings::from_config(config),
    )
    .with_classifier(IntentClassifier::new(
        llm.clone(),
        config.llm.timeout(),
        config.llm.max_retries,
    ))
    .with_guardrails(GuardrailPolicy::with_threshold(config.bot.confidence_threshold))
    .with_responder(ChatResponder::new(llm, config.llm.timeout())))
}

#[cfg(test)]
mod tests {
    use hrdesk_chat::{InboundEnvelope, OutboundKind, UserClaim};
    use hrdesk_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn options(token_secret: Option<&str>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                token_secret: token_secret.map(str::to_string),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_a_token_secret() {
        let result = bootstrap(options(Some("short"))).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("bot.token_secret"));
    }

    #[tokio::test]
    async fn bootstrapped_router_answers_a_greeting() {
        let app = bootstrap(options(Some("bootstrap-test-secret-0001")))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (tables,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('conversation_state', 'employee', 'leave_request')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema lookup");
        assert_eq!(tables, 3);

        let reply = app
            .router
            .route(InboundEnvelope::text(
                "conv-bootstrap",
                UserClaim::named("emp-bootstrap", "Dana Kim"),
                "hello",
            ))
            .await;

        assert_eq!(reply.kind, OutboundKind::Text);
        assert!(reply.error.is_none());

        app.db_pool.close().await;
    }
}
