use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use closetmind_agent::{
    Coordinator, GenerationBackend, GenerationError, HttpGenerationClient, ResourceGuard,
    TitleGenerator,
};
use closetmind_core::config::{AppConfig, ConfigError, LoadOptions};
use closetmind_db::{connect_with_config, migrations, DbPool, HistoryStore, SqlHistoryStore};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub history: Arc<dyn HistoryStore>,
    pub coordinator: Arc<Coordinator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("generation client init failed: {0}")]
    Generation(#[from] GenerationError),
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

    let history: Arc<dyn HistoryStore> = Arc::new(SqlHistoryStore::new(db_pool.clone()));
    let backend: Arc<dyn GenerationBackend> =
        Arc::new(HttpGenerationClient::from_config(&config.llm)?);

    let acquire_timeout = Duration::from_millis(config.guard.acquire_timeout_ms);
    let interactive_guard =
        Arc::new(ResourceGuard::new("interactive", config.guard.interactive, acquire_timeout));
    let background_guard =
        Arc::new(ResourceGuard::new("background", config.guard.background, acquire_timeout));

    let mut coordinator = Coordinator::new(
        Arc::clone(&history),
        Arc::clone(&backend),
        interactive_guard,
        &config.agent,
    );
    if config.agent.title_generation {
        let titles = TitleGenerator::new(backend, background_guard, Arc::clone(&history));
        coordinator = coordinator.with_title_generator(Arc::new(titles));
    }

    Ok(Application { config, db_pool, history, coordinator: Arc::new(coordinator) })
}

#[cfg(test)]
mod tests {
    use closetmind_core::config::{ConfigOverrides, LlmProvider, LoadOptions};
    use closetmind_db::HistoryStore;

    use crate::bootstrap::bootstrap;

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_llm_configuration() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                llm_provider: Some(LlmProvider::OpenAi),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("llm.api_key"));
    }

    #[tokio::test]
    async fn bootstrap_prepares_schema_and_coordinator() {
        let app = bootstrap(valid_overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('conversations', 'turns')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected baseline tables to be available after bootstrap");
        assert_eq!(table_count, 2, "bootstrap should expose conversation-path tables");

        let conversation = app
            .history
            .create_conversation("Smoke", None)
            .await
            .expect("history store should be wired to the migrated pool");
        let found = app.history.find_conversation(conversation.id).await.expect("lookup");
        assert!(found.is_some());

        app.db_pool.close().await;
    }
}
