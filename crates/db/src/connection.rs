use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use closetmind_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Busy-wait applied when a caller connects without a [`DatabaseConfig`]
/// (tests and ad-hoc tooling); configured deployments take the value from
/// `database.busy_timeout_ms`.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

pub async fn connect_with_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_pool(
        &config.url,
        config.max_connections,
        config.timeout_secs,
        config.busy_timeout_ms,
    )
    .await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    connect_pool(database_url, max_connections, timeout_secs, DEFAULT_BUSY_TIMEOUT_MS).await
}

async fn connect_pool(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
    busy_timeout_ms: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                // Enforced on every connection: turn appends rely on the
                // cascade, and WAL keeps readers open during writes.
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                let busy_timeout = format!("PRAGMA busy_timeout = {}", busy_timeout_ms.max(1));
                sqlx::query(&busy_timeout).execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

#[cfg(test)]
mod tests {
    use closetmind_core::config::DatabaseConfig;

    use super::{connect_with_config, connect_with_settings, DEFAULT_BUSY_TIMEOUT_MS};

    #[tokio::test]
    async fn configured_busy_timeout_reaches_the_connection() {
        let pool = connect_with_config(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 5,
            busy_timeout_ms: 1_250,
        })
        .await
        .expect("pool should connect");

        let busy_timeout: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
            .fetch_one(&pool)
            .await
            .expect("read busy_timeout pragma");
        assert_eq!(busy_timeout, 1_250);

        pool.close().await;
    }

    #[tokio::test]
    async fn settings_connect_applies_the_default_busy_timeout() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool connects");

        let busy_timeout: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
            .fetch_one(&pool)
            .await
            .expect("read busy_timeout pragma");
        assert_eq!(busy_timeout, DEFAULT_BUSY_TIMEOUT_MS as i64);

        let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("read foreign_keys pragma");
        assert_eq!(foreign_keys, 1);

        pool.close().await;
    }
}
