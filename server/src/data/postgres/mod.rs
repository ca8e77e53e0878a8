//! PostgreSQL backend
//!
//! Pool setup plus the rule-driven statements that run against it:
//! - [`fetch`] paginated, rule-filtered reads
//! - [`batch`] rule-targeted updates
//! - [`bind`] named-to-positional placeholder binding
//! - [`select`] the SELECT builder both share

pub mod batch;
pub mod bind;
pub mod error;
pub mod fetch;
pub mod select;

pub use batch::{
    BatchOptions, BatchPlan, UpdateSet, batch_update, batch_update_returning, plan_batch_update,
};
pub use bind::BindList;
pub use error::PostgresError;
pub use fetch::{
    FetchOptions, FetchPlan, FetchQuery, PageLimits, Paginated, QueryHook, fetch_paginated,
    plan_fetch,
};
pub use select::{SelectQuery, SortOrder};
pub use sqlx::PgPool;

use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::log::LevelFilter;

use crate::core::config::PostgresConfig;
use crate::core::constants::{
    POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS, POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS,
    POSTGRES_DEFAULT_MAX_CONNECTIONS, POSTGRES_DEFAULT_MAX_LIFETIME_SECS,
    POSTGRES_DEFAULT_MIN_CONNECTIONS, POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS,
};

/// Resolved pool settings, zero config values replaced by defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub statement_timeout_secs: u64,
}

fn or_default<T: Default + PartialEq>(value: T, default: T) -> T {
    if value == T::default() { default } else { value }
}

impl PoolSettings {
    pub fn from_config(config: &PostgresConfig) -> Self {
        let max_connections =
            or_default(config.max_connections, POSTGRES_DEFAULT_MAX_CONNECTIONS);
        Self {
            max_connections,
            // never above max_connections
            min_connections: or_default(config.min_connections, POSTGRES_DEFAULT_MIN_CONNECTIONS)
                .min(max_connections),
            acquire_timeout_secs: or_default(
                config.acquire_timeout_secs,
                POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS,
            ),
            idle_timeout_secs: or_default(
                config.idle_timeout_secs,
                POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS,
            ),
            max_lifetime_secs: or_default(
                config.max_lifetime_secs,
                POSTGRES_DEFAULT_MAX_LIFETIME_SECS,
            ),
            statement_timeout_secs: or_default(
                config.statement_timeout_secs,
                POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS,
            ),
        }
    }
}

/// Shared connection pool
///
/// Created once at startup. Every connection runs in UTC so date truncation in
/// compiled predicates matches the values truncated on our side.
pub struct PostgresService {
    pool: PgPool,
}

impl PostgresService {
    pub async fn init(config: &PostgresConfig) -> Result<Self, PostgresError> {
        let url = config.url.as_str();
        if url.is_empty() {
            return Err(PostgresError::Config("PostgreSQL URL is required".into()));
        }

        let settings = PoolSettings::from_config(config);

        let mut options: PgConnectOptions = url
            .parse()
            .map_err(|e| PostgresError::Config(format!("Invalid PostgreSQL URL: {}", e)))?;

        options = options.log_statements(LevelFilter::Trace);

        let mut session = vec![("timezone", "UTC".to_string())];
        if settings.statement_timeout_secs > 0 {
            session.push((
                "statement_timeout",
                format!("{}s", settings.statement_timeout_secs),
            ));
        }
        options = options.options(session);

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(settings.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(settings.max_lifetime_secs))
            .connect_with(options)
            .await?;

        tracing::debug!(
            max_connections = settings.max_connections,
            min_connections = settings.min_connections,
            acquire_timeout_secs = settings.acquire_timeout_secs,
            idle_timeout_secs = settings.idle_timeout_secs,
            max_lifetime_secs = settings.max_lifetime_secs,
            statement_timeout_secs = settings.statement_timeout_secs,
            "PostgresService initialized"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("PostgreSQL pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values_fall_back_to_defaults() {
        let settings = PoolSettings::from_config(&PostgresConfig::default());
        assert_eq!(settings.max_connections, POSTGRES_DEFAULT_MAX_CONNECTIONS);
        assert_eq!(settings.min_connections, POSTGRES_DEFAULT_MIN_CONNECTIONS);
        assert_eq!(
            settings.statement_timeout_secs,
            POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS
        );
    }

    #[test]
    fn test_min_connections_capped_by_max() {
        let config = PostgresConfig {
            max_connections: 4,
            min_connections: 10,
            ..Default::default()
        };
        let settings = PoolSettings::from_config(&config);
        assert_eq!(settings.max_connections, 4);
        assert_eq!(settings.min_connections, 4);
    }

    #[tokio::test]
    async fn test_init_requires_url() {
        let err = PostgresService::init(&PostgresConfig::default())
            .await
            .err()
            .map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("Configuration error: PostgreSQL URL is required")
        );
    }

    #[tokio::test]
    async fn test_init_rejects_malformed_url() {
        let config = PostgresConfig {
            url: "not a url".into(),
            ..Default::default()
        };
        let err = PostgresService::init(&config).await.err();
        assert!(matches!(err, Some(PostgresError::Config(_))));
    }
}
