// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "Memberhub";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "memberhub";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name, looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "memberhub.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "MEMBERHUB_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "MEMBERHUB_LOG";

/// Default log filter when neither MEMBERHUB_LOG nor RUST_LOG is set
pub const DEFAULT_LOG_FILTER: &str = "memberhub=info,memberhub_server=info,sqlx=warn";

// =============================================================================
// PostgreSQL Database
// =============================================================================

/// Environment variable for PostgreSQL connection URL
pub const ENV_POSTGRES_URL: &str = "MEMBERHUB_POSTGRES_URL";

/// Environment variable for the database used by ignored integration tests
pub const ENV_TEST_DATABASE_URL: &str = "MEMBERHUB_TEST_DATABASE_URL";

/// PostgreSQL default max connections
pub const POSTGRES_DEFAULT_MAX_CONNECTIONS: u32 = 20;

/// PostgreSQL default min connections (keep warm for low latency)
pub const POSTGRES_DEFAULT_MIN_CONNECTIONS: u32 = 2;

/// PostgreSQL default connection acquire timeout in seconds
pub const POSTGRES_DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// PostgreSQL idle connection timeout in seconds (release unused connections)
pub const POSTGRES_DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// PostgreSQL max connection lifetime in seconds
pub const POSTGRES_DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

/// PostgreSQL statement timeout in seconds (0 = disabled)
pub const POSTGRES_DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// Query Limits
// =============================================================================

/// Page size used when a list request gives no limit
pub const QUERY_DEFAULT_LIMIT: i64 = 50;

/// Largest page a list request may ask for
pub const QUERY_MAX_LIMIT: i64 = 100;
