//! Application constants
//!
//! Documented defaults for every tunable. Configuration structs fall back to
//! these values when a field is absent.

// Database
pub const DEFAULT_DB_PATH: &str = "synclane.db";
pub const DEFAULT_DB_POOL_SIZE: u32 = 4;
pub const DEFAULT_DB_BUSY_TIMEOUT_MS: u64 = 5_000;

// Engine
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 30;
pub const DEFAULT_PERSISTENCE_RETRIES: u32 = 3;
pub const DEFAULT_PERSISTENCE_BACKOFF_MS: u64 = 50;
pub const DEFAULT_CALL_GRACE_MS: u64 = 1_000;
pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const DEFAULT_RETRY_RESCAN_MS: u64 = 5_000;

// Retry policy
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 60_000;
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_MAX_ELAPSED_SECS: u64 = 600;

// External gateway
pub const DEFAULT_EXTERNAL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ENDPOINT: &str = "/posts";
pub const DEFAULT_METHOD: &str = "GET";
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
pub const API_TOKEN_HEADER: &str = "X-API-Token";

// Attempt error codes
pub const ERROR_CODE_TIMEOUT: &str = "EXTERNAL_TIMEOUT";
pub const ERROR_CODE_CONNECT: &str = "EXTERNAL_CONNECT";
pub const ERROR_CODE_TRANSPORT: &str = "EXTERNAL_TRANSPORT";
pub const ERROR_CODE_MALFORMED: &str = "MALFORMED_RESPONSE";
pub const ERROR_CODE_CONFIG: &str = "CONFIG_ERROR";
pub const ERROR_CODE_PANIC: &str = "ADAPTER_PANIC";
pub const ERROR_CODE_ABANDONED: &str = "ABANDONED";
pub const ERROR_CODE_HTTP_PREFIX: &str = "EXTERNAL_HTTP_";

/// Upper bound for stored error details.
pub const MAX_ERROR_DETAIL_LEN: usize = 512;
