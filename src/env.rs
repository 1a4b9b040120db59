//! Environment variable names read by [`PipelineConfig::from_env`](crate::init::PipelineConfig::from_env).
//!
//! The sinks themselves never touch the environment.

/// Minimum level: `debug`, `info`, `warn` or `error`.
pub const SECURE_LOG_LEVEL_ENV: &str = "SECURE_LOG_LEVEL";

/// HTTPS chat webhook that receives alerts. Unset disables alerting.
pub const SECURE_LOG_WEBHOOK_URL_ENV: &str = "SECURE_LOG_WEBHOOK_URL";

/// Run identifier stamped on every record. Generated when unset.
pub const SECURE_LOG_RUN_ID_ENV: &str = "SECURE_LOG_RUN_ID";

/// Directory for the per-run JSON log. Unset disables the file.
pub const SECURE_LOG_DIR_ENV: &str = "SECURE_LOG_DIR";

/// Hostname used when the system one cannot be read.
pub const UNKNOWN_HOST: &str = "unknown-host";

/// Non-empty value of `key`, if any.
pub fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// System hostname, or [`UNKNOWN_HOST`].
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}
