use super::{types::Config, ConfigError, StoreBackend};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Every pool has at least one worker
/// - Callbacks get at least one attempt
/// - Reaper TTL and interval are positive
/// - The sqlite backend has a database path
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    // Pool validation
    for (name, size) in [
        ("download", config.pools.download),
        ("convert", config.pools.convert),
        ("callback", config.pools.callback),
    ] {
        if size == 0 {
            return Err(invalid(&format!("pools.{} must be at least 1", name)));
        }
    }

    if config.callback.max_attempts == 0 {
        return Err(invalid("callback.max_attempts must be at least 1"));
    }

    if config.reaper.ttl_secs == 0 {
        return Err(invalid("reaper.ttl_secs cannot be 0"));
    }
    if config.reaper.interval_secs == 0 {
        return Err(invalid("reaper.interval_secs cannot be 0"));
    }

    if config.store.backend == StoreBackend::Sqlite && config.store.path.as_os_str().is_empty() {
        return Err(invalid("store.path is required for the sqlite backend"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}
