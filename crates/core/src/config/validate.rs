use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Orchestrator batch size and wait durations are not 0
/// - An exponential error backoff cap is not below the base error wait
/// - A callback address is an http(s) URL
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let orchestrator = &config.orchestrator;
    if orchestrator.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.batch_size cannot be 0".to_string(),
        ));
    }
    if orchestrator.idle_wait_ms == 0 || orchestrator.error_wait_ms == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator wait durations cannot be 0".to_string(),
        ));
    }
    if orchestrator.max_error_wait_ms != 0
        && orchestrator.max_error_wait_ms < orchestrator.error_wait_ms
    {
        return Err(ConfigError::ValidationError(format!(
            "orchestrator.max_error_wait_ms ({}) is below error_wait_ms ({})",
            orchestrator.max_error_wait_ms, orchestrator.error_wait_ms
        )));
    }

    if config.provisioning.channel_buffer == 0 {
        return Err(ConfigError::ValidationError(
            "provisioning.channel_buffer cannot be 0".to_string(),
        ));
    }

    if let Some(address) = &config.dispatch.callback_address {
        if !(address.starts_with("http://") || address.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "dispatch.callback_address must be an http(s) URL, got {:?}",
                address
            )));
        }
    }

    Ok(())
}
