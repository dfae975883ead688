use super::{types::Config, ConfigError, StoreBackend, UploadBackend};

/// Validate configuration
/// Currently validates:
/// - Inspector section exists (enforced by serde) and names programs
/// - Ports are not 0 and the HTTP and device listeners do not collide
/// - Acknowledgement timeouts are not 0
/// - Quality thresholds are ordered and within [0, 100]
/// - The selected store/upload backend has its sub-section
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }
    if config.device.port == 0 {
        return Err(invalid("device.port cannot be 0"));
    }
    if config.server.port == config.device.port && config.server.host == config.device.host {
        return Err(invalid("server and device cannot listen on the same address"));
    }

    if config.device.pickup_timeout_ms == 0 || config.device.placement_timeout_ms == 0 {
        return Err(invalid("device acknowledgement timeouts cannot be 0"));
    }

    let quality = &config.quality;
    if !(0.0..=100.0).contains(&quality.good_min) || !(0.0..=100.0).contains(&quality.bad_below) {
        return Err(invalid("quality thresholds must be within [0, 100]"));
    }
    if quality.bad_below > quality.good_min {
        return Err(invalid("quality.bad_below cannot exceed quality.good_min"));
    }

    if config.inspector.capture_command.is_empty() {
        return Err(invalid("inspector.capture_command cannot be empty"));
    }
    if config.inspector.analyze_command.is_empty() {
        return Err(invalid("inspector.analyze_command cannot be empty"));
    }

    if config.store.backend == StoreBackend::Rest && config.store.rest.is_none() {
        return Err(invalid("store.backend = \"rest\" requires a [store.rest] section"));
    }
    if config.upload.backend == UploadBackend::Storage && config.upload.storage.is_none() {
        return Err(invalid(
            "upload.backend = \"storage\" requires an [upload.storage] section",
        ));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn base_config() -> Config {
        load_config_from_str(
            r#"
[inspector]
capture_command = ["cap"]
analyze_command = ["ana"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = base_config();
        config.device.port = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_port_collision_fails() {
        let mut config = base_config();
        config.device.port = config.server.port;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_thresholds() {
        let mut config = base_config();
        config.quality.bad_below = 95.0;
        assert!(validate_config(&config).is_err());

        let mut config = base_config();
        config.quality.good_min = 120.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_rest_backend_requires_section() {
        let mut config = base_config();
        config.store.backend = StoreBackend::Rest;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_storage_backend_requires_section() {
        let mut config = base_config();
        config.upload.backend = UploadBackend::Storage;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_timeout_fails() {
        let mut config = base_config();
        config.device.pickup_timeout_ms = 0;
        assert!(validate_config(&config).is_err());
    }
}
