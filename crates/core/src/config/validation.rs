use super::{ConfigError, ConfigResult};

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// General validation utilities
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field_name: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate that a timeout is reasonable
    pub fn validate_timeout_seconds(timeout_seconds: u64, field_name: &str) -> ConfigResult<()> {
        if timeout_seconds == 0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if timeout_seconds > 86_400 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be less than or equal to 86400"
            )));
        }
        Ok(())
    }

    /// Validate a polling interval given in milliseconds
    pub fn validate_interval_ms(interval_ms: u64, field_name: &str) -> ConfigResult<()> {
        if interval_ms == 0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if interval_ms > 600_000 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be less than or equal to 600000"
            )));
        }
        Ok(())
    }

    /// Validate that a count is reasonable
    pub fn validate_count(count: usize, field_name: &str, max: usize) -> ConfigResult<()> {
        if count == 0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > max {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be less than or equal to {max}"
            )));
        }
        Ok(())
    }

    /// Validate that a URL has a valid format
    pub fn validate_url(url: &str, field_name: &str, schemes: &[&str]) -> ConfigResult<()> {
        Self::validate_not_empty(url, field_name)?;
        if !schemes
            .iter()
            .any(|scheme| url.starts_with(&format!("{scheme}://")))
        {
            return Err(ConfigError::Validation(format!(
                "{field_name} must start with one of {schemes:?}"
            )));
        }
        Ok(())
    }

    /// Validate that a bind address looks like host:port
    pub fn validate_bind_address(address: &str, field_name: &str) -> ConfigResult<()> {
        address.parse::<std::net::SocketAddr>().map_err(|e| {
            ConfigError::Validation(format!("{field_name} is not a valid socket address: {e}"))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_empty() {
        assert!(ValidationUtils::validate_not_empty("value", "field").is_ok());
        assert!(ValidationUtils::validate_not_empty("   ", "field").is_err());
    }

    #[test]
    fn test_validate_url_schemes() {
        assert!(ValidationUtils::validate_url("redis://localhost", "url", &["redis"]).is_ok());
        assert!(
            ValidationUtils::validate_url("http://localhost", "url", &["redis", "rediss"])
                .is_err()
        );
    }

    #[test]
    fn test_validate_bind_address() {
        assert!(ValidationUtils::validate_bind_address("0.0.0.0:8080", "api").is_ok());
        assert!(ValidationUtils::validate_bind_address("localhost", "api").is_err());
    }

    #[test]
    fn test_validate_count_bounds() {
        assert!(ValidationUtils::validate_count(0, "count", 10).is_err());
        assert!(ValidationUtils::validate_count(11, "count", 10).is_err());
        assert!(ValidationUtils::validate_count(5, "count", 10).is_ok());
    }
}
