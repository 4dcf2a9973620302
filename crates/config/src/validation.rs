use crate::ConfigResult;

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
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate that a port number is valid
    pub fn validate_port(port: u16) -> ConfigResult<()> {
        if port == 0 {
            return Err(crate::ConfigError::Validation(
                "port cannot be 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate a `host:port` socket address
    pub fn validate_bind_address(address: &str, field_name: &str) -> ConfigResult<()> {
        Self::validate_not_empty(address, field_name)?;
        let (host, port) = address.rsplit_once(':').ok_or_else(|| {
            crate::ConfigError::Validation(format!("{field_name} must be in format host:port"))
        })?;
        Self::validate_not_empty(host, field_name)?;
        let port: u16 = port.parse().map_err(|_| {
            crate::ConfigError::Validation(format!("{field_name} port must be a valid number"))
        })?;
        Self::validate_port(port)
    }

    /// Validate that a timeout is reasonable
    pub fn validate_timeout_seconds(timeout_seconds: u64) -> ConfigResult<()> {
        if timeout_seconds == 0 {
            return Err(crate::ConfigError::Validation(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if timeout_seconds > 3600 {
            return Err(crate::ConfigError::Validation(
                "timeout_seconds must be less than or equal to 3600".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate that a count is reasonable
    pub fn validate_count(count: usize, field_name: &str) -> ConfigResult<()> {
        if count == 0 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > 10000 {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be less than or equal to 10000"
            )));
        }
        Ok(())
    }

    /// Validate that an integer lies within an inclusive range
    pub fn validate_range(value: i64, min: i64, max: i64, field_name: &str) -> ConfigResult<()> {
        if value < min || value > max {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be between {min} and {max}"
            )));
        }
        Ok(())
    }

    /// Validate that a URL has a valid format
    pub fn validate_url(url: &str, field_name: &str) -> ConfigResult<()> {
        if url.trim().is_empty() {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }

        // sqlite:foo.db 这类 URL 没有 "//"
        if !url.contains(':') {
            return Err(crate::ConfigError::Validation(format!(
                "{field_name} must be a valid URL with scheme"
            )));
        }

        Ok(())
    }
}
