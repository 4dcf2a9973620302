use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

pub const VALID_PERMISSIONS: [&str; 6] = [
    "JobRead",
    "JobWrite",
    "JobExecute",
    "NotificationRead",
    "NotificationWrite",
    "Admin",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub jwt_secret: String,
    pub jwt_expiration_hours: u32,
    pub api_keys: Vec<ApiKeyConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jwt_secret: "your-secret-key-change-this-in-production".to_string(),
            jwt_expiration_hours: 24,
            api_keys: Vec::new(),
        }
    }
}

impl ConfigValidator for AuthConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.enabled {
            ValidationUtils::validate_not_empty(&self.jwt_secret, "api.auth.jwt_secret")?;

            if self.jwt_secret.len() < 32 {
                return Err(crate::ConfigError::Validation(
                    "api.auth.jwt_secret must be at least 32 characters long".to_string(),
                ));
            }

            if self.jwt_expiration_hours == 0 {
                return Err(crate::ConfigError::Validation(
                    "api.auth.jwt_expiration_hours must be greater than 0".to_string(),
                ));
            }

            if self.jwt_expiration_hours > 8760 {
                return Err(crate::ConfigError::Validation(
                    "api.auth.jwt_expiration_hours must be less than or equal to 8760 (1 year)"
                        .to_string(),
                ));
            }

            for key_config in &self.api_keys {
                key_config.validate()?;
            }
        }

        Ok(())
    }
}

/// API Key 配置，只保存 key 的 SHA-256 (base64) 摘要
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiKeyConfig {
    pub name: String,
    pub key_hash: String,
    pub permissions: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl ConfigValidator for ApiKeyConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.name, "api.auth.api_keys.name")?;
        ValidationUtils::validate_not_empty(&self.key_hash, "api.auth.api_keys.key_hash")?;

        if self.permissions.is_empty() {
            return Err(crate::ConfigError::Validation(
                "api.auth.api_keys.permissions cannot be empty".to_string(),
            ));
        }

        for permission in &self.permissions {
            if !VALID_PERMISSIONS.contains(&permission.as_str()) {
                return Err(crate::ConfigError::Validation(format!(
                    "Invalid permission: {permission}. Valid permissions: {VALID_PERMISSIONS:?}"
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_address: String,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
    pub request_timeout_seconds: u64,
    pub max_request_size_mb: u64,
    pub auth: AuthConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
            request_timeout_seconds: 30,
            max_request_size_mb: 2,
            auth: AuthConfig::default(),
        }
    }
}

impl ConfigValidator for ApiConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_bind_address(&self.bind_address, "api.bind_address")?;
        ValidationUtils::validate_timeout_seconds(self.request_timeout_seconds)?;

        if self.max_request_size_mb == 0 {
            return Err(crate::ConfigError::Validation(
                "api.max_request_size_mb must be greater than 0".to_string(),
            ));
        }

        if self.max_request_size_mb > 100 {
            return Err(crate::ConfigError::Validation(
                "api.max_request_size_mb must be less than or equal to 100".to_string(),
            ));
        }

        if self.cors_enabled {
            if self.cors_origins.is_empty() {
                return Err(crate::ConfigError::Validation(
                    "api.cors_origins cannot be empty when cors_enabled is true".to_string(),
                ));
            }

            for origin in &self.cors_origins {
                if origin != "*" {
                    ValidationUtils::validate_url(origin, "api.cors_origins")?;
                }
            }
        }

        self.auth.validate()?;

        Ok(())
    }
}
