use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api::ApiConfig,
    database::DatabaseConfig,
    jobs::{CleanupConfig, JobsConfig, NotificationsConfig},
    observability::ObservabilityConfig,
};
use crate::validation::ConfigValidator;

/// 环境变量前缀，例如 `STREETWISE__DATABASE__URL`
pub const ENV_PREFIX: &str = "STREETWISE";
pub const ENV_SEPARATOR: &str = "__";

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/streetwise.toml",
    "streetwise.toml",
    "/etc/streetwise/config.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub jobs: JobsConfig,
    pub notifications: NotificationsConfig,
    pub cleanup: CleanupConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 加载配置：TOML 文件（显式路径或默认路径）+ 环境变量覆盖
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .list_separator(",")
                .with_list_parse_key("api.cors_origins")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.database.validate()?;
        self.api.validate()?;
        self.jobs.validate()?;
        self.notifications.validate()?;
        self.cleanup.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}
