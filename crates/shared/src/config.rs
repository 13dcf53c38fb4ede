//! 配置管理模块
//!
//! 分层加载配置文件与环境变量。各服务在此基础上读取自己的配置段。

use crate::observability::ObservabilityConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "TARGETING";

/// 配置来源：目录与运行环境
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub config_dir: PathBuf,
    pub environment: String,
}

impl Default for ConfigSource {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("config"),
            environment: "development".to_string(),
        }
    }
}

impl ConfigSource {
    /// 从环境变量读取（`CONFIG_DIR`、`TARGETING_ENV`）
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            config_dir: std::env::var("CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.config_dir),
            environment: std::env::var(format!("{}_ENV", ENV_PREFIX))
                .unwrap_or(defaults.environment),
        }
    }

    /// 构建分层配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. {config_dir}/default.toml
    /// 2. {config_dir}/{environment}.toml
    /// 3. {config_dir}/{service_name}.toml
    /// 4. 环境变量（TARGETING_ 前缀，`__` 分隔层级，如 TARGETING_ENGINE__MAX_DEPTH -> engine.max_depth）
    pub fn load(&self, service_name: &str) -> Result<Config, ConfigError> {
        let dir = Path::new(&self.config_dir);

        Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", self.environment.clone())?
            .add_source(File::from(dir.join("default.toml")).required(false))
            .add_source(File::from(dir.join(format!("{}.toml", self.environment))).required(false))
            .add_source(File::from(dir.join(format!("{}.toml", service_name))).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
    }
}

/// 读取某个配置段，缺失时使用默认值
pub fn section<T>(config: &Config, key: &str) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match config.get::<T>(key) {
        Ok(value) => Ok(value),
        Err(ConfigError::NotFound(_)) => Ok(T::default()),
        Err(e) => Err(e),
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        Self::load_from(&ConfigSource::from_env(), service_name)
    }

    pub fn load_from(source: &ConfigSource, service_name: &str) -> Result<Self, ConfigError> {
        source.load(service_name)?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
