//! 引擎配置

use config::ConfigError;
use serde::{Deserialize, Serialize};
use targeting_shared::config::{ConfigSource, section};

/// 配置段名称
pub const SECTION: &str = "engine";

/// 规则引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 条件树与上下文的最大嵌套深度
    pub max_depth: usize,
    /// 逻辑组的最大子条件数
    pub max_children: usize,
    /// 变体权重总和
    pub weight_total: u32,
    /// 默认分桶属性
    pub bucketing_key: String,
    /// 决策中是否附带评估追踪
    pub trace_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_children: 256,
            weight_total: 100,
            bucketing_key: "user_id".to_string(),
            trace_enabled: false,
        }
    }
}

impl EngineConfig {
    /// 从分层配置读取 `engine` 段
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        Self::load_from(&ConfigSource::from_env(), service_name)
    }

    pub fn load_from(source: &ConfigSource, service_name: &str) -> Result<Self, ConfigError> {
        section(&source.load(service_name)?, SECTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_depth, 32);
        assert_eq!(config.max_children, 256);
        assert_eq!(config.weight_total, 100);
        assert_eq!(config.bucketing_key, "user_id");
        assert!(!config.trace_enabled);
    }

    #[test]
    fn test_load_partial_section() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("rule-engine.toml"),
            "[engine]\nweight_total = 10000\ntrace_enabled = true\n",
        )
        .unwrap();

        let source = ConfigSource {
            config_dir: dir.path().to_path_buf(),
            environment: "test".to_string(),
        };
        let config = EngineConfig::load_from(&source, "rule-engine").unwrap();

        assert_eq!(config.weight_total, 10_000);
        assert!(config.trace_enabled);
        assert_eq!(config.max_depth, 32);
    }

    #[test]
    fn test_load_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = ConfigSource {
            config_dir: dir.path().to_path_buf(),
            environment: "test".to_string(),
        };
        assert_eq!(
            EngineConfig::load_from(&source, "rule-engine").unwrap(),
            EngineConfig::default()
        );
    }
}
