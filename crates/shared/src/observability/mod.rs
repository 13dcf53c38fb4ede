//! 可观测性模块
//!
//! 日志初始化的统一入口。库代码只使用 `tracing` 宏，订阅器由二进制在启动时安装。

pub mod tracing;

use anyhow::Result;
use serde::Deserialize;

/// 可观测性配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 日志级别（如 "info", "debug"），`RUST_LOG` 优先
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// 初始化日志订阅器
///
/// # Example
///
/// ```ignore
/// use targeting_shared::config::AppConfig;
/// use targeting_shared::observability::init_tracing;
///
/// fn main() -> anyhow::Result<()> {
///     let config = AppConfig::load("rule-engine")?;
///     init_tracing(&config.observability)?;
///     Ok(())
/// }
/// ```
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    self::tracing::init(config)?;
    ::tracing::debug!(
        log_level = %config.log_level,
        log_format = %config.log_format,
        "日志已初始化"
    );
    Ok(())
}
