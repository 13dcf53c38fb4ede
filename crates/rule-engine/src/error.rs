//! 规则引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则解析失败: {0}")]
    ParseError(String),

    #[error("上下文解析失败: {0}")]
    ContextError(String),

    #[error("规则 ID 重复: {0}")]
    DuplicateRuleId(String),

    #[error("规则 '{rule_id}' 的权重配置无效: {reason}")]
    InvalidWeights { rule_id: String, reason: String },

    #[error("条件树 '{path}' 超出限制: {limit}")]
    LimitExceeded { path: String, limit: String },

    #[error("条件匹配失败: {0}")]
    MatchError(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl RuleError {
    /// 获取错误码
    ///
    /// 除 `MatchError` 外，所有错误都发生在输入解析阶段。
    pub fn code(&self) -> &'static str {
        match self {
            Self::MatchError(_) => "MATCH_ERROR",
            _ => "PARSE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
