//! 评估结果
//!
//! 决策及其 JSON 编码。成功与失败都编码为同一种带 `status` 标签的响应，
//! 调用方只需解析一次即可区分。

use crate::error::{Result, RuleError};
use crate::evaluator::MatchResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 编码失败时的兜底响应
pub(crate) const FALLBACK_ERROR_JSON: &str =
    r#"{"status":"error","error":{"code":"MATCH_ERROR","message":"响应编码失败"}}"#;

/// 单次评估的决策
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// 命中的规则 ID，无命中时为 `null`
    pub rule_id: Option<String>,
    /// 选中的变体标签
    pub variant: Option<String>,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<BucketAssignment>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<TraceEntry>,
}

impl Decision {
    /// 无规则命中时的默认决策
    pub fn no_match(default: Value) -> Self {
        Self {
            rule_id: None,
            variant: None,
            value: default,
            bucket: None,
            metadata: Map::new(),
            trace: Vec::new(),
        }
    }

    pub fn is_match(&self) -> bool {
        self.rule_id.is_some()
    }
}

/// 分桶信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketAssignment {
    pub identifier: String,
    pub salt: String,
    /// 流量分配槽位 `hash % 100`
    pub slot: u32,
    /// 变体桶 `(hash / 100) % 10000`
    pub bucket: u32,
    /// 是否落在分配流量内
    pub allocated: bool,
}

/// 规则评估追踪
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub rule_id: String,
    pub result: MatchResult,
    pub action: TraceAction,
}

/// 规则在解析过程中的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceAction {
    /// 当前被选中
    Selected,
    /// 曾被选中，后被更高优先级规则覆盖
    Overridden,
    /// 命中但保留了更早的选择
    KeptEarlier,
    /// 未命中
    Skipped,
}

/// 错误信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl From<&RuleError> for ErrorPayload {
    fn from(err: &RuleError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// 评估响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationResponse {
    Ok { decision: Decision },
    Error { error: ErrorPayload },
}

impl EvaluationResponse {
    pub fn from_result(result: Result<Decision>) -> Self {
        match result {
            Ok(decision) => Self::Ok { decision },
            Err(err) => Self::from_error(&err),
        }
    }

    pub fn from_error(err: &RuleError) -> Self {
        Self::Error { error: err.into() }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn decision(&self) -> Option<&Decision> {
        match self {
            Self::Ok { decision } => Some(decision),
            Self::Error { .. } => None,
        }
    }

    /// 编码为 JSON，编码失败时返回固定的错误响应
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| FALLBACK_ERROR_JSON.to_string())
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| FALLBACK_ERROR_JSON.to_string())
    }

    /// 解析响应 JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// 解析 [`crate::evaluate`] 的输出
pub fn parse_response(json: &str) -> Result<EvaluationResponse> {
    EvaluationResponse::from_json(json)
}

/// 多规则集评估响应，决策按规则集 key 排序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BundleResponse {
    Ok { decisions: BTreeMap<String, Decision> },
    Error { error: ErrorPayload },
}

impl BundleResponse {
    pub fn from_result(result: Result<BTreeMap<String, Decision>>) -> Self {
        match result {
            Ok(decisions) => Self::Ok { decisions },
            Err(err) => Self::Error { error: (&err).into() },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| FALLBACK_ERROR_JSON.to_string())
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| FALLBACK_ERROR_JSON.to_string())
    }
}

/// 解析 [`crate::evaluate_all`] 的输出
pub fn parse_bundle_response(json: &str) -> Result<BundleResponse> {
    Ok(serde_json::from_str(json)?)
}
