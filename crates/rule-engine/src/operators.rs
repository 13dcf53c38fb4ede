//! 规则操作符定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    // 通用比较（类型严格）
    Eq,
    Neq,

    // 数值比较
    Gt,
    Gte,
    Lt,
    Lte,
    Between,

    // 包含检查
    In,
    NotIn,
    Contains,
    NotContains,
    ContainsAny,
    ContainsAll,
    SetIs,

    // 字符串操作
    StartsWith,
    EndsWith,
    Regex,
    NotRegex,

    // 版本比较
    VersionLt,
    VersionLte,
    VersionGt,
    VersionGte,

    // 时间操作
    Before,
    After,
}

/// 操作符期望的字面量形态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralShape {
    /// 字符串、数值或布尔值
    Scalar,
    /// 仅数值
    Number,
    /// 仅字符串
    String,
    /// 标量数组
    List,
    /// `[min, max]` 数值区间
    Range,
    /// 正则表达式
    Pattern,
    /// 版本号
    Version,
    /// 日期时间
    Time,
}

impl Operator {
    /// 操作符要求的字面量形态，解析阶段据此校验规则中的值
    pub fn literal_shape(&self) -> LiteralShape {
        match self {
            Self::Eq | Self::Neq => LiteralShape::Scalar,
            Self::Gt | Self::Gte | Self::Lt | Self::Lte => LiteralShape::Number,
            Self::Between => LiteralShape::Range,
            Self::In | Self::NotIn | Self::ContainsAny | Self::ContainsAll | Self::SetIs => {
                LiteralShape::List
            }
            Self::Contains | Self::NotContains | Self::StartsWith | Self::EndsWith => {
                LiteralShape::String
            }
            Self::Regex | Self::NotRegex => LiteralShape::Pattern,
            Self::VersionLt | Self::VersionLte | Self::VersionGt | Self::VersionGte => {
                LiteralShape::Version
            }
            Self::Before | Self::After => LiteralShape::Time,
        }
    }

    /// 否定形式的操作符，属性缺失时视为成立
    pub fn is_negated(&self) -> bool {
        matches!(
            self,
            Self::Neq | Self::NotIn | Self::NotContains | Self::NotRegex
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Between => "between",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::ContainsAny => "contains_any",
            Self::ContainsAll => "contains_all",
            Self::SetIs => "set_is",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Regex => "regex",
            Self::NotRegex => "not_regex",
            Self::VersionLt => "version_lt",
            Self::VersionLte => "version_lte",
            Self::VersionGt => "version_gt",
            Self::VersionGte => "version_gte",
            Self::Before => "before",
            Self::After => "after",
        };
        write!(f, "{}", s)
    }
}

/// 逻辑操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
            Self::Not => write!(f, "NOT"),
        }
    }
}
