//! 规则文档传输格式
//!
//! 规则文档的 JSON 结构。这里只描述形状，字面量与约束校验由
//! [`crate::parser::RuleSetParser`] 完成。

use crate::operators::{LogicalOperator, Operator};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 规则集文档
///
/// ```json
/// {
///   "rules": [{"id": "r1", "condition": {...}, "outcome": "on"}],
///   "default": "off",
///   "bucketing_key": "user_id"
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSetDocument {
    pub rules: Vec<RuleDefinition>,
    #[serde(default)]
    pub default: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucketing_key: Option<String>,
}

/// 多规则集文档
///
/// ```json
/// {
///   "rule_sets": [
///     {"key": "new-ui", "rules": [...]},
///     {"key": "checkout", "depends_on": ["new-ui"], "rules": [...], "default": "control"}
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleDocument {
    pub rule_sets: Vec<KeyedRuleSetDocument>,
}

/// 带键的规则集
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyedRuleSetDocument {
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(flatten)]
    pub document: RuleSetDocument,
}

/// 单条规则
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    #[serde(default = "ConditionNode::always")]
    pub condition: ConditionNode,
    /// 非对象或不带 `type` 字段的值视为固定结果
    #[serde(default)]
    pub outcome: Value,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_terminal")]
    pub terminal: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

fn default_terminal() -> bool {
    true
}

/// 条件节点
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionNode {
    Comparison {
        attribute: String,
        operator: Operator,
        value: Value,
    },
    Logical {
        operator: LogicalOperator,
        #[serde(default)]
        children: Vec<ConditionNode>,
    },
    Exists {
        attribute: String,
    },
    Always,
}

impl ConditionNode {
    fn always() -> Self {
        Self::Always
    }
}

/// 规则结果定义
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutcomeDefinition {
    Fixed {
        #[serde(default)]
        value: Value,
        #[serde(default)]
        variant: Option<String>,
    },
    Weighted {
        variants: Vec<VariantDefinition>,
        #[serde(default)]
        allocation: Option<i64>,
        #[serde(default)]
        salt: Option<String>,
        #[serde(default)]
        bucket_by: Option<String>,
        #[serde(default)]
        fallback: Value,
    },
}

impl OutcomeDefinition {
    /// 从规则中的 `outcome` 字段解析
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        match &value {
            Value::Object(obj) if obj.contains_key("type") => serde_json::from_value(value),
            _ => Ok(Self::Fixed {
                value,
                variant: None,
            }),
        }
    }
}

/// 变体定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantDefinition {
    pub label: String,
    pub weight: i64,
    /// 缺省时以标签作为值
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}
