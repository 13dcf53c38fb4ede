//! 规则引擎领域模型
//!
//! 解析器校验后的规则结构。与 [`crate::document`] 的传输格式不同，
//! 这里的字面量已按操作符要求转换为类型化形态（正则已编译、版本与时间已解析）。

use crate::operators::{LogicalOperator, Operator};
use crate::version::Version;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;

/// 标量字面量
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Number(f64),
    Bool(bool),
}

impl Scalar {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Bool(_) => "boolean",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{:?}", s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// 类型化字面量
#[derive(Debug, Clone)]
pub enum Literal {
    Scalar(Scalar),
    List(Vec<Scalar>),
    Range { min: f64, max: f64 },
    Pattern(Regex),
    Version(Version),
    Time(DateTime<Utc>),
}

impl Literal {
    /// 构建列表字面量
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scalar>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// 字面量形态名称，用于错误信息
    pub fn shape_name(&self) -> &'static str {
        match self {
            Self::Scalar(s) => s.type_name(),
            Self::List(_) => "list",
            Self::Range { .. } => "range",
            Self::Pattern(_) => "pattern",
            Self::Version(_) => "version",
            Self::Time(_) => "time",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => write!(f, "{}", s),
            Self::List(items) => {
                let items: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Self::Range { min, max } => write!(f, "[{}, {}]", min, max),
            Self::Pattern(re) => write!(f, "/{}/", re.as_str()),
            Self::Version(v) => write!(f, "{}", v),
            Self::Time(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

macro_rules! scalar_literal_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Literal {
                fn from(value: $ty) -> Self {
                    Self::Scalar(value.into())
                }
            }
        )*
    };
}

scalar_literal_from!(&str, String, f64, i64, bool);

impl From<Scalar> for Literal {
    fn from(value: Scalar) -> Self {
        Self::Scalar(value)
    }
}

/// 比较条件
#[derive(Debug, Clone)]
pub struct Comparison {
    pub attribute: String,
    pub operator: Operator,
    pub literal: Literal,
}

/// 条件树节点
#[derive(Debug, Clone)]
pub enum Condition {
    Comparison(Comparison),
    Logical {
        operator: LogicalOperator,
        children: Vec<Condition>,
    },
    Exists(String),
    Always,
}

impl Condition {
    pub fn comparison(
        attribute: impl Into<String>,
        operator: Operator,
        literal: impl Into<Literal>,
    ) -> Self {
        Self::Comparison(Comparison {
            attribute: attribute.into(),
            operator,
            literal: literal.into(),
        })
    }

    pub fn and(children: Vec<Condition>) -> Self {
        Self::Logical {
            operator: LogicalOperator::And,
            children,
        }
    }

    pub fn or(children: Vec<Condition>) -> Self {
        Self::Logical {
            operator: LogicalOperator::Or,
            children,
        }
    }

    pub fn not(child: Condition) -> Self {
        Self::Logical {
            operator: LogicalOperator::Not,
            children: vec![child],
        }
    }

    pub fn exists(attribute: impl Into<String>) -> Self {
        Self::Exists(attribute.into())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comparison(c) => write!(f, "{} {} {}", c.attribute, c.operator, c.literal),
            Self::Logical { operator, children } => {
                let parts: Vec<String> = children.iter().map(ToString::to_string).collect();
                write!(f, "{}({})", operator, parts.join(", "))
            }
            Self::Exists(attribute) => write!(f, "exists({})", attribute),
            Self::Always => write!(f, "always"),
        }
    }
}

/// 加权分配中的变体
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub label: String,
    pub weight: u32,
    pub value: Value,
    pub metadata: Map<String, Value>,
}

impl Variant {
    /// 变体值缺省时以标签作为值
    pub fn new(label: impl Into<String>, weight: u32) -> Self {
        let label = label.into();
        Self {
            value: Value::String(label.clone()),
            label,
            weight,
            metadata: Map::new(),
        }
    }
}

/// 加权分配结果
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedOutcome {
    pub variants: Vec<Variant>,
    /// 参与分配的流量百分比 (0..=100)
    pub allocation: u32,
    pub salt: Option<String>,
    pub bucket_by: Option<String>,
    pub fallback: Value,
}

impl WeightedOutcome {
    pub fn new(variants: Vec<Variant>) -> Self {
        Self {
            variants,
            allocation: 100,
            salt: None,
            bucket_by: None,
            fallback: Value::Null,
        }
    }

    pub fn with_allocation(mut self, allocation: u32) -> Self {
        self.allocation = allocation;
        self
    }

    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn with_bucket_by(mut self, attribute: impl Into<String>) -> Self {
        self.bucket_by = Some(attribute.into());
        self
    }
}

/// 规则结果
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Fixed {
        value: Value,
        variant: Option<String>,
    },
    Weighted(WeightedOutcome),
}

impl Outcome {
    pub fn fixed(value: impl Into<Value>) -> Self {
        Self::Fixed {
            value: value.into(),
            variant: None,
        }
    }
}

/// 规则定义
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub condition: Condition,
    pub outcome: Outcome,
    /// 非终止规则之间按优先级覆盖，数值越大优先级越高
    pub priority: i32,
    /// 终止规则命中后停止扫描
    pub terminal: bool,
    pub metadata: Map<String, Value>,
}

impl Rule {
    pub fn new(id: impl Into<String>, condition: Condition, outcome: Outcome) -> Self {
        Self {
            id: id.into(),
            condition,
            outcome,
            priority: 0,
            terminal: true,
            metadata: Map::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn non_terminal(mut self) -> Self {
        self.terminal = false;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// 已校验的规则集
///
/// 只能通过 [`crate::parser::RuleSetParser`] 构建，规则顺序与声明顺序一致。
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    default: Value,
    bucketing_key: Option<String>,
}

impl RuleSet {
    pub(crate) fn new(rules: Vec<Rule>, default: Value, bucketing_key: Option<String>) -> Self {
        Self {
            rules,
            default,
            bucketing_key,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// 无规则命中时的默认值
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// 文档级分桶属性
    pub fn bucketing_key(&self) -> Option<&str> {
        self.bucketing_key.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
