//! 属性上下文
//!
//! 将用户/上下文 JSON 解析为类型化的属性表。类型由字面量形式决定，
//! 不做隐式转换：字符串 → string，数值 → number，`true`/`false` → boolean，
//! 字符串数组 → set，`null` 视为属性不存在。其他数组原样保留为不透明值，
//! 可被 `exists` 检测，但不参与任何类型化比较。
//! 嵌套对象按点号展开，如 `{"user": {"country": "US"}}` → `user.country`。

use crate::error::{Result, RuleError};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// 默认最大嵌套深度
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// 属性值
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    String(String),
    Number(f64),
    Bool(bool),
    Set(BTreeSet<String>),
    /// 非字符串元素的数组
    Opaque(Value),
}

impl AttrValue {
    /// 获取值的类型名称
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Bool(_) => "boolean",
            Self::Set(_) => "set",
            Self::Opaque(_) => "opaque",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Set(set) => Some(set),
            _ => None,
        }
    }

    /// 从单个 JSON 值转换，`null` 与无法表示的数值返回 `None`，对象保留为不透明值
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::Array(items) => Some(match string_set(items) {
                Some(set) => Self::Set(set),
                None => Self::Opaque(value.clone()),
            }),
            Value::Object(_) => Some(Self::Opaque(value.clone())),
        }
    }
}

/// 全部元素为字符串时构成集合
fn string_set(items: &[Value]) -> Option<BTreeSet<String>> {
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{:?}", s),
            Self::Number(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Set(set) => {
                let items: Vec<String> = set.iter().map(|s| format!("{:?}", s)).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Self::Opaque(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// 属性表 - 单次评估的输入数据，构建后不可变
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMap {
    values: BTreeMap<String, AttrValue>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 字符串解析（使用默认嵌套深度限制）
    pub fn from_json(json: &str) -> Result<Self> {
        Self::parse(json, DEFAULT_MAX_DEPTH)
    }

    /// 从 JSON 字符串解析
    pub fn parse(json: &str, max_depth: usize) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| RuleError::ContextError(format!("无效的 JSON: {}", e)))?;
        Self::from_value(&value, max_depth)
    }

    /// 从 JSON 值构建，顶层必须是对象
    pub fn from_value(value: &Value, max_depth: usize) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            RuleError::ContextError(format!("上下文顶层必须是对象，实际为 {}", json_type(value)))
        })?;

        let mut map = Self::new();
        map.flatten(object, "", 1, max_depth)?;
        Ok(map)
    }

    /// 递归展开嵌套对象
    fn flatten(
        &mut self,
        object: &Map<String, Value>,
        prefix: &str,
        depth: usize,
        max_depth: usize,
    ) -> Result<()> {
        if depth > max_depth {
            return Err(RuleError::ContextError(format!(
                "'{}' 嵌套深度超过 {}",
                prefix, max_depth
            )));
        }

        for (key, value) in object {
            let name = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };

            let typed = match value {
                Value::Null => continue,
                Value::Object(nested) => {
                    self.flatten(nested, &name, depth + 1, max_depth)?;
                    continue;
                }
                other => AttrValue::from_json(other).ok_or_else(|| {
                    RuleError::ContextError(format!("属性 '{}' 的值无法表示: {}", name, other))
                })?,
            };

            self.insert_unique(name, typed)?;
        }

        Ok(())
    }

    /// 展开后出现同名属性（如 `"a.b"` 与 `{"a": {"b": ..}}`）视为结构错误
    fn insert_unique(&mut self, name: String, value: AttrValue) -> Result<()> {
        if self.values.contains_key(&name) {
            return Err(RuleError::ContextError(format!("属性 '{}' 重复定义", name)));
        }
        self.values.insert(name, value);
        Ok(())
    }

    /// 添加属性（用于程序化构建），返回自身以便链式调用
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// 写入属性，覆盖同名值
    pub(crate) fn set(&mut self, name: String, value: AttrValue) {
        self.values.insert(name, value);
    }

    /// 获取属性值
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.values.get(name)
    }

    /// 属性是否存在
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.values.iter()
    }
}

/// 获取 JSON 值的类型名称
pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
