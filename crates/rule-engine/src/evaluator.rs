//! 条件评估器
//!
//! 对属性表评估条件树，结果为三值逻辑：`True`、`False`、`Indeterminate`。
//! 比较严格区分类型，不做跨类型转换。属性缺失时，否定操作符（`neq`、`not_in`、
//! `not_contains`、`not_regex`）成立，其余比较为 `Indeterminate`。
//! `Indeterminate` 按不成立处理，永远不会选中规则；`NOT` 将其翻转为 `True`。

use crate::context::{AttrValue, AttributeMap};
use crate::error::{Result, RuleError};
use crate::models::{Comparison, Condition, Literal, Scalar};
use crate::operators::{LogicalOperator, Operator};
use crate::version::Version;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// 三值匹配结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    True,
    False,
    /// 依赖的属性缺失，按不成立处理
    Indeterminate,
}

impl MatchResult {
    pub fn from_bool(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }

    pub fn is_true(self) -> bool {
        self == Self::True
    }

    /// 取反，`Indeterminate` 视同不成立，取反为 `True`
    pub fn negate(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False | Self::Indeterminate => Self::True,
        }
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "true"),
            Self::False => write!(f, "false"),
            Self::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// 条件评估器
#[derive(Debug, Clone)]
pub struct ConditionEvaluator {
    max_depth: usize,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new(crate::context::DEFAULT_MAX_DEPTH)
    }
}

impl ConditionEvaluator {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// 评估条件树
    pub fn evaluate(&self, condition: &Condition, attrs: &AttributeMap) -> Result<MatchResult> {
        self.evaluate_node(condition, attrs, 1)
    }

    fn evaluate_node(
        &self,
        condition: &Condition,
        attrs: &AttributeMap,
        depth: usize,
    ) -> Result<MatchResult> {
        if depth > self.max_depth {
            return Err(RuleError::MatchError(format!(
                "条件树深度超过 {}",
                self.max_depth
            )));
        }

        match condition {
            Condition::Always => Ok(MatchResult::True),
            Condition::Exists(attribute) => Ok(MatchResult::from_bool(attrs.contains(attribute))),
            Condition::Comparison(cmp) => Self::evaluate_comparison(cmp, attrs),
            Condition::Logical { operator, children } => {
                self.evaluate_logical(*operator, children, attrs, depth)
            }
        }
    }

    fn evaluate_comparison(cmp: &Comparison, attrs: &AttributeMap) -> Result<MatchResult> {
        Self::compare(attrs.get(&cmp.attribute), cmp.operator, &cmp.literal)
    }

    /// 评估逻辑组
    ///
    /// AND 遇到 `False` 即停止，OR 遇到 `True` 即停止，按子节点顺序求值。
    fn evaluate_logical(
        &self,
        operator: LogicalOperator,
        children: &[Condition],
        attrs: &AttributeMap,
        depth: usize,
    ) -> Result<MatchResult> {
        if children.is_empty() {
            return Err(RuleError::MatchError(format!("逻辑组 {} 没有子条件", operator)));
        }

        match operator {
            LogicalOperator::Not => {
                let [child] = children else {
                    return Err(RuleError::MatchError(format!(
                        "NOT 需要恰好一个子条件，实际为 {}",
                        children.len()
                    )));
                };
                Ok(self.evaluate_node(child, attrs, depth + 1)?.negate())
            }
            LogicalOperator::And => {
                let mut result = MatchResult::True;
                for child in children {
                    match self.evaluate_node(child, attrs, depth + 1)? {
                        MatchResult::False => return Ok(MatchResult::False),
                        MatchResult::Indeterminate => result = MatchResult::Indeterminate,
                        MatchResult::True => {}
                    }
                }
                Ok(result)
            }
            LogicalOperator::Or => {
                let mut result = MatchResult::False;
                for child in children {
                    match self.evaluate_node(child, attrs, depth + 1)? {
                        MatchResult::True => return Ok(MatchResult::True),
                        MatchResult::Indeterminate => result = MatchResult::Indeterminate,
                        MatchResult::False => {}
                    }
                }
                Ok(result)
            }
        }
    }

    /// 单个比较
    ///
    /// # Arguments
    /// * `value` - 属性值，缺失时为 `None`
    /// * `operator` - 操作符
    /// * `literal` - 规则中的字面量，形态必须与操作符匹配
    pub fn compare(
        value: Option<&AttrValue>,
        operator: Operator,
        literal: &Literal,
    ) -> Result<MatchResult> {
        let Some(value) = value else {
            return Ok(if operator.is_negated() {
                MatchResult::True
            } else {
                MatchResult::Indeterminate
            });
        };

        let matched = match (operator, literal) {
            (Operator::Eq, Literal::Scalar(expected)) => Self::eq(value, expected),
            (Operator::Neq, Literal::Scalar(expected)) => {
                Self::same_type(value, expected) && !Self::eq(value, expected)
            }
            (Operator::Gt, Literal::Scalar(Scalar::Number(n))) => {
                Self::numeric(value, |v| v > *n)
            }
            (Operator::Gte, Literal::Scalar(Scalar::Number(n))) => {
                Self::numeric(value, |v| v >= *n)
            }
            (Operator::Lt, Literal::Scalar(Scalar::Number(n))) => {
                Self::numeric(value, |v| v < *n)
            }
            (Operator::Lte, Literal::Scalar(Scalar::Number(n))) => {
                Self::numeric(value, |v| v <= *n)
            }
            (Operator::Between, Literal::Range { min, max }) => {
                Self::numeric(value, |v| v >= *min && v <= *max)
            }
            (Operator::In, Literal::List(items)) => Self::in_list(value, items),
            (Operator::NotIn, Literal::List(items)) => {
                !matches!(value, AttrValue::Opaque(_)) && !Self::in_list(value, items)
            }
            (Operator::Contains, Literal::Scalar(Scalar::String(needle))) => {
                Self::contains(value, needle).unwrap_or(false)
            }
            (Operator::NotContains, Literal::Scalar(Scalar::String(needle))) => {
                Self::contains(value, needle).is_some_and(|found| !found)
            }
            (Operator::ContainsAny, Literal::List(items)) => value
                .as_set()
                .is_some_and(|set| items.iter().any(|item| Self::set_has(set, item))),
            (Operator::ContainsAll, Literal::List(items)) => value
                .as_set()
                .is_some_and(|set| items.iter().all(|item| Self::set_has(set, item))),
            (Operator::SetIs, Literal::List(items)) => {
                value.as_set().is_some_and(|set| Self::set_is(set, items))
            }
            (Operator::StartsWith, Literal::Scalar(Scalar::String(prefix))) => value
                .as_str()
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            (Operator::EndsWith, Literal::Scalar(Scalar::String(suffix))) => value
                .as_str()
                .is_some_and(|s| s.ends_with(suffix.as_str())),
            (Operator::Regex, Literal::Pattern(re)) => value.as_str().is_some_and(|s| re.is_match(s)),
            (Operator::NotRegex, Literal::Pattern(re)) => {
                value.as_str().is_some_and(|s| !re.is_match(s))
            }
            (Operator::VersionLt, Literal::Version(v)) => Self::version(value, |a| a < *v),
            (Operator::VersionLte, Literal::Version(v)) => Self::version(value, |a| a <= *v),
            (Operator::VersionGt, Literal::Version(v)) => Self::version(value, |a| a > *v),
            (Operator::VersionGte, Literal::Version(v)) => Self::version(value, |a| a >= *v),
            (Operator::Before, Literal::Time(t)) => Self::time(value, |a| a < *t),
            (Operator::After, Literal::Time(t)) => Self::time(value, |a| a > *t),
            (operator, literal) => {
                return Err(RuleError::MatchError(format!(
                    "操作符 {} 不接受 {} 字面量 {}",
                    operator,
                    literal.shape_name(),
                    literal
                )));
            }
        };

        Ok(MatchResult::from_bool(matched))
    }

    /// 类型严格的相等比较，数值按 f64 精确比较
    fn eq(value: &AttrValue, expected: &Scalar) -> bool {
        match (value, expected) {
            (AttrValue::String(a), Scalar::String(b)) => a == b,
            (AttrValue::Number(a), Scalar::Number(b)) => a == b,
            (AttrValue::Bool(a), Scalar::Bool(b)) => a == b,
            _ => false,
        }
    }

    fn same_type(value: &AttrValue, expected: &Scalar) -> bool {
        value.type_name() == expected.type_name()
    }

    fn numeric<F>(value: &AttrValue, cmp: F) -> bool
    where
        F: Fn(f64) -> bool,
    {
        value.as_f64().is_some_and(cmp)
    }

    /// 标量属性等于列表中任一元素；集合属性有任一元素在列表中
    fn in_list(value: &AttrValue, items: &[Scalar]) -> bool {
        match value {
            AttrValue::Set(set) => items.iter().any(|item| Self::set_has(set, item)),
            scalar => items.iter().any(|item| Self::eq(scalar, item)),
        }
    }

    /// 字符串属性做大小写不敏感的子串匹配，集合属性做成员检查；
    /// 其他类型返回 `None`
    fn contains(value: &AttrValue, needle: &str) -> Option<bool> {
        match value {
            AttrValue::String(s) => Some(s.to_lowercase().contains(&needle.to_lowercase())),
            AttrValue::Set(set) => Some(set.contains(needle)),
            _ => None,
        }
    }

    fn set_has(set: &BTreeSet<String>, item: &Scalar) -> bool {
        match item {
            Scalar::String(s) => set.contains(s),
            _ => false,
        }
    }

    fn set_is(set: &BTreeSet<String>, items: &[Scalar]) -> bool {
        let mut expected = BTreeSet::new();
        for item in items {
            match item {
                Scalar::String(s) => {
                    expected.insert(s.as_str());
                }
                _ => return false,
            }
        }
        set.len() == expected.len() && set.iter().all(|s| expected.contains(s.as_str()))
    }

    fn version<F>(value: &AttrValue, cmp: F) -> bool
    where
        F: Fn(Version) -> bool,
    {
        value.as_str().and_then(Version::parse).is_some_and(cmp)
    }

    fn time<F>(value: &AttrValue, cmp: F) -> bool
    where
        F: Fn(DateTime<Utc>) -> bool,
    {
        value.as_str().and_then(parse_datetime).is_some_and(cmp)
    }
}

/// 解析日期时间，支持 RFC 3339 与 `YYYY-MM-DD`
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn cmp(value: impl Into<AttrValue>, operator: Operator, literal: impl Into<Literal>) -> MatchResult {
        let value = value.into();
        ConditionEvaluator::compare(Some(&value), operator, &literal.into()).unwrap()
    }

    fn set(items: &[&str]) -> AttrValue {
        AttrValue::Set(items.iter().map(|s| s.to_string()).collect())
    }

    fn version(s: &str) -> Literal {
        Literal::Version(Version::parse(s).unwrap())
    }

    #[test]
    fn test_eq_is_type_strict() {
        assert_eq!(cmp("US", Operator::Eq, "US"), MatchResult::True);
        assert_eq!(cmp(100.0, Operator::Eq, 100i64), MatchResult::True);
        assert_eq!(cmp("5", Operator::Eq, 5i64), MatchResult::False);
        assert_eq!(cmp(true, Operator::Eq, "true"), MatchResult::False);
        assert_eq!(cmp(set(&["a"]), Operator::Eq, "a"), MatchResult::False);
    }

    #[test]
    fn test_neq_on_wrong_type_is_false() {
        assert_eq!(cmp("US", Operator::Neq, "CA"), MatchResult::True);
        assert_eq!(cmp("US", Operator::Neq, "US"), MatchResult::False);
        assert_eq!(cmp("5", Operator::Neq, 5i64), MatchResult::False);
    }

    #[test]
    fn test_numeric_comparisons() {
        assert_eq!(cmp(100i64, Operator::Gt, 50i64), MatchResult::True);
        assert_eq!(cmp(100i64, Operator::Gte, 100i64), MatchResult::True);
        assert_eq!(cmp(50i64, Operator::Lt, 100i64), MatchResult::True);
        assert_eq!(cmp(100i64, Operator::Lte, 99i64), MatchResult::False);
        // 数值字符串不参与数值比较
        assert_eq!(cmp("100", Operator::Gt, 50i64), MatchResult::False);
    }

    #[test]
    fn test_between() {
        let range = Literal::Range { min: 0.0, max: 100.0 };
        assert_eq!(cmp(50i64, Operator::Between, range.clone()), MatchResult::True);
        assert_eq!(cmp(100i64, Operator::Between, range.clone()), MatchResult::True);
        assert_eq!(cmp(150i64, Operator::Between, range), MatchResult::False);
    }

    #[test]
    fn test_in_list() {
        let list = Literal::list(["a", "b", "c"]);
        assert_eq!(cmp("a", Operator::In, list.clone()), MatchResult::True);
        assert_eq!(cmp("d", Operator::In, list.clone()), MatchResult::False);
        assert_eq!(cmp("d", Operator::NotIn, list.clone()), MatchResult::True);
        assert_eq!(cmp(set(&["x", "b"]), Operator::In, list), MatchResult::True);

        let numbers = Literal::list([1i64, 2, 3]);
        assert_eq!(cmp(2i64, Operator::In, numbers.clone()), MatchResult::True);
        assert_eq!(cmp("2", Operator::In, numbers), MatchResult::False);
    }

    #[test]
    fn test_contains() {
        assert_eq!(cmp("Hello World", Operator::Contains, "world"), MatchResult::True);
        assert_eq!(cmp(set(&["vip", "beta"]), Operator::Contains, "vip"), MatchResult::True);
        assert_eq!(cmp(set(&["vip"]), Operator::Contains, "VIP"), MatchResult::False);
        assert_eq!(cmp(42i64, Operator::Contains, "4"), MatchResult::False);
    }

    #[test]
    fn test_not_contains() {
        assert_eq!(cmp("hello", Operator::NotContains, "xyz"), MatchResult::True);
        assert_eq!(cmp(set(&["vip"]), Operator::NotContains, "vip"), MatchResult::False);
        assert_eq!(cmp(42i64, Operator::NotContains, "x"), MatchResult::False);
    }

    #[test]
    fn test_set_operators() {
        let tags = set(&["a", "b", "c"]);
        assert_eq!(
            cmp(tags.clone(), Operator::ContainsAny, Literal::list(["x", "c"])),
            MatchResult::True
        );
        assert_eq!(
            cmp(tags.clone(), Operator::ContainsAll, Literal::list(["a", "c"])),
            MatchResult::True
        );
        assert_eq!(
            cmp(tags.clone(), Operator::ContainsAll, Literal::list(["a", "x"])),
            MatchResult::False
        );
        assert_eq!(
            cmp(tags.clone(), Operator::SetIs, Literal::list(["c", "b", "a"])),
            MatchResult::True
        );
        assert_eq!(
            cmp(tags, Operator::SetIs, Literal::list(["a", "b"])),
            MatchResult::False
        );
        assert_eq!(
            cmp("a", Operator::ContainsAny, Literal::list(["a"])),
            MatchResult::False
        );
    }

    #[test]
    fn test_string_prefix_suffix() {
        assert_eq!(cmp("hello world", Operator::StartsWith, "hello"), MatchResult::True);
        assert_eq!(cmp("hello world", Operator::EndsWith, "world"), MatchResult::True);
        assert_eq!(cmp("hello", Operator::EndsWith, "HELLO"), MatchResult::False);
    }

    #[test]
    fn test_regex() {
        let pattern = Literal::Pattern(Regex::new(r"^\d{3}-\d{4}$").unwrap());
        assert_eq!(cmp("123-4567", Operator::Regex, pattern.clone()), MatchResult::True);
        assert_eq!(cmp("1234567", Operator::Regex, pattern.clone()), MatchResult::False);
        assert_eq!(cmp("1234567", Operator::NotRegex, pattern.clone()), MatchResult::True);
        assert_eq!(cmp(1234567i64, Operator::Regex, pattern.clone()), MatchResult::False);
        assert_eq!(cmp(1234567i64, Operator::NotRegex, pattern), MatchResult::False);
    }

    #[test]
    fn test_versions() {
        assert_eq!(cmp("1.10.0", Operator::VersionGt, version("1.9.9")), MatchResult::True);
        assert_eq!(cmp("2.0.0-beta", Operator::VersionLt, version("2.0.0")), MatchResult::True);
        assert_eq!(cmp("1.2", Operator::VersionGte, version("1.2.0")), MatchResult::True);
        assert_eq!(cmp("1.2", Operator::VersionLte, version("1.1")), MatchResult::False);
        assert_eq!(cmp("not-a-version", Operator::VersionGt, version("0.0.1")), MatchResult::False);
    }

    #[test]
    fn test_time_comparison() {
        let cutoff = Literal::Time(parse_datetime("2024-06-01").unwrap());
        assert_eq!(cmp("2024-01-15T10:00:00Z", Operator::Before, cutoff.clone()), MatchResult::True);
        assert_eq!(cmp("2024-12-31", Operator::After, cutoff.clone()), MatchResult::True);
        assert_eq!(cmp("yesterday", Operator::After, cutoff), MatchResult::False);
    }

    #[test]
    fn test_missing_attribute() {
        let pattern = Literal::Pattern(Regex::new("x").unwrap());
        let cases = [
            (Operator::Eq, Literal::from("x"), MatchResult::Indeterminate),
            (Operator::Gt, Literal::from(1i64), MatchResult::Indeterminate),
            (Operator::In, Literal::list(["x"]), MatchResult::Indeterminate),
            (Operator::Contains, Literal::from("x"), MatchResult::Indeterminate),
            (Operator::Regex, pattern.clone(), MatchResult::Indeterminate),
            (Operator::Neq, Literal::from("x"), MatchResult::True),
            (Operator::NotIn, Literal::list(["x"]), MatchResult::True),
            (Operator::NotContains, Literal::from("x"), MatchResult::True),
            (Operator::NotRegex, pattern, MatchResult::True),
        ];

        for (op, literal, expected) in cases {
            assert_eq!(ConditionEvaluator::compare(None, op, &literal).unwrap(), expected, "{}", op);
        }
    }

    #[test]
    fn test_opaque_attribute_never_compares() {
        let opaque = AttrValue::Opaque(serde_json::json!([1, 2, 3]));
        let pattern = Literal::Pattern(Regex::new(".*").unwrap());
        let cases = [
            (Operator::Eq, Literal::from(1i64)),
            (Operator::Neq, Literal::from(1i64)),
            (Operator::Gt, Literal::from(0i64)),
            (Operator::In, Literal::list([1i64, 2])),
            (Operator::NotIn, Literal::list(["x"])),
            (Operator::Contains, Literal::from("1")),
            (Operator::NotContains, Literal::from("x")),
            (Operator::ContainsAny, Literal::list(["1"])),
            (Operator::SetIs, Literal::list(["1", "2", "3"])),
            (Operator::StartsWith, Literal::from("[")),
            (Operator::Regex, pattern.clone()),
            (Operator::NotRegex, pattern),
        ];

        for (op, literal) in cases {
            assert_eq!(cmp(opaque.clone(), op, literal), MatchResult::False, "{}", op);
        }

        let attrs = AttributeMap::new().with("scores", opaque);
        let evaluator = ConditionEvaluator::default();
        assert!(evaluator.evaluate(&Condition::exists("scores"), &attrs).unwrap().is_true());
    }

    #[test]
    fn test_literal_shape_mismatch_is_match_error() {
        let err = ConditionEvaluator::compare(
            Some(&AttrValue::from(5i64)),
            Operator::Gt,
            &Literal::from("five"),
        )
        .unwrap_err();
        assert_eq!(err.code(), "MATCH_ERROR");
    }

    #[test]
    fn test_exists_and_always() {
        let evaluator = ConditionEvaluator::default();
        let attrs = AttributeMap::new().with("email", "a@b.c");

        assert!(evaluator.evaluate(&Condition::exists("email"), &attrs).unwrap().is_true());
        assert_eq!(
            evaluator.evaluate(&Condition::exists("phone"), &attrs).unwrap(),
            MatchResult::False
        );
        assert!(evaluator.evaluate(&Condition::Always, &attrs).unwrap().is_true());
    }

    #[test]
    fn test_kleene_logic() {
        let evaluator = ConditionEvaluator::default();
        let attrs = AttributeMap::new().with("country", "US");
        let t = Condition::comparison("country", Operator::Eq, "US");
        let f = Condition::comparison("country", Operator::Eq, "CA");
        let u = Condition::comparison("missing", Operator::Eq, "x");

        let eval = |c: Condition| evaluator.evaluate(&c, &attrs).unwrap();

        assert_eq!(eval(Condition::and(vec![t.clone(), u.clone()])), MatchResult::Indeterminate);
        assert_eq!(eval(Condition::and(vec![u.clone(), f.clone()])), MatchResult::False);
        assert_eq!(eval(Condition::or(vec![u.clone(), t.clone()])), MatchResult::True);
        assert_eq!(eval(Condition::or(vec![f.clone(), u.clone()])), MatchResult::Indeterminate);
        assert_eq!(eval(Condition::not(f)), MatchResult::True);
        // 缺失属性的比较不成立，取反后成立
        assert_eq!(eval(Condition::not(u.clone())), MatchResult::True);
        assert_eq!(eval(Condition::not(Condition::and(vec![t, u]))), MatchResult::True);
    }

    #[test]
    fn test_short_circuit_skips_invalid_child() {
        // AND 在第一个 False 处停止，后续的非法节点不会被求值
        let evaluator = ConditionEvaluator::default();
        let attrs = AttributeMap::new().with("country", "CA");
        let cond = Condition::and(vec![
            Condition::comparison("country", Operator::Eq, "US"),
            Condition::and(vec![]),
        ]);
        assert_eq!(evaluator.evaluate(&cond, &attrs).unwrap(), MatchResult::False);
    }

    #[test]
    fn test_invalid_logical_nodes() {
        let evaluator = ConditionEvaluator::default();
        let attrs = AttributeMap::new();

        let empty = evaluator.evaluate(&Condition::or(vec![]), &attrs).unwrap_err();
        assert_eq!(empty.code(), "MATCH_ERROR");

        let bad_not = Condition::Logical {
            operator: LogicalOperator::Not,
            children: vec![Condition::Always, Condition::Always],
        };
        assert!(evaluator.evaluate(&bad_not, &attrs).is_err());
    }

    #[test]
    fn test_depth_limit() {
        let evaluator = ConditionEvaluator::new(2);
        let attrs = AttributeMap::new();

        let shallow = Condition::not(Condition::Always);
        assert!(evaluator.evaluate(&shallow, &attrs).is_ok());

        let deep = Condition::not(Condition::not(Condition::Always));
        assert!(evaluator.evaluate(&deep, &attrs).is_err());
    }

    #[test]
    fn test_parse_datetime() {
        assert!(parse_datetime("2024-01-15T10:30:00+08:00").is_some());
        assert!(parse_datetime("2024-01-15").is_some());
        assert!(parse_datetime("15/01/2024").is_none());
    }
}
