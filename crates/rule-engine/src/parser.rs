//! 规则集解析器
//!
//! 将 JSON 规则文档解析为校验后的 [`RuleSet`]：字面量按操作符转换为类型化形态，
//! 并检查规则 ID 唯一、条件树深度/宽度限制、权重配置等约束。

use crate::bundle::{KeyedRuleSet, RuleSetBundle};
use crate::config::EngineConfig;
use crate::context::json_type;
use crate::document::{
    BundleDocument, ConditionNode, OutcomeDefinition, RuleDefinition, RuleSetDocument,
};
use crate::error::{Result, RuleError};
use crate::evaluator::parse_datetime;
use crate::models::{Condition, Literal, Outcome, Rule, RuleSet, Scalar, Variant, WeightedOutcome};
use crate::operators::{LiteralShape, LogicalOperator, Operator};
use crate::version::Version;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, instrument};

/// 流量分配百分比上限
const MAX_ALLOCATION: u32 = 100;

/// 规则集解析器
#[derive(Debug, Clone)]
pub struct RuleSetParser {
    max_depth: usize,
    max_children: usize,
    weight_total: u32,
}

impl Default for RuleSetParser {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl RuleSetParser {
    pub fn new(max_depth: usize, max_children: usize, weight_total: u32) -> Self {
        Self {
            max_depth,
            max_children,
            weight_total,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_depth, config.max_children, config.weight_total)
    }

    /// 从 JSON 字符串解析规则集
    ///
    /// 文档可以是 `{"rules": [...], "default": ..}` 对象，也可以直接是规则数组。
    #[instrument(skip_all, fields(bytes = json.len()))]
    pub fn parse(&self, json: &str) -> Result<RuleSet> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| RuleError::ParseError(format!("规则文档不是合法的 JSON: {}", e)))?;

        let document = match value {
            Value::Array(_) => RuleSetDocument {
                rules: serde_json::from_value(value).map_err(Self::schema_error)?,
                ..Default::default()
            },
            Value::Object(_) => serde_json::from_value(value).map_err(Self::schema_error)?,
            other => {
                return Err(RuleError::ParseError(format!(
                    "规则文档必须是对象或数组，实际为 {}",
                    json_type(&other)
                )));
            }
        };

        self.parse_document(document)
    }

    /// 解析多规则集文档并按依赖排序
    ///
    /// 文档可以是 `{"rule_sets": [...]}` 对象，也可以直接是带键规则集的数组。
    #[instrument(skip_all, fields(bytes = json.len()))]
    pub fn parse_bundle(&self, json: &str) -> Result<RuleSetBundle> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| RuleError::ParseError(format!("规则文档不是合法的 JSON: {}", e)))?;

        let document = match value {
            Value::Array(_) => BundleDocument {
                rule_sets: serde_json::from_value(value).map_err(Self::schema_error)?,
            },
            Value::Object(_) => serde_json::from_value(value).map_err(Self::schema_error)?,
            other => {
                return Err(RuleError::ParseError(format!(
                    "规则文档必须是对象或数组，实际为 {}",
                    json_type(&other)
                )));
            }
        };

        let entries = document
            .rule_sets
            .into_iter()
            .map(|keyed| -> Result<KeyedRuleSet> {
                Ok(KeyedRuleSet {
                    rule_set: self.parse_document(keyed.document)?,
                    key: keyed.key,
                    depends_on: keyed.depends_on,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let bundle = RuleSetBundle::new(entries)?;
        debug!(rule_sets = bundle.len(), "规则集组解析完成");
        Ok(bundle)
    }

    fn schema_error(e: serde_json::Error) -> RuleError {
        RuleError::ParseError(format!("规则文档结构无效: {}", e))
    }

    /// 从已反序列化的文档构建规则集
    pub fn parse_document(&self, document: RuleSetDocument) -> Result<RuleSet> {
        let rules = document
            .rules
            .into_iter()
            .enumerate()
            .map(|(index, definition)| self.build_rule(index, definition))
            .collect::<Result<Vec<_>>>()?;

        let rule_set = self.assemble(rules, document.default, document.bucketing_key)?;
        debug!(rules = rule_set.len(), "规则集解析完成");
        Ok(rule_set)
    }

    /// 校验程序化构建的规则并组装为规则集
    pub fn assemble(
        &self,
        rules: Vec<Rule>,
        default: Value,
        bucketing_key: Option<String>,
    ) -> Result<RuleSet> {
        if self.weight_total == 0 {
            return Err(RuleError::ParseError("权重总和配置必须大于 0".to_string()));
        }

        if bucketing_key.as_deref() == Some("") {
            return Err(RuleError::ParseError("bucketing_key 不能为空".to_string()));
        }

        let mut seen = HashSet::new();
        for rule in &rules {
            if rule.id.is_empty() {
                return Err(RuleError::ParseError("规则 ID 不能为空".to_string()));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(RuleError::DuplicateRuleId(rule.id.clone()));
            }

            self.validate_condition(&rule.condition, &format!("{}.condition", rule.id), 1)?;
            self.validate_outcome(rule)?;
        }

        Ok(RuleSet::new(rules, default, bucketing_key))
    }

    fn build_rule(&self, index: usize, definition: RuleDefinition) -> Result<Rule> {
        let path = if definition.id.is_empty() {
            format!("rules[{}].condition", index)
        } else {
            format!("{}.condition", definition.id)
        };

        let condition = Self::build_condition(definition.condition, &path)?;
        let outcome = Self::build_outcome(&definition.id, definition.outcome)?;

        Ok(Rule {
            id: definition.id,
            condition,
            outcome,
            priority: definition.priority,
            terminal: definition.terminal,
            metadata: definition.metadata,
        })
    }

    fn build_condition(node: ConditionNode, path: &str) -> Result<Condition> {
        match node {
            ConditionNode::Always => Ok(Condition::Always),
            ConditionNode::Exists { attribute } => Ok(Condition::Exists(attribute)),
            ConditionNode::Comparison {
                attribute,
                operator,
                value,
            } => {
                let literal = Self::build_literal(operator, value, path)?;
                Ok(Condition::comparison(attribute, operator, literal))
            }
            ConditionNode::Logical { operator, children } => {
                let children = children
                    .into_iter()
                    .enumerate()
                    .map(|(i, child)| {
                        Self::build_condition(child, &format!("{}.children[{}]", path, i))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Condition::Logical { operator, children })
            }
        }
    }

    /// 按操作符要求的形态转换字面量
    fn build_literal(operator: Operator, value: Value, path: &str) -> Result<Literal> {
        let invalid = |expected: &str| {
            RuleError::ParseError(format!(
                "条件 '{}' 的 {} 操作符需要{}，实际为 {}",
                path,
                operator,
                expected,
                json_type(&value)
            ))
        };

        let literal = match operator.literal_shape() {
            LiteralShape::Scalar => Literal::Scalar(Self::scalar(&value).ok_or_else(|| invalid("标量值"))?),
            LiteralShape::Number => {
                let n = value.as_f64().ok_or_else(|| invalid("数值"))?;
                Literal::Scalar(Scalar::Number(n))
            }
            LiteralShape::String => {
                let s = value.as_str().ok_or_else(|| invalid("字符串"))?;
                Literal::Scalar(Scalar::String(s.to_string()))
            }
            LiteralShape::List => {
                let items = value.as_array().ok_or_else(|| invalid("数组"))?;
                let scalars = items
                    .iter()
                    .map(Self::scalar)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| invalid("标量数组"))?;
                Literal::List(scalars)
            }
            LiteralShape::Range => {
                let bounds = match value.as_array().map(Vec::as_slice) {
                    Some([min, max]) => min.as_f64().zip(max.as_f64()),
                    _ => None,
                };
                let (min, max) = bounds.ok_or_else(|| invalid(" [min, max] 数值数组"))?;
                if min > max {
                    return Err(RuleError::ParseError(format!(
                        "条件 '{}' 的 between 区间下限 {} 大于上限 {}",
                        path, min, max
                    )));
                }
                Literal::Range { min, max }
            }
            LiteralShape::Pattern => {
                let pattern = value.as_str().ok_or_else(|| invalid("正则表达式字符串"))?;
                let re = Regex::new(pattern).map_err(|e| {
                    RuleError::ParseError(format!("条件 '{}' 的正则表达式无效: {}", path, e))
                })?;
                Literal::Pattern(re)
            }
            LiteralShape::Version => {
                let s = value.as_str().ok_or_else(|| invalid("版本号字符串"))?;
                let version = Version::parse(s).ok_or_else(|| {
                    RuleError::ParseError(format!("条件 '{}' 的版本号无效: '{}'", path, s))
                })?;
                Literal::Version(version)
            }
            LiteralShape::Time => {
                let s = value.as_str().ok_or_else(|| invalid("日期时间字符串"))?;
                let time = parse_datetime(s).ok_or_else(|| {
                    RuleError::ParseError(format!("条件 '{}' 无法解析日期时间: '{}'", path, s))
                })?;
                Literal::Time(time)
            }
        };

        Ok(literal)
    }

    fn scalar(value: &Value) -> Option<Scalar> {
        match value {
            Value::String(s) => Some(Scalar::String(s.clone())),
            Value::Number(n) => n.as_f64().map(Scalar::Number),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            _ => None,
        }
    }

    fn build_outcome(rule_id: &str, value: Value) -> Result<Outcome> {
        let definition = OutcomeDefinition::from_value(value).map_err(|e| {
            RuleError::ParseError(format!("规则 '{}' 的结果定义无效: {}", rule_id, e))
        })?;

        let outcome = match definition {
            OutcomeDefinition::Fixed { value, variant } => Outcome::Fixed { value, variant },
            OutcomeDefinition::Weighted {
                variants,
                allocation,
                salt,
                bucket_by,
                fallback,
            } => {
                let invalid = |reason: String| RuleError::InvalidWeights {
                    rule_id: rule_id.to_string(),
                    reason,
                };

                let variants = variants
                    .into_iter()
                    .map(|v| {
                        let weight = u32::try_from(v.weight).map_err(|_| {
                            invalid(format!("变体 '{}' 的权重 {} 无效", v.label, v.weight))
                        })?;
                        Ok(Variant {
                            value: v.value.unwrap_or_else(|| Value::String(v.label.clone())),
                            label: v.label,
                            weight,
                            metadata: v.metadata,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                let allocation = match allocation {
                    Some(a) => u32::try_from(a)
                        .map_err(|_| invalid(format!("allocation {} 超出 0..=100", a)))?,
                    None => MAX_ALLOCATION,
                };

                Outcome::Weighted(WeightedOutcome {
                    variants,
                    allocation,
                    salt,
                    bucket_by,
                    fallback,
                })
            }
        };

        Ok(outcome)
    }

    /// 校验条件树结构
    fn validate_condition(&self, condition: &Condition, path: &str, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(RuleError::LimitExceeded {
                path: path.to_string(),
                limit: format!("最大深度 {}", self.max_depth),
            });
        }

        match condition {
            Condition::Always => {}
            Condition::Exists(attribute) => {
                if attribute.is_empty() {
                    return Err(RuleError::ParseError(format!("条件 '{}' 的属性名不能为空", path)));
                }
            }
            Condition::Comparison(cmp) => {
                if cmp.attribute.is_empty() {
                    return Err(RuleError::ParseError(format!("条件 '{}' 的属性名不能为空", path)));
                }
                if !Self::literal_fits(cmp.operator.literal_shape(), &cmp.literal) {
                    return Err(RuleError::ParseError(format!(
                        "条件 '{}' 的 {} 操作符不接受 {} 字面量",
                        path,
                        cmp.operator,
                        cmp.literal.shape_name()
                    )));
                }
            }
            Condition::Logical { operator, children } => {
                if children.is_empty() {
                    return Err(RuleError::ParseError(format!("逻辑组 '{}' 不能为空", path)));
                }
                if children.len() > self.max_children {
                    return Err(RuleError::LimitExceeded {
                        path: path.to_string(),
                        limit: format!("最多 {} 个子条件", self.max_children),
                    });
                }
                if *operator == LogicalOperator::Not && children.len() != 1 {
                    return Err(RuleError::ParseError(format!(
                        "逻辑组 '{}' 的 NOT 需要恰好一个子条件，实际为 {}",
                        path,
                        children.len()
                    )));
                }

                for (i, child) in children.iter().enumerate() {
                    let child_path = format!("{}.children[{}]", path, i);
                    self.validate_condition(child, &child_path, depth + 1)?;
                }
            }
        }

        Ok(())
    }

    fn literal_fits(shape: LiteralShape, literal: &Literal) -> bool {
        matches!(
            (shape, literal),
            (LiteralShape::Scalar, Literal::Scalar(_))
                | (LiteralShape::Number, Literal::Scalar(Scalar::Number(_)))
                | (LiteralShape::String, Literal::Scalar(Scalar::String(_)))
                | (LiteralShape::List, Literal::List(_))
                | (LiteralShape::Range, Literal::Range { .. })
                | (LiteralShape::Pattern, Literal::Pattern(_))
                | (LiteralShape::Version, Literal::Version(_))
                | (LiteralShape::Time, Literal::Time(_))
        )
    }

    /// 校验加权结果：变体非空、标签唯一、权重总和等于配置值
    fn validate_outcome(&self, rule: &Rule) -> Result<()> {
        let Outcome::Weighted(weighted) = &rule.outcome else {
            return Ok(());
        };

        let invalid = |reason: String| RuleError::InvalidWeights {
            rule_id: rule.id.clone(),
            reason,
        };

        if weighted.variants.is_empty() {
            return Err(invalid("至少需要一个变体".to_string()));
        }

        let mut labels = HashSet::new();
        for variant in &weighted.variants {
            if variant.label.is_empty() {
                return Err(invalid("变体标签不能为空".to_string()));
            }
            if !labels.insert(variant.label.as_str()) {
                return Err(invalid(format!("变体标签 '{}' 重复", variant.label)));
            }
        }

        let sum: u64 = weighted.variants.iter().map(|v| u64::from(v.weight)).sum();
        if sum != u64::from(self.weight_total) {
            return Err(invalid(format!(
                "权重总和为 {}，应为 {}",
                sum, self.weight_total
            )));
        }

        if weighted.allocation > MAX_ALLOCATION {
            return Err(invalid(format!(
                "allocation {} 超出 0..=100",
                weighted.allocation
            )));
        }

        if weighted.salt.as_deref() == Some("") {
            return Err(invalid("salt 不能为空".to_string()));
        }

        if weighted.bucket_by.as_deref() == Some("") {
            return Err(invalid("bucket_by 不能为空".to_string()));
        }

        Ok(())
    }
}
