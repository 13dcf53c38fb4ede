//! 多规则集
//!
//! 一次调用评估多个带键的规则集。规则集可通过 `depends_on` 声明前置规则集，
//! 评估按依赖拓扑序进行，存在环时拒绝解析。先评估的决策以属性形式暴露给之后的规则集：
//!
//! ```text
//! result.{key}.rule_id
//! result.{key}.variant
//! result.{key}.value
//! ```

use crate::context::{AttrValue, AttributeMap};
use crate::decision::Decision;
use crate::error::{Result, RuleError};
use crate::models::RuleSet;
use std::collections::{HashMap, HashSet};

/// 决策属性前缀
pub const RESULT_PREFIX: &str = "result";

/// 带键的规则集
#[derive(Debug, Clone)]
pub struct KeyedRuleSet {
    pub key: String,
    pub depends_on: Vec<String>,
    pub rule_set: RuleSet,
}

/// 已排序的规则集组
///
/// 只能通过 [`crate::parser::RuleSetParser::parse_bundle`] 构建。
#[derive(Debug, Clone)]
pub struct RuleSetBundle {
    /// 按评估顺序排列
    entries: Vec<KeyedRuleSet>,
}

impl RuleSetBundle {
    /// 校验键并按依赖排序
    pub(crate) fn new(entries: Vec<KeyedRuleSet>) -> Result<Self> {
        Ok(Self {
            entries: topological_order(entries)?,
        })
    }

    pub fn entries(&self) -> &[KeyedRuleSet] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 依赖优先的深度遍历；互不依赖的规则集保持声明顺序
fn topological_order(entries: Vec<KeyedRuleSet>) -> Result<Vec<KeyedRuleSet>> {
    let order = {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if entry.key.is_empty() {
                return Err(RuleError::ParseError(format!("第 {} 个规则集的 key 为空", i)));
            }
            if index.insert(entry.key.as_str(), i).is_some() {
                return Err(RuleError::ParseError(format!("规则集 key '{}' 重复", entry.key)));
            }
        }

        for entry in &entries {
            if let Some(missing) = entry.depends_on.iter().find(|d| !index.contains_key(d.as_str())) {
                return Err(RuleError::ParseError(format!(
                    "规则集 '{}' 依赖不存在的规则集 '{}'",
                    entry.key, missing
                )));
            }
        }

        let mut sorter = Sorter {
            entries: &entries,
            index: &index,
            done: HashSet::new(),
            path: Vec::new(),
            order: Vec::with_capacity(entries.len()),
        };
        for i in 0..entries.len() {
            sorter.visit(i)?;
        }
        sorter.order
    };

    let mut slots: Vec<Option<KeyedRuleSet>> = entries.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

struct Sorter<'a> {
    entries: &'a [KeyedRuleSet],
    index: &'a HashMap<&'a str, usize>,
    done: HashSet<usize>,
    /// 当前遍历路径，用于检测环
    path: Vec<usize>,
    order: Vec<usize>,
}

impl Sorter<'_> {
    fn visit(&mut self, i: usize) -> Result<()> {
        if self.done.contains(&i) {
            return Ok(());
        }
        if let Some(start) = self.path.iter().position(|&p| p == i) {
            let mut cycle: Vec<&str> = self.path[start..]
                .iter()
                .map(|&p| self.entries[p].key.as_str())
                .collect();
            cycle.push(self.entries[i].key.as_str());
            return Err(RuleError::ParseError(format!(
                "规则集依赖存在环: {}",
                cycle.join(" -> ")
            )));
        }

        let (entries, index) = (self.entries, self.index);
        self.path.push(i);
        for dependency in &entries[i].depends_on {
            if let Some(&parent) = index.get(dependency.as_str()) {
                self.visit(parent)?;
            }
        }
        self.path.pop();

        self.done.insert(i);
        self.order.push(i);
        Ok(())
    }
}

/// 将决策写入属性表，供之后的规则集读取，覆盖同名属性
pub(crate) fn expose_decision(attrs: &mut AttributeMap, key: &str, decision: &Decision) {
    let name = |field: &str| format!("{}.{}.{}", RESULT_PREFIX, key, field);

    if let Some(rule_id) = &decision.rule_id {
        attrs.set(name("rule_id"), AttrValue::String(rule_id.clone()));
    }
    if let Some(variant) = &decision.variant {
        attrs.set(name("variant"), AttrValue::String(variant.clone()));
    }
    if let Some(value) = AttrValue::from_json(&decision.value) {
        attrs.set(name("value"), value);
    }
}
