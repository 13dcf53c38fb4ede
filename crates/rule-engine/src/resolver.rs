//! 规则解析器（冲突消解）
//!
//! 按声明顺序扫描规则集，选出生效的规则：
//! - 第一条结果为 `True` 的规则被选中，终止规则命中后立即停止扫描
//! - 非终止规则命中后继续扫描，之后命中的规则仅在优先级严格更高时覆盖当前选择
//! - 优先级相同时先声明者胜出

use crate::context::AttributeMap;
use crate::decision::{TraceAction, TraceEntry};
use crate::error::Result;
use crate::evaluator::{ConditionEvaluator, MatchResult};
use crate::models::{Rule, RuleSet};
use tracing::debug;

/// 解析结果
#[derive(Debug)]
pub struct Resolution<'a> {
    /// 选中的规则，无命中时为 `None`
    pub rule: Option<&'a Rule>,
    pub trace: Vec<TraceEntry>,
}

/// 规则解析器
#[derive(Debug, Clone, Default)]
pub struct RuleResolver {
    evaluator: ConditionEvaluator,
    /// 是否记录评估追踪
    trace_enabled: bool,
}

impl RuleResolver {
    pub fn new(evaluator: ConditionEvaluator) -> Self {
        Self {
            evaluator,
            trace_enabled: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 解析生效规则
    pub fn resolve<'a>(&self, rule_set: &'a RuleSet, attrs: &AttributeMap) -> Result<Resolution<'a>> {
        let mut trace: Vec<TraceEntry> = Vec::new();
        // 当前选中的规则及其在 trace 中的位置
        let mut selected: Option<(&'a Rule, usize)> = None;

        for rule in rule_set.rules() {
            let result = self.evaluator.evaluate(&rule.condition, attrs)?;

            let action = if !result.is_true() {
                TraceAction::Skipped
            } else {
                match selected {
                    Some((current, _)) if rule.priority <= current.priority => {
                        TraceAction::KeptEarlier
                    }
                    previous => {
                        if let Some((current, index)) = previous {
                            debug!(
                                rule_id = %rule.id,
                                overridden = %current.id,
                                priority = rule.priority,
                                "高优先级规则覆盖先前选择"
                            );
                            if let Some(entry) = trace.get_mut(index) {
                                entry.action = TraceAction::Overridden;
                            }
                        }
                        selected = Some((rule, trace.len()));
                        TraceAction::Selected
                    }
                }
            };

            debug!(rule_id = %rule.id, result = %result, action = ?action, "规则评估");

            if self.trace_enabled {
                trace.push(TraceEntry {
                    rule_id: rule.id.clone(),
                    result,
                    action,
                });
            }

            if result == MatchResult::True && rule.terminal {
                break;
            }
        }

        Ok(Resolution {
            rule: selected.map(|(rule, _)| rule),
            trace,
        })
    }
}
