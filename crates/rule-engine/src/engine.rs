//! 评估入口
//!
//! 串联解析、匹配、冲突消解与结果计算。引擎本身不持有可变状态，
//! 可在线程间共享引用并发调用。

use crate::bundle::{RuleSetBundle, expose_decision};
use crate::config::EngineConfig;
use crate::context::AttributeMap;
use crate::decision::{BundleResponse, Decision, EvaluationResponse};
use crate::error::Result;
use crate::evaluator::ConditionEvaluator;
use crate::models::RuleSet;
use crate::outcome::OutcomeComputer;
use crate::parser::RuleSetParser;
use crate::resolver::RuleResolver;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, instrument, warn};

static DEFAULT_ENGINE: LazyLock<Engine> = LazyLock::new(Engine::default);

/// 规则评估引擎
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    parser: RuleSetParser,
    resolver: RuleResolver,
    outcome: OutcomeComputer,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let resolver = RuleResolver::new(ConditionEvaluator::new(config.max_depth));
        let resolver = if config.trace_enabled {
            resolver.with_trace()
        } else {
            resolver
        };

        Self {
            parser: RuleSetParser::from_config(&config),
            outcome: OutcomeComputer::new(config.weight_total, config.bucketing_key.clone()),
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn parser(&self) -> &RuleSetParser {
        &self.parser
    }

    /// 评估并返回 JSON 响应，任何错误都编码为错误响应
    pub fn evaluate(&self, rules: &str, user: &str) -> String {
        self.respond(rules, user).to_json()
    }

    /// 评估并返回响应结构
    pub fn respond(&self, rules: &str, user: &str) -> EvaluationResponse {
        let result = self.decide(rules, user);
        if let Err(e) = &result {
            warn!(code = e.code(), error = %e, "评估失败，返回错误响应");
        }
        EvaluationResponse::from_result(result)
    }

    /// 解析输入并评估
    #[instrument(skip_all, fields(rules_bytes = rules.len(), user_bytes = user.len()))]
    pub fn decide(&self, rules: &str, user: &str) -> Result<Decision> {
        let rule_set = self.parser.parse(rules)?;
        let attrs = AttributeMap::parse(user, self.config.max_depth)?;
        self.decide_parsed(&rule_set, &attrs)
    }

    /// 对已解析的规则集与属性表评估
    pub fn decide_parsed(&self, rule_set: &RuleSet, attrs: &AttributeMap) -> Result<Decision> {
        let resolution = self.resolver.resolve(rule_set, attrs)?;

        let mut decision = match resolution.rule {
            Some(rule) => self.outcome.compute(rule, rule_set, attrs)?,
            None => Decision::no_match(rule_set.default_value().clone()),
        };
        decision.trace = resolution.trace;

        debug!(
            matched = decision.is_match(),
            rule_id = decision.rule_id.as_deref().unwrap_or("-"),
            variant = decision.variant.as_deref().unwrap_or("-"),
            "评估完成"
        );

        Ok(decision)
    }

    /// 评估多规则集文档并返回 JSON 响应
    pub fn evaluate_all(&self, bundle: &str, user: &str) -> String {
        self.respond_all(bundle, user).to_json()
    }

    pub fn respond_all(&self, bundle: &str, user: &str) -> BundleResponse {
        let result = self.decide_all(bundle, user);
        if let Err(e) = &result {
            warn!(code = e.code(), error = %e, "多规则集评估失败，返回错误响应");
        }
        BundleResponse::from_result(result)
    }

    /// 解析多规则集文档并按依赖顺序评估
    #[instrument(skip_all, fields(bundle_bytes = bundle.len(), user_bytes = user.len()))]
    pub fn decide_all(&self, bundle: &str, user: &str) -> Result<BTreeMap<String, Decision>> {
        let bundle = self.parser.parse_bundle(bundle)?;
        let attrs = AttributeMap::parse(user, self.config.max_depth)?;
        self.decide_bundle(&bundle, &attrs)
    }

    /// 依次评估规则集，已得出的决策写入属性表供后续规则集读取
    pub fn decide_bundle(
        &self,
        bundle: &RuleSetBundle,
        attrs: &AttributeMap,
    ) -> Result<BTreeMap<String, Decision>> {
        let mut attrs = attrs.clone();
        let mut decisions = BTreeMap::new();

        for entry in bundle.entries() {
            let decision = self.decide_parsed(&entry.rule_set, &attrs)?;
            debug!(key = %entry.key, matched = decision.is_match(), "规则集评估完成");
            expose_decision(&mut attrs, &entry.key, &decision);
            decisions.insert(entry.key.clone(), decision);
        }

        Ok(decisions)
    }
}

/// 使用默认配置评估
///
/// ```
/// let result = rule_engine::evaluate(
///     r#"[{"id": "r1", "condition": {"type": "comparison", "attribute": "country", "operator": "eq", "value": "US"}, "outcome": "on"}]"#,
///     r#"{"country": "US"}"#,
/// );
/// assert!(result.contains(r#""rule_id":"r1""#));
/// ```
pub fn evaluate(rules: &str, user: &str) -> String {
    DEFAULT_ENGINE.evaluate(rules, user)
}

/// 使用默认配置评估多规则集文档
///
/// ```
/// let result = rule_engine::evaluate_all(
///     r#"[
///         {"key": "gate", "rules": [{"id": "on", "outcome": "on"}]},
///         {"key": "child", "depends_on": ["gate"], "rules": [
///             {"id": "r1", "condition": {"type": "comparison", "attribute": "result.gate.value", "operator": "eq", "value": "on"}, "outcome": "v2"}
///         ]}
///     ]"#,
///     r#"{}"#,
/// );
/// assert!(result.contains(r#""child":{"rule_id":"r1""#));
/// ```
pub fn evaluate_all(bundle: &str, user: &str) -> String {
    DEFAULT_ENGINE.evaluate_all(bundle, user)
}
