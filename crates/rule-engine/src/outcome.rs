//! 结果计算
//!
//! 固定结果直接返回；加权结果按稳定标识分桶：
//!
//! ```text
//! key    = "{salt}/{identifier}"
//! hash   = murmur3_x86_32(key, seed = 0)
//! slot   = hash % 100            // 流量分配
//! bucket = (hash / 100) % 10000  // 变体选择
//! ```
//!
//! 变体 i 覆盖 `[C(i-1) * 10000 / T, C(i) * 10000 / T)`，C 为累计权重，T 为权重总和。

use crate::context::{AttrValue, AttributeMap};
use crate::decision::{BucketAssignment, Decision};
use crate::error::{Result, RuleError};
use crate::hash::murmur3_x86_32;
use crate::models::{Outcome, Rule, RuleSet, Variant, WeightedOutcome};
use serde_json::{Map, Value};
use tracing::debug;

/// 流量分配槽位数
pub const ALLOCATION_SLOTS: u32 = 100;
/// 变体分桶范围
pub const BUCKET_RANGE: u32 = 10_000;

const HASH_SEED: u32 = 0;

/// 结果计算器
#[derive(Debug, Clone)]
pub struct OutcomeComputer {
    weight_total: u32,
    /// 默认分桶属性
    bucketing_key: String,
}

impl OutcomeComputer {
    pub fn new(weight_total: u32, bucketing_key: impl Into<String>) -> Self {
        Self {
            weight_total,
            bucketing_key: bucketing_key.into(),
        }
    }

    /// 计算命中规则的决策
    pub fn compute(&self, rule: &Rule, rule_set: &RuleSet, attrs: &AttributeMap) -> Result<Decision> {
        let mut decision = Decision::no_match(Value::Null);
        decision.rule_id = Some(rule.id.clone());
        decision.metadata = rule.metadata.clone();

        match &rule.outcome {
            Outcome::Fixed { value, variant } => {
                decision.value = value.clone();
                decision.variant = variant.clone();
            }
            Outcome::Weighted(weighted) => {
                self.compute_weighted(rule, weighted, rule_set, attrs, &mut decision)?;
            }
        }

        Ok(decision)
    }

    fn compute_weighted(
        &self,
        rule: &Rule,
        weighted: &WeightedOutcome,
        rule_set: &RuleSet,
        attrs: &AttributeMap,
        decision: &mut Decision,
    ) -> Result<()> {
        let bucket_by = weighted
            .bucket_by
            .as_deref()
            .or(rule_set.bucketing_key())
            .unwrap_or(&self.bucketing_key);

        let Some(identifier) = attrs.get(bucket_by).and_then(Self::identifier) else {
            debug!(rule_id = %rule.id, bucket_by, "分桶标识缺失，使用回退值");
            decision.value = weighted.fallback.clone();
            return Ok(());
        };

        let salt = weighted.salt.as_deref().unwrap_or(&rule.id);
        let hash = murmur3_x86_32(format!("{}/{}", salt, identifier).as_bytes(), HASH_SEED)?;
        let slot = hash % ALLOCATION_SLOTS;
        let bucket = (hash / ALLOCATION_SLOTS) % BUCKET_RANGE;
        let allocated = slot < weighted.allocation;

        decision.bucket = Some(BucketAssignment {
            identifier,
            salt: salt.to_string(),
            slot,
            bucket,
            allocated,
        });

        if !allocated {
            debug!(rule_id = %rule.id, slot, allocation = weighted.allocation, "未进入分配流量");
            decision.value = weighted.fallback.clone();
            return Ok(());
        }

        let variant = self.select_variant(&weighted.variants, bucket)?;
        debug!(rule_id = %rule.id, bucket, variant = %variant.label, "分桶选中变体");

        decision.variant = Some(variant.label.clone());
        decision.value = variant.value.clone();
        merge_metadata(&mut decision.metadata, &variant.metadata);
        Ok(())
    }

    /// 选择累计权重区间包含 bucket 的变体
    pub fn select_variant<'a>(&self, variants: &'a [Variant], bucket: u32) -> Result<&'a Variant> {
        if self.weight_total == 0 {
            return Err(RuleError::MatchError("权重总和为 0".to_string()));
        }

        let total = u64::from(self.weight_total);
        let mut cumulative: u64 = 0;
        for variant in variants {
            cumulative += u64::from(variant.weight);
            let upper = cumulative * u64::from(BUCKET_RANGE) / total;
            if u64::from(bucket) < upper {
                return Ok(variant);
            }
        }

        Err(RuleError::MatchError(format!(
            "分桶 {} 未落入任何变体区间",
            bucket
        )))
    }

    /// 分桶标识：非空字符串，或整数值的数字（不带小数部分）
    fn identifier(value: &AttrValue) -> Option<String> {
        match value {
            AttrValue::String(s) if !s.is_empty() => Some(s.clone()),
            AttrValue::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(format!("{}", n)),
            _ => None,
        }
    }
}

/// 后写入的键覆盖先前的值
fn merge_metadata(target: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        target.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Condition;
    use crate::parser::RuleSetParser;
    use serde_json::json;

    fn computer() -> OutcomeComputer {
        OutcomeComputer::new(100, "user_id")
    }

    fn weighted_rule(id: &str, outcome: WeightedOutcome) -> Rule {
        Rule::new(id, Condition::Always, Outcome::Weighted(outcome))
    }

    fn ab() -> WeightedOutcome {
        WeightedOutcome::new(vec![Variant::new("A", 50), Variant::new("B", 50)])
    }

    fn single(rule: Rule) -> RuleSet {
        RuleSetParser::default()
            .assemble(vec![rule], Value::Null, None)
            .unwrap()
    }

    fn user(id: &str) -> AttributeMap {
        AttributeMap::new().with("user_id", id)
    }

    #[test]
    fn test_fixed_outcome() {
        let rule = Rule::new("r1", Condition::Always, Outcome::fixed("on")).with_metadata("owner", "growth");
        let rule_set = single(rule.clone());

        let decision = computer().compute(&rule, &rule_set, &AttributeMap::new()).unwrap();
        assert_eq!(decision.rule_id.as_deref(), Some("r1"));
        assert_eq!(decision.value, json!("on"));
        assert!(decision.variant.is_none());
        assert!(decision.bucket.is_none());
        assert_eq!(decision.metadata["owner"], json!("growth"));
    }

    #[test]
    fn test_known_buckets() {
        let rule = weighted_rule("r1", ab());
        let rule_set = single(rule.clone());

        let decision = computer().compute(&rule, &rule_set, &user("user-42")).unwrap();
        let bucket = decision.bucket.unwrap();
        assert_eq!(bucket.slot, 79);
        assert_eq!(bucket.bucket, 6191);
        assert_eq!(decision.variant.as_deref(), Some("B"));

        let decision = computer().compute(&rule, &rule_set, &user("user-43")).unwrap();
        assert_eq!(decision.bucket.as_ref().unwrap().bucket, 4106);
        assert_eq!(decision.variant.as_deref(), Some("A"));
    }

    #[test]
    fn test_salt_overrides_rule_id() {
        let rule = weighted_rule("r1", ab().with_salt("exp"));
        let rule_set = single(rule.clone());

        let decision = computer().compute(&rule, &rule_set, &user("user-42")).unwrap();
        let bucket = decision.bucket.unwrap();
        assert_eq!(bucket.salt, "exp");
        assert_eq!(bucket.slot, 7);
        assert_eq!(bucket.bucket, 5967);
        assert_eq!(decision.variant.as_deref(), Some("B"));
    }

    #[test]
    fn test_allocation_gate() {
        let mut outcome = ab().with_allocation(50);
        outcome.fallback = json!("holdout");
        let rule = weighted_rule("r1", outcome);
        let rule_set = single(rule.clone());

        // slot 79 不在前 50% 流量内
        let decision = computer().compute(&rule, &rule_set, &user("user-42")).unwrap();
        assert_eq!(decision.value, json!("holdout"));
        assert!(decision.variant.is_none());
        assert!(!decision.bucket.unwrap().allocated);

        // slot 35
        let decision = computer().compute(&rule, &rule_set, &user("user-43")).unwrap();
        assert_eq!(decision.variant.as_deref(), Some("A"));
    }

    #[test]
    fn test_missing_identifier_falls_back() {
        let rule = weighted_rule("r1", ab());
        let rule_set = single(rule.clone());

        for attrs in [
            AttributeMap::new(),
            AttributeMap::new().with("user_id", ""),
            AttributeMap::new().with("user_id", 4.5),
            AttributeMap::new().with("user_id", true),
        ] {
            let decision = computer().compute(&rule, &rule_set, &attrs).unwrap();
            assert_eq!(decision.rule_id.as_deref(), Some("r1"));
            assert_eq!(decision.value, Value::Null);
            assert!(decision.bucket.is_none());
        }
    }

    #[test]
    fn test_integral_number_identifier() {
        let rule = weighted_rule("r1", ab());
        let rule_set = single(rule.clone());

        let numeric = computer()
            .compute(&rule, &rule_set, &AttributeMap::new().with("user_id", 42i64))
            .unwrap();
        let textual = computer().compute(&rule, &rule_set, &user("42")).unwrap();

        assert_eq!(numeric.bucket.as_ref().unwrap().identifier, "42");
        assert_eq!(numeric.bucket, textual.bucket);
        assert_eq!(numeric.variant, textual.variant);
    }

    #[test]
    fn test_bucket_by_resolution() {
        let rule = weighted_rule("r1", ab().with_bucket_by("device_id"));
        let rule_set = single(rule.clone());
        let attrs = AttributeMap::new().with("user_id", "user-43").with("device_id", "user-42");

        let decision = computer().compute(&rule, &rule_set, &attrs).unwrap();
        assert_eq!(decision.bucket.unwrap().identifier, "user-42");

        let rule = weighted_rule("r1", ab());
        let rule_set = RuleSetParser::default()
            .assemble(vec![rule.clone()], Value::Null, Some("device_id".to_string()))
            .unwrap();
        let decision = computer().compute(&rule, &rule_set, &attrs).unwrap();
        assert_eq!(decision.bucket.unwrap().identifier, "user-42");
    }

    #[test]
    fn test_variant_metadata_overlays_rule() {
        let mut treatment = Variant::new("B", 50);
        treatment.metadata.insert("owner".to_string(), json!("exp-team"));
        treatment.metadata.insert("color".to_string(), json!("blue"));
        let outcome = WeightedOutcome::new(vec![Variant::new("A", 50), treatment]);
        let rule = weighted_rule("r1", outcome).with_metadata("owner", "growth");
        let rule_set = single(rule.clone());

        let decision = computer().compute(&rule, &rule_set, &user("user-42")).unwrap();
        assert_eq!(decision.metadata["owner"], json!("exp-team"));
        assert_eq!(decision.metadata["color"], json!("blue"));
    }

    #[test]
    fn test_select_variant_boundaries() {
        let variants = vec![Variant::new("A", 25), Variant::new("B", 0), Variant::new("C", 75)];
        let computer = computer();

        assert_eq!(computer.select_variant(&variants, 0).unwrap().label, "A");
        assert_eq!(computer.select_variant(&variants, 2499).unwrap().label, "A");
        assert_eq!(computer.select_variant(&variants, 2500).unwrap().label, "C");
        assert_eq!(computer.select_variant(&variants, 9999).unwrap().label, "C");
        assert!(computer.select_variant(&variants, 10_000).is_err());
    }
}
