//! 规则引擎性能基准测试
//!
//! 测试覆盖：
//! - 单条规则端到端评估
//! - 规则集规模增长下的评估曲线（命中位于末尾）
//! - 嵌套条件树
//! - 已解析规则集上的重复评估

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rule_engine::{AttributeMap, Engine, evaluate};
use serde_json::{Value, json};
use std::hint::black_box;

fn comparison(attribute: &str, operator: &str, value: Value) -> Value {
    json!({"type": "comparison", "attribute": attribute, "operator": operator, "value": value})
}

/// 前 n-1 条规则不命中，最后一条为加权分配
fn create_rule_set(count: usize) -> String {
    let mut rules: Vec<Value> = (0..count.saturating_sub(1))
        .map(|i| {
            json!({
                "id": format!("segment_{}", i),
                "condition": {
                    "type": "logical",
                    "operator": "AND",
                    "children": [
                        comparison("country", "eq", json!(format!("C{}", i))),
                        comparison("age", "gte", json!(18))
                    ]
                },
                "outcome": format!("value_{}", i)
            })
        })
        .collect();

    rules.push(json!({
        "id": "rollout",
        "outcome": {
            "type": "weighted",
            "variants": [
                {"label": "control", "weight": 50},
                {"label": "treatment", "weight": 50}
            ]
        }
    }));

    json!({"rules": rules, "default": "off"}).to_string()
}

/// 交替 AND / OR 的嵌套条件
fn create_nested_rule(depth: usize, breadth: usize) -> String {
    fn build(depth: usize, breadth: usize, level: usize) -> Value {
        if depth == 0 {
            return comparison(&format!("field_{}", level), "eq", json!(format!("value_{}", level)));
        }

        let operator = if depth % 2 == 0 { "AND" } else { "OR" };
        let children: Vec<Value> = (0..breadth).map(|i| build(depth - 1, breadth, i)).collect();
        json!({"type": "logical", "operator": operator, "children": children})
    }

    json!([{"id": "nested", "condition": build(depth, breadth, 0), "outcome": true}]).to_string()
}

fn user() -> String {
    json!({
        "user_id": "user-42",
        "country": "US",
        "age": 33,
        "tags": ["beta", "vip"],
        "app": {"version": "2.10.3", "platform": "ios"}
    })
    .to_string()
}

fn bench_simple_rule(c: &mut Criterion) {
    let rules = json!([{
        "id": "r1",
        "condition": comparison("country", "eq", json!("US")),
        "outcome": "on"
    }])
    .to_string();
    let user = user();

    c.bench_function("simple_rule", |b| {
        b.iter(|| evaluate(black_box(&rules), black_box(&user)))
    });
}

fn bench_rule_set_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_set_scaling");
    let user = user();

    for count in [1, 10, 100, 500] {
        let rules = create_rule_set(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &rules, |b, rules| {
            b.iter(|| evaluate(black_box(rules), black_box(&user)))
        });
    }

    group.finish();
}

fn bench_nested_rules(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_rules");
    let user = user();

    for (depth, breadth) in [(2, 3), (3, 3), (4, 2), (5, 2)] {
        let rules = create_nested_rule(depth, breadth);
        group.bench_with_input(
            BenchmarkId::new("depth_breadth", format!("{}x{}", depth, breadth)),
            &rules,
            |b, rules| b.iter(|| evaluate(black_box(rules), black_box(&user))),
        );
    }

    group.finish();
}

fn bench_preparsed(c: &mut Criterion) {
    let engine = Engine::default();
    let rule_set = engine.parser().parse(&create_rule_set(100)).unwrap();
    let attrs = AttributeMap::from_json(&user()).unwrap();

    c.bench_function("preparsed_100_rules", |b| {
        b.iter(|| engine.decide_parsed(black_box(&rule_set), black_box(&attrs)))
    });
}

criterion_group!(
    benches,
    bench_simple_rule,
    bench_rule_set_scaling,
    bench_nested_rules,
    bench_preparsed,
);

criterion_main!(benches);
