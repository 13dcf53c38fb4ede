//! 定向规则评估引擎
//!
//! 输入 JSON 规则集与用户属性，输出 JSON 决策：
//! - 规则文档解析与校验
//! - 三值逻辑条件匹配（短路求值）
//! - 首条命中 / 优先级覆盖的冲突消解
//! - 基于 MurmurHash3 的稳定分桶与加权变体选择
//! - 带依赖的多规则集评估
//!
//! 对外入口为 [`evaluate`] 与 [`evaluate_all`]，任何错误都编码为错误响应而不会向调用方传播。

pub mod bundle;
pub mod config;
pub mod context;
pub mod decision;
pub mod document;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod hash;
pub mod models;
pub mod operators;
pub mod outcome;
pub mod parser;
pub mod resolver;
pub mod version;

pub use bundle::{KeyedRuleSet, RuleSetBundle};
pub use config::EngineConfig;
pub use context::{AttrValue, AttributeMap};
pub use decision::{
    BucketAssignment, BundleResponse, Decision, ErrorPayload, EvaluationResponse, TraceAction,
    TraceEntry, parse_bundle_response, parse_response,
};
pub use engine::{Engine, evaluate, evaluate_all};
pub use error::{Result, RuleError};
pub use evaluator::{ConditionEvaluator, MatchResult};
pub use models::{Condition, Literal, Outcome, Rule, RuleSet, Scalar, Variant, WeightedOutcome};
pub use operators::{LogicalOperator, Operator};
pub use outcome::OutcomeComputer;
pub use parser::RuleSetParser;
pub use resolver::{Resolution, RuleResolver};
