//! 资格规则评估引擎
//!
//! 针对结构化的患者事实记录评估付款方的事前授权规则集，支持：
//! - 策略文档的加载期校验与编译
//! - 排除规则短路、例外豁免与计分
//! - 规则集缓存与并发批量评估
//! - 提示性检查与结论分档

pub mod advisory;
pub mod banding;
pub mod compiler;
pub mod document;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod models;
pub mod operators;
pub mod resolver;
pub mod store;
pub mod value;

pub use advisory::{AdvisoryCheck, RepeatImagingCheck};
pub use banding::{ThresholdBanding, Verdict, VerdictPolicy, readiness_score};
pub use compiler::{Check, RuleSetCompiler, Severity, ValidationReport, Violation};
pub use document::{FieldRegistry, FieldSpec, FieldType, PolicyDocument};
pub use error::{EngineError, Result};
pub use evaluator::{ConditionEvaluator, ConditionOutcome, TypeMismatch};
pub use executor::{RuleExecutor, evaluate};
pub use models::{
    AggregateResult, Condition, EvaluationResult, Rule, RuleCategory, RuleKind, RuleSet,
};
pub use operators::{Logic, Operator};
pub use resolver::{FactRecord, resolve};
pub use store::{RuleSetRepository, RuleSetStats};
pub use value::Value;
