//! 资格评估引擎错误类型
//!
//! 只覆盖加载期错误。评估期的异常（字段缺失、类型不匹配）不是错误，
//! 它们被记录在 `AggregateResult::warnings` 中。

use crate::compiler::Violation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("规则解析失败: {0}")]
    ParseError(String),

    #[error("规则集校验失败: {} 个错误{}", .violations.len(), first_message(.violations))]
    InvalidRuleSet { violations: Vec<Violation> },

    #[error("规则集未找到: payer={payer} procedure={procedure_code}")]
    RuleSetNotFound {
        payer: String,
        procedure_code: String,
    },

    #[error("事实记录无效: {0}")]
    InvalidFactRecord(String),

    #[error("文件读取失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

fn first_message(violations: &[Violation]) -> String {
    violations
        .first()
        .map(|v| format!("，首个: {}", v.message))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, EngineError>;
