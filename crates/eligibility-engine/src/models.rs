//! 资格评估领域模型

use crate::document::FieldSpec;
use crate::operators::{Logic, Operator};
use crate::value::Value;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// 条件：一个事实字段与目标值之间的比较
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub target: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, target: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            target: target.into(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.target)
    }
}

/// 规则类型
///
/// 排除与例外互斥，因此建模为枚举而不是两个独立的布尔标记。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    Standard,
    Exception { overrides: BTreeSet<String> },
    Exclusion,
}

impl RuleKind {
    pub fn is_standard(&self) -> bool {
        matches!(self, Self::Standard)
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Self::Exception { .. })
    }

    pub fn is_exclusion(&self) -> bool {
        matches!(self, Self::Exclusion)
    }

    pub fn category(&self) -> RuleCategory {
        match self {
            Self::Standard => RuleCategory::Standard,
            Self::Exception { .. } => RuleCategory::Exception,
            Self::Exclusion => RuleCategory::Exclusion,
        }
    }
}

/// 规则类别，不携带覆盖目标，用于评估结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Standard,
    Exception,
    Exclusion,
}

/// 规则定义
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub id: String,
    pub description: String,
    pub kind: RuleKind,
    pub logic: Logic,
    pub conditions: Vec<Condition>,
    /// 为 false 时表示内部检查（如数据质量），不计入得分分母
    pub scoreable: bool,
}

/// 规则集
///
/// 由编译器在校验通过后构建，之后不可变，可通过 `Arc` 在并发评估之间共享。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleSet {
    payer: String,
    procedure_code: String,
    registry_version: Option<String>,
    rules: Vec<Rule>,
    schema: BTreeMap<String, FieldSpec>,
}

impl RuleSet {
    pub(crate) fn new(
        payer: String,
        procedure_code: String,
        registry_version: Option<String>,
        rules: Vec<Rule>,
        schema: BTreeMap<String, FieldSpec>,
    ) -> Self {
        Self {
            payer,
            procedure_code,
            registry_version,
            rules,
            schema,
        }
    }

    pub fn payer(&self) -> &str {
        &self.payer
    }

    pub fn procedure_code(&self) -> &str {
        &self.procedure_code
    }

    pub fn registry_version(&self) -> Option<&str> {
        self.registry_version.as_deref()
    }

    /// 按声明顺序返回全部规则
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// 声明的字段 schema
    pub fn schema(&self) -> &BTreeMap<String, FieldSpec> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 规则中使用的所有字段路径
    pub fn required_fields(&self) -> BTreeSet<&str> {
        self.rules
            .iter()
            .flat_map(|r| r.conditions.iter().map(|c| c.field.as_str()))
            .collect()
    }
}

/// 单个条件的评估明细
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionDetail {
    pub condition: Condition,
    pub resolved_value: Value,
    pub met: bool,
}

/// 单条规则的评估结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub rule_id: String,
    pub description: String,
    pub kind: RuleCategory,
    pub met: bool,
    pub logic: Logic,
    /// 原始条件明细；即使被例外豁免，也保留实际记录的情况
    pub condition_details: Vec<ConditionDetail>,
    pub overridden_by_exception: bool,
}

impl EvaluationResult {
    /// 满足的条件数
    pub fn met_count(&self) -> usize {
        self.condition_details.iter().filter(|d| d.met).count()
    }
}

/// 整个规则集的评估结果
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct AggregateResult {
    pub results: Vec<EvaluationResult>,
    pub all_criteria_met: bool,
    pub total_scoreable: usize,
    pub rules_met: usize,
    pub rules_failed: usize,
    pub excluded: bool,
    pub exclusion_reason: Option<String>,
    pub exceptions_applied: Vec<String>,
    pub warnings: Vec<String>,
}

impl AggregateResult {
    pub fn result(&self, rule_id: &str) -> Option<&EvaluationResult> {
        self.results.iter().find(|r| r.rule_id == rule_id)
    }

    /// 未满足的标准规则描述（缺口列表）
    pub fn gaps(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.met && r.kind == RuleCategory::Standard)
            .map(|r| r.description.as_str())
            .collect()
    }
}
