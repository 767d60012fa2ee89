//! 规则集编译器与校验器
//!
//! 策略文档来自基于 LLM 的外部编译器，不能直接信任。编译器在加载时一次性检查所有结构不变量，
//! 收集全部违规项而不是遇到第一个就返回；存在任何错误级别的违规时不产出 `RuleSet`。

use crate::document::{FieldRegistry, FieldSpec, FieldType, PolicyDocument, RuleDefinition};
use crate::error::{EngineError, Result};
use crate::models::{Condition, Rule, RuleKind, RuleSet};
use crate::operators::{Logic, LogicKind, Operator};
use crate::resolver::PATH_SEPARATOR;
use crate::value::Value;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// 违规级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// 阻止规则集被使用
    Error,
    /// 仅提示，不阻止加载
    Warning,
}

/// 校验项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    EmptyRuleId,
    DuplicateRuleId,
    EmptyConditions,
    UnknownLogic,
    MissingThreshold,
    ThresholdOutOfRange,
    UnexpectedThreshold,
    UnknownOperator,
    InvalidTarget,
    UndeclaredField,
    FieldNotInRegistry,
    AmbiguousKind,
    MissingOverrides,
    DanglingOverride,
    OverrideNotStandard,
    OverridesOnNonException,
    OrphanSchemaField,
    RegistryVersionMismatch,
    OperatorFieldType,
}

/// 单条违规
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub severity: Severity,
    pub check: Check,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let check = serde_json::to_value(self.check)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        write!(f, "[{}] {}", check, self.message)
    }
}

/// 校验报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<Violation>,
    pub warnings: Vec<Violation>,
}

impl ValidationReport {
    /// 没有错误级别的违规即视为有效
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_check(&self, check: Check) -> bool {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .any(|v| v.check == check)
    }

    fn error(&mut self, check: Check, rule_id: Option<&str>, field: Option<&str>, message: String) {
        self.errors.push(Violation {
            severity: Severity::Error,
            check,
            rule_id: rule_id.map(str::to_string),
            field: field.map(str::to_string),
            message,
        });
    }

    fn warning(&mut self, check: Check, rule_id: Option<&str>, field: Option<&str>, message: String) {
        self.warnings.push(Violation {
            severity: Severity::Warning,
            check,
            rule_id: rule_id.map(str::to_string),
            field: field.map(str::to_string),
            message,
        });
    }
}

/// 规则集编译器
#[derive(Debug, Clone, Default)]
pub struct RuleSetCompiler {
    registry: Option<FieldRegistry>,
}

impl RuleSetCompiler {
    pub fn new() -> Self {
        Self { registry: None }
    }

    /// 附加领域字段注册表，字段引用还需在注册表中存在
    pub fn with_registry(mut self, registry: FieldRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 只校验，不产出规则集
    pub fn validate(&self, doc: &PolicyDocument) -> ValidationReport {
        self.check(doc).1
    }

    /// 从 JSON 字符串编译规则集
    pub fn compile_from_json(&self, json: &str) -> Result<RuleSet> {
        let doc = PolicyDocument::from_json(json)
            .map_err(|e| EngineError::ParseError(format!("策略文档格式错误: {}", e)))?;
        self.compile(&doc)
    }

    /// 编译规则集
    ///
    /// 存在错误级别违规时返回 `EngineError::InvalidRuleSet`。
    pub fn compile(&self, doc: &PolicyDocument) -> Result<RuleSet> {
        let (rules, report) = self.check(doc);

        if !report.is_valid() {
            return Err(EngineError::InvalidRuleSet {
                violations: report.errors,
            });
        }

        debug!(
            payer = %doc.payer,
            procedure_code = %doc.cpt_code,
            rules = rules.len(),
            warnings = report.warnings.len(),
            "规则集编译完成"
        );

        Ok(RuleSet::new(
            doc.payer.clone(),
            doc.cpt_code.clone(),
            doc.domain_registry_version.clone(),
            rules,
            doc.extraction_schema.clone(),
        ))
    }

    /// 逐条校验并转换规则
    fn check(&self, doc: &PolicyDocument) -> (Vec<Rule>, ValidationReport) {
        let mut report = ValidationReport::default();
        let mut rules = Vec::with_capacity(doc.canonical_rules.len());

        // 先收集所有规则 ID，供覆盖引用检查使用
        let declared: BTreeMap<&str, &RuleDefinition> = doc
            .canonical_rules
            .iter()
            .map(|r| (r.id.as_str(), r))
            .collect();

        let mut seen = BTreeSet::new();
        for (index, def) in doc.canonical_rules.iter().enumerate() {
            let label = if def.id.is_empty() {
                format!("canonical_rules[{}]", index)
            } else {
                def.id.clone()
            };

            if def.id.is_empty() {
                report.error(Check::EmptyRuleId, None, None, format!("{} 缺少规则 ID", label));
            } else if !seen.insert(def.id.as_str()) {
                report.error(
                    Check::DuplicateRuleId,
                    Some(&def.id),
                    None,
                    format!("规则 ID 重复: '{}'", def.id),
                );
            }

            let kind = self.check_kind(def, &label, &declared, &mut report);
            let logic = self.check_logic(def, &label, &mut report);
            let conditions = self.check_conditions(doc, def, &label, &mut report);

            if let (Some(kind), Some(logic), Some(conditions)) = (kind, logic, conditions) {
                rules.push(Rule {
                    id: def.id.clone(),
                    description: def.description.clone(),
                    kind,
                    logic,
                    conditions,
                    scoreable: def.scoreable,
                });
            }
        }

        self.check_schema_usage(doc, &mut report);
        self.check_registry_version(doc, &mut report);

        (rules, report)
    }

    /// 规则类型：排除与例外互斥，例外必须覆盖已存在的标准规则
    fn check_kind(
        &self,
        def: &RuleDefinition,
        label: &str,
        declared: &BTreeMap<&str, &RuleDefinition>,
        report: &mut ValidationReport,
    ) -> Option<RuleKind> {
        if def.exclusion && def.exception_pathway {
            report.error(
                Check::AmbiguousKind,
                Some(label),
                None,
                format!("规则 '{}' 同时标记为排除规则和例外规则", label),
            );
            return None;
        }

        if !def.exception_pathway {
            if !def.overrides.is_empty() {
                report.error(
                    Check::OverridesOnNonException,
                    Some(label),
                    None,
                    format!("规则 '{}' 不是例外规则，却声明了 overrides", label),
                );
                return None;
            }
            return Some(if def.exclusion {
                RuleKind::Exclusion
            } else {
                RuleKind::Standard
            });
        }

        if def.overrides.is_empty() {
            report.error(
                Check::MissingOverrides,
                Some(label),
                None,
                format!("例外规则 '{}' 的 overrides 不能为空", label),
            );
            return None;
        }

        let mut valid = true;
        for target in &def.overrides {
            match declared.get(target.as_str()) {
                None => {
                    valid = false;
                    report.error(
                        Check::DanglingOverride,
                        Some(label),
                        None,
                        format!("例外规则 '{}' 覆盖了不存在的规则 '{}'", label, target),
                    );
                }
                Some(other) if other.exclusion || other.exception_pathway => {
                    valid = false;
                    report.error(
                        Check::OverrideNotStandard,
                        Some(label),
                        None,
                        format!("例外规则 '{}' 只能覆盖标准规则，'{}' 不是标准规则", label, target),
                    );
                }
                Some(_) => {}
            }
        }

        valid.then(|| RuleKind::Exception {
            overrides: def.overrides.iter().cloned().collect(),
        })
    }

    /// 逻辑操作符与阈值
    fn check_logic(
        &self,
        def: &RuleDefinition,
        label: &str,
        report: &mut ValidationReport,
    ) -> Option<Logic> {
        let kind = match def.logic.parse::<LogicKind>() {
            Ok(kind) => kind,
            Err(e) => {
                report.error(Check::UnknownLogic, Some(label), None, format!("规则 '{}': {}", label, e));
                return None;
            }
        };

        if !kind.is_count() {
            if def.threshold.is_some() {
                report.warning(
                    Check::UnexpectedThreshold,
                    Some(label),
                    None,
                    format!("规则 '{}' 的逻辑为 '{}'，threshold 将被忽略", label, def.logic),
                );
            }
            return Some(if kind == LogicKind::All { Logic::All } else { Logic::Any });
        }

        let Some(threshold) = def.threshold else {
            report.error(
                Check::MissingThreshold,
                Some(label),
                None,
                format!("规则 '{}' 使用 '{}' 但缺少 threshold", label, def.logic),
            );
            return None;
        };

        let count = def.conditions.len();
        let threshold = match usize::try_from(threshold) {
            Ok(t) if t >= 1 && t <= count => t,
            _ => {
                report.error(
                    Check::ThresholdOutOfRange,
                    Some(label),
                    None,
                    format!(
                        "规则 '{}' 的 threshold {} 超出范围 1..={}",
                        label, threshold, count
                    ),
                );
                return None;
            }
        };

        Some(match kind {
            LogicKind::CountAtMost => Logic::CountAtMost { threshold },
            _ => Logic::CountAtLeast { threshold },
        })
    }

    /// 条件：操作符、目标值形状、字段声明
    fn check_conditions(
        &self,
        doc: &PolicyDocument,
        def: &RuleDefinition,
        label: &str,
        report: &mut ValidationReport,
    ) -> Option<Vec<Condition>> {
        if def.conditions.is_empty() {
            report.error(
                Check::EmptyConditions,
                Some(label),
                None,
                format!("规则 '{}' 的条件列表不能为空", label),
            );
            return None;
        }

        let mut conditions = Vec::with_capacity(def.conditions.len());
        let mut valid = true;

        for (i, cond) in def.conditions.iter().enumerate() {
            let path = format!("{}.conditions[{}]", label, i);
            let field = cond.field.as_str();

            let operator = match cond.operator.parse::<Operator>() {
                Ok(op) => Some(op),
                Err(e) => {
                    report.error(Check::UnknownOperator, Some(label), Some(field), format!("{}: {}", path, e));
                    None
                }
            };

            let target = match Value::from_json(&cond.value) {
                Some(target) => Some(target),
                None => {
                    report.error(
                        Check::InvalidTarget,
                        Some(label),
                        Some(field),
                        format!("{}: 目标值不能是对象", path),
                    );
                    None
                }
            };

            if let (Some(op), Some(target)) = (operator, target.as_ref()) {
                let expected = if target.is_absent() {
                    Some("非空")
                } else if op.requires_list_target() && target.as_list().is_none() {
                    Some("列表")
                } else if op.is_numeric() && target.as_number().is_none() {
                    Some("数值")
                } else {
                    None
                };
                if let Some(expected) = expected {
                    report.error(
                        Check::InvalidTarget,
                        Some(label),
                        Some(field),
                        format!(
                            "{}: {} 操作符需要{}目标值，实际为 {}",
                            path,
                            op,
                            expected,
                            target.type_name()
                        ),
                    );
                    valid = false;
                }
            }

            match declared_field(&doc.extraction_schema, field) {
                None => {
                    valid = false;
                    report.error(
                        Check::UndeclaredField,
                        Some(label),
                        Some(field),
                        format!(
                            "{}: 字段 '{}' 未在 extraction_schema 中声明{}",
                            path,
                            field,
                            suggestion(field, doc.extraction_schema.keys())
                        ),
                    );
                }
                Some(spec) => {
                    if let Some(op) = operator {
                        if op.is_numeric() && spec.field_type != FieldType::Number {
                            report.warning(
                                Check::OperatorFieldType,
                                Some(label),
                                Some(field),
                                format!("{}: 数值操作符 {} 作用于非数值字段 '{}'", path, op, field),
                            );
                        }
                    }
                }
            }

            if let Some(registry) = &self.registry {
                if !registry.contains(root_segment(field)) {
                    valid = false;
                    report.error(
                        Check::FieldNotInRegistry,
                        Some(label),
                        Some(field),
                        format!(
                            "{}: 字段 '{}' 不在领域注册表中{}",
                            path,
                            field,
                            suggestion(root_segment(field), registry.field_names())
                        ),
                    );
                }
            }

            match (operator, target) {
                (Some(operator), Some(target)) => conditions.push(Condition {
                    field: cond.field.clone(),
                    operator,
                    target,
                }),
                _ => valid = false,
            }
        }

        valid.then_some(conditions)
    }

    /// schema 中声明却没有任何条件引用的字段
    fn check_schema_usage(&self, doc: &PolicyDocument, report: &mut ValidationReport) {
        let used: BTreeSet<&str> = doc
            .canonical_rules
            .iter()
            .flat_map(|r| r.conditions.iter().map(|c| c.field.as_str()))
            .collect();

        for name in doc.extraction_schema.keys() {
            if name.starts_with('_') {
                continue;
            }
            let referenced = used.iter().any(|field| {
                *field == name
                    || field
                        .strip_prefix(name.as_str())
                        .is_some_and(|rest| rest.starts_with(PATH_SEPARATOR))
            });
            if !referenced {
                report.warning(
                    Check::OrphanSchemaField,
                    None,
                    Some(name),
                    format!("schema 字段 '{}' 未被任何条件引用", name),
                );
            }
        }
    }

    fn check_registry_version(&self, doc: &PolicyDocument, report: &mut ValidationReport) {
        let Some(registry) = &self.registry else {
            return;
        };
        if let (Some(expected), Some(actual)) = (&doc.domain_registry_version, &registry.version) {
            if expected != actual {
                report.warning(
                    Check::RegistryVersionMismatch,
                    None,
                    None,
                    format!("规则引用注册表版本 {}，当前注册表版本为 {}", expected, actual),
                );
            }
        }
    }
}

/// 查找字段声明
///
/// 精确匹配，或路径位于一个声明为 object/list 的字段之下（如 "therapy.weeks"、"diagnoses.0"）。
fn declared_field<'a>(schema: &'a BTreeMap<String, FieldSpec>, field: &str) -> Option<&'a FieldSpec> {
    if field.is_empty() {
        return None;
    }
    if let Some(spec) = schema.get(field) {
        return Some(spec);
    }

    let mut prefix_end = field.len();
    while let Some(pos) = field[..prefix_end].rfind(PATH_SEPARATOR) {
        if let Some(spec) = schema.get(&field[..pos]) {
            return matches!(spec.field_type, FieldType::Object | FieldType::List).then_some(spec);
        }
        prefix_end = pos;
    }
    None
}

/// 拼写相近的候选字段提示，相似度低于 0.6 时不提示
fn suggestion<'a>(field: &str, candidates: impl IntoIterator<Item = &'a String>) -> String {
    candidates
        .into_iter()
        .filter(|name| !name.starts_with('_'))
        .map(|name| (name, strsim::normalized_levenshtein(field, name)))
        .filter(|(_, score)| *score >= SUGGESTION_CUTOFF)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| format!("，是否应为 '{}'?", name))
        .unwrap_or_default()
}

const SUGGESTION_CUTOFF: f64 = 0.6;

fn root_segment(field: &str) -> &str {
    field.split(PATH_SEPARATOR).next().unwrap_or(field)
}
