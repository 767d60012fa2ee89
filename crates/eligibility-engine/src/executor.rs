//! 规则集执行器
//!
//! 评估分三个阶段，严格按顺序执行：
//! 1. 排除规则：按声明顺序评估，第一条不满足的排除规则立即终止评估；
//! 2. 例外规则：全部评估，满足的例外将其 overrides 并入豁免集合；
//! 3. 标准规则：按逻辑操作符聚合，未满足但被豁免的规则报告为满足。
//!
//! 评估是纯函数：不做 I/O，不依赖共享可变状态，相同输入产生相同输出。

use crate::advisory::AdvisoryCheck;
use crate::evaluator::ConditionEvaluator;
use crate::models::{AggregateResult, ConditionDetail, EvaluationResult, Rule, RuleKind, RuleSet};
use crate::resolver::FactRecord;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// 规则集执行器
#[derive(Default)]
pub struct RuleExecutor {
    advisories: Vec<Box<dyn AdvisoryCheck>>,
}

impl RuleExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册提示性检查
    pub fn with_advisory(mut self, check: Box<dyn AdvisoryCheck>) -> Self {
        self.advisories.push(check);
        self
    }

    /// 评估单条规则（不考虑例外豁免）
    ///
    /// 类型不匹配的说明追加到 `warnings`。
    pub fn evaluate_rule(
        &self,
        rule: &Rule,
        record: &FactRecord,
        warnings: &mut Vec<String>,
    ) -> EvaluationResult {
        let mut details = Vec::with_capacity(rule.conditions.len());

        for condition in &rule.conditions {
            let outcome = ConditionEvaluator::evaluate(record, condition);

            if let Some(mismatch) = &outcome.mismatch {
                warn!(
                    rule_id = %rule.id,
                    field = %condition.field,
                    operator = %condition.operator,
                    "条件类型不匹配: {}",
                    mismatch
                );
                warnings.push(format!(
                    "rule '{}' condition '{}': {}",
                    rule.id, condition, mismatch
                ));
            }

            details.push(ConditionDetail {
                condition: condition.clone(),
                resolved_value: outcome.resolved,
                met: outcome.met,
            });
        }

        let met_count = details.iter().filter(|d| d.met).count();
        let met = rule.logic.aggregate(met_count, details.len());

        debug!(
            rule_id = %rule.id,
            logic = %rule.logic,
            met_count,
            total = details.len(),
            met,
            "规则已评估"
        );

        EvaluationResult {
            rule_id: rule.id.clone(),
            description: rule.description.clone(),
            kind: rule.kind.category(),
            met,
            logic: rule.logic,
            condition_details: details,
            overridden_by_exception: false,
        }
    }

    /// 针对一条事实记录评估整个规则集
    pub fn execute(&self, ruleset: &RuleSet, record: &FactRecord) -> AggregateResult {
        let rules = ruleset.rules();
        let mut slots: Vec<Option<EvaluationResult>> = vec![None; rules.len()];
        let mut warnings = Vec::new();

        // 阶段 1：排除规则，条件描述的是“未被排除”的状态
        for (index, rule) in rules.iter().enumerate() {
            if !rule.kind.is_exclusion() {
                continue;
            }
            let result = self.evaluate_rule(rule, record, &mut warnings);
            if !result.met {
                info!(
                    payer = %ruleset.payer(),
                    procedure_code = %ruleset.procedure_code(),
                    rule_id = %rule.id,
                    "记录被排除规则拦截"
                );
                return AggregateResult {
                    exclusion_reason: Some(result.description.clone()),
                    results: vec![result],
                    excluded: true,
                    all_criteria_met: false,
                    warnings,
                    ..Default::default()
                };
            }
            slots[index] = Some(result);
        }

        for check in &self.advisories {
            if let Some(message) = check.check(record) {
                debug!(check = check.id(), "触发提示性检查");
                warnings.push(message);
            }
        }

        // 阶段 2：例外规则
        let mut overridden = BTreeSet::new();
        let mut exceptions_applied = Vec::new();
        for (index, rule) in rules.iter().enumerate() {
            let RuleKind::Exception { overrides } = &rule.kind else {
                continue;
            };
            let result = self.evaluate_rule(rule, record, &mut warnings);
            if result.met {
                info!(rule_id = %rule.id, overrides = ?overrides, "例外规则已生效");
                overridden.extend(overrides.iter().map(String::as_str));
                exceptions_applied.push(rule.description.clone());
            }
            slots[index] = Some(result);
        }

        // 阶段 3：标准规则与计分
        let mut total_scoreable = 0;
        let mut rules_met = 0;
        for (index, rule) in rules.iter().enumerate() {
            if !rule.kind.is_standard() {
                continue;
            }
            let mut result = self.evaluate_rule(rule, record, &mut warnings);
            if !result.met && overridden.contains(rule.id.as_str()) {
                debug!(rule_id = %rule.id, "规则由例外豁免");
                result.met = true;
                result.overridden_by_exception = true;
            }
            if rule.scoreable {
                total_scoreable += 1;
                if result.met {
                    rules_met += 1;
                }
            }
            slots[index] = Some(result);
        }

        AggregateResult {
            results: slots.into_iter().flatten().collect(),
            all_criteria_met: rules_met == total_scoreable,
            total_scoreable,
            rules_met,
            rules_failed: total_scoreable - rules_met,
            excluded: false,
            exclusion_reason: None,
            exceptions_applied,
            warnings,
        }
    }

    /// 并行评估多条事实记录，结果顺序与输入一致
    pub fn execute_batch(&self, ruleset: &RuleSet, records: &[FactRecord]) -> Vec<AggregateResult> {
        if records.is_empty() {
            return Vec::new();
        }

        let workers = std::thread::available_parallelism()
            .map_or(1, |n| n.get())
            .min(records.len());
        let chunk_size = records.len().div_ceil(workers);

        std::thread::scope(|scope| {
            let handles: Vec<_> = records
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|record| self.execute(ruleset, record))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }
}

/// 使用默认执行器评估规则集
pub fn evaluate(ruleset: &RuleSet, record: &FactRecord) -> AggregateResult {
    RuleExecutor::new().execute(ruleset, record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::RepeatImagingCheck;
    use crate::compiler::RuleSetCompiler;
    use crate::document::PolicyDocument;
    use serde_json::json;

    fn ruleset(value: serde_json::Value) -> RuleSet {
        let doc: PolicyDocument = serde_json::from_value(value).unwrap();
        RuleSetCompiler::new().compile(&doc).unwrap()
    }

    fn knee_rules() -> RuleSet {
        ruleset(json!({
            "payer": "utah_medicaid",
            "cpt_code": "73721",
            "canonical_rules": [
                { "id": "wc", "description": "Not workers comp", "exclusion": true,
                  "conditions": [ { "field": "workers_comp", "operator": "eq", "value": false } ] },
                { "id": "infection", "description": "Infection suspected", "logic": "any",
                  "exception_pathway": true, "overrides": ["therapy"],
                  "conditions": [ { "field": "infection_suspected", "operator": "eq", "value": true } ] },
                { "id": "therapy", "description": "Conservative therapy",
                  "conditions": [ { "field": "pt_weeks", "operator": "gte", "value": 6 } ] },
                { "id": "xray", "description": "Recent x-ray",
                  "conditions": [ { "field": "xray_days_ago", "operator": "lte", "value": 60 } ] },
                { "id": "quality", "description": "Exam documented", "scoreable": false,
                  "conditions": [ { "field": "exam_documented", "operator": "eq", "value": true } ] }
            ],
            "extraction_schema": {
                "workers_comp": { "type": "boolean" },
                "infection_suspected": { "type": "boolean" },
                "pt_weeks": { "type": "number" },
                "xray_days_ago": { "type": "number" },
                "exam_documented": { "type": "boolean" }
            }
        }))
    }

    #[test]
    fn test_all_rules_met() {
        let record = FactRecord::new()
            .with_field("workers_comp", false)
            .with_field("pt_weeks", 8)
            .with_field("xray_days_ago", 30)
            .with_field("exam_documented", false);

        let result = evaluate(&knee_rules(), &record);

        assert!(!result.excluded);
        assert!(result.all_criteria_met);
        assert_eq!(result.total_scoreable, 2);
        assert_eq!(result.rules_met, 2);
        assert_eq!(result.rules_failed, 0);
        // 非计分规则不满足也不影响得分
        assert!(!result.result("quality").unwrap().met);
        assert_eq!(
            result.results.iter().map(|r| r.rule_id.as_str()).collect::<Vec<_>>(),
            vec!["wc", "infection", "therapy", "xray", "quality"]
        );
    }

    #[test]
    fn test_exclusion_short_circuits() {
        let record = FactRecord::new()
            .with_field("workers_comp", true)
            .with_field("pt_weeks", "bad")
            .with_field("imaging_type", "MRI")
            .with_field("imaging_months_ago", 1);
        let executor = RuleExecutor::new().with_advisory(Box::new(RepeatImagingCheck::new("73721")));

        let result = executor.execute(&knee_rules(), &record);

        assert!(result.excluded);
        assert_eq!(result.exclusion_reason.as_deref(), Some("Not workers comp"));
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].rule_id, "wc");
        assert_eq!(result.total_scoreable, 0);
        assert!(!result.all_criteria_met);
        // 既不评估后续规则，也不运行提示性检查
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_exception_overrides_failed_rule() {
        let record = FactRecord::new()
            .with_field("workers_comp", false)
            .with_field("infection_suspected", true)
            .with_field("pt_weeks", 2)
            .with_field("xray_days_ago", 10);

        let result = evaluate(&knee_rules(), &record);

        let therapy = result.result("therapy").unwrap();
        assert!(therapy.met);
        assert!(therapy.overridden_by_exception);
        assert!(!therapy.condition_details[0].met);
        assert_eq!(result.exceptions_applied, vec!["Infection suspected"]);
        assert_eq!(result.rules_met, 2);
        assert!(result.all_criteria_met);
    }

    #[test]
    fn test_type_mismatch_becomes_warning() {
        let record = FactRecord::new()
            .with_field("workers_comp", false)
            .with_field("pt_weeks", "eight weeks")
            .with_field("xray_days_ago", 10);

        let result = evaluate(&knee_rules(), &record);

        assert!(!result.result("therapy").unwrap().met);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("therapy"));
        assert!(result.warnings[0].contains("expects fact value number but found text"));
        assert_eq!(result.rules_failed, 1);
    }

    #[test]
    fn test_advisory_runs_after_exclusions() {
        let record = FactRecord::new()
            .with_field("workers_comp", false)
            .with_field("imaging_type", "MRI")
            .with_field("imaging_months_ago", 2);
        let executor = RuleExecutor::new().with_advisory(Box::new(RepeatImagingCheck::new("73721")));

        let result = executor.execute(&knee_rules(), &record);

        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("recent MRI"));
        // 提示不影响得分
        assert_eq!(result.rules_met, 0);
    }

    #[test]
    fn test_batch_preserves_order() {
        let rules = knee_rules();
        let records: Vec<FactRecord> = (0..37)
            .map(|i| {
                FactRecord::new()
                    .with_field("workers_comp", i % 5 == 0)
                    .with_field("pt_weeks", i)
                    .with_field("xray_days_ago", 30)
            })
            .collect();

        let executor = RuleExecutor::new();
        let batch = executor.execute_batch(&rules, &records);

        assert_eq!(batch.len(), records.len());
        for (record, result) in records.iter().zip(&batch) {
            assert_eq!(result, &executor.execute(&rules, record));
        }
        assert!(executor.execute_batch(&rules, &[]).is_empty());
    }
}
