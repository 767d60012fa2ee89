//! 测试工具模块
//!
//! 提供集成测试与基准测试所需的测试数据生成器：编译后的策略文档与患者事实记录。
//! 生成的都是 JSON，与外部编译器、抽取器的输出格式保持一致。

use serde_json::{Value, json};

/// 测试数据生成器
pub struct TestDataGenerator;

impl TestDataGenerator {
    /// 保守治疗规则：5 个条件中至少满足 `threshold` 个
    pub fn conservative_treatment_rule(threshold: u64) -> Value {
        json!({
            "id": "conservative_treatment",
            "description": format!("At least {} forms of conservative treatment documented", threshold),
            "logic": "count_gte",
            "threshold": threshold,
            "conditions": [
                { "field": "pt_weeks", "operator": "gte", "value": 6 },
                { "field": "nsaid_weeks", "operator": "gte", "value": 4 },
                { "field": "activity_modification", "operator": "eq", "value": true },
                { "field": "bracing", "operator": "eq", "value": true },
                { "field": "injection", "operator": "eq", "value": true }
            ]
        })
    }

    /// 工伤排除规则：条件描述的是“未被排除”的状态
    pub fn workers_comp_exclusion() -> Value {
        json!({
            "id": "workers_comp_exclusion",
            "description": "Workers' Compensation case: bill the WC carrier, not the standard payer",
            "logic": "all",
            "exclusion": true,
            "conditions": [
                { "field": "workers_comp", "operator": "eq", "value": false }
            ]
        })
    }

    /// 感染疑似例外：满足时豁免保守治疗要求
    pub fn infection_exception() -> Value {
        json!({
            "id": "infection_exception",
            "description": "Suspected infection waives the conservative treatment requirement",
            "logic": "any",
            "exception_pathway": true,
            "overrides": ["conservative_treatment"],
            "conditions": [
                { "field": "infection_suspected", "operator": "eq", "value": true }
            ]
        })
    }

    /// 膝关节 MRI 的完整策略文档
    pub fn knee_mri_policy() -> Value {
        json!({
            "payer": "utah_medicaid",
            "cpt_code": "73721",
            "domain_registry_version": "1.0",
            "canonical_rules": [
                Self::workers_comp_exclusion(),
                Self::infection_exception(),
                Self::conservative_treatment_rule(2),
                {
                    "id": "symptom_duration",
                    "description": "Symptoms persisting for at least 6 weeks",
                    "logic": "all",
                    "conditions": [
                        { "field": "symptom_duration_weeks", "operator": "gte", "value": 6 }
                    ]
                },
                {
                    "id": "recent_xray",
                    "description": "Plain radiographs within the last 60 days",
                    "logic": "all",
                    "conditions": [
                        { "field": "xray_days_ago", "operator": "lte", "value": 60 }
                    ]
                },
                {
                    "id": "chart_quality",
                    "description": "Chart includes a physical examination",
                    "logic": "all",
                    "scoreable": false,
                    "conditions": [
                        { "field": "exam_documented", "operator": "eq", "value": true }
                    ]
                }
            ],
            "extraction_schema": {
                "workers_comp": { "type": "boolean", "default": false },
                "infection_suspected": { "type": "boolean", "default": false },
                "pt_weeks": { "type": "number" },
                "nsaid_weeks": { "type": "number" },
                "activity_modification": { "type": "boolean" },
                "bracing": { "type": "boolean" },
                "injection": { "type": "boolean" },
                "symptom_duration_weeks": { "type": "number" },
                "xray_days_ago": { "type": "number" },
                "exam_documented": { "type": "boolean" }
            }
        })
    }

    /// 满足全部标准规则的患者
    pub fn strong_candidate() -> Value {
        json!({
            "workers_comp": false,
            "infection_suspected": false,
            "pt_weeks": 8,
            "nsaid_weeks": 4,
            "activity_modification": false,
            "bracing": false,
            "injection": false,
            "symptom_duration_weeks": 10,
            "xray_days_ago": 30,
            "exam_documented": true
        })
    }

    /// 工伤患者
    pub fn workers_comp_case() -> Value {
        let mut patient = Self::strong_candidate();
        patient["workers_comp"] = json!(true);
        patient
    }

    /// 疑似感染且未接受保守治疗的患者
    pub fn infection_case() -> Value {
        json!({
            "workers_comp": false,
            "infection_suspected": true,
            "pt_weeks": 0,
            "nsaid_weeks": 0,
            "activity_modification": false,
            "bracing": false,
            "injection": false,
            "symptom_duration_weeks": 7,
            "xray_days_ago": 14,
            "exam_documented": true
        })
    }

    /// 仅 `true_indices` 中的布尔字段为 true 的事实记录（字段名 field_0..field_{n-1}）
    pub fn flags(n: usize, true_indices: &[usize]) -> Value {
        let mut map = serde_json::Map::new();
        for i in 0..n {
            map.insert(format!("field_{}", i), json!(true_indices.contains(&i)));
        }
        Value::Object(map)
    }

    /// 由 n 个 `field_i == true` 条件组成的规则
    pub fn flag_rule(id: &str, logic: &str, threshold: Option<u64>, n: usize) -> Value {
        let conditions: Vec<Value> = (0..n)
            .map(|i| json!({ "field": format!("field_{}", i), "operator": "eq", "value": true }))
            .collect();

        let mut rule = json!({
            "id": id,
            "description": format!("{} of {} flags", logic, n),
            "logic": logic,
            "conditions": conditions
        });
        if let Some(threshold) = threshold {
            rule["threshold"] = json!(threshold);
        }
        rule
    }

    /// 为一组规则包装成策略文档，schema 覆盖 field_0..field_{n-1}
    pub fn flag_policy(rules: Vec<Value>, n: usize) -> Value {
        let mut schema = serde_json::Map::new();
        for i in 0..n {
            schema.insert(format!("field_{}", i), json!({ "type": "boolean" }));
        }
        json!({
            "payer": "test_payer",
            "cpt_code": "00000",
            "canonical_rules": rules,
            "extraction_schema": Value::Object(schema)
        })
    }
}
