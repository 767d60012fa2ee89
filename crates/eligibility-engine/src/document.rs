//! 策略文档（外部策略编译器的输出格式）
//!
//! 这里的结构刻意保持宽松：操作符与逻辑是字符串，规则类型由独立的布尔标记表示。
//! 编译器负责把它校验并转换为强类型的 `RuleSet`，所有结构问题都在加载时暴露。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 编译后的策略文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub payer: String,
    #[serde(alias = "procedure_code")]
    pub cpt_code: String,
    #[serde(default)]
    pub domain_registry_version: Option<String>,
    #[serde(default)]
    pub canonical_rules: Vec<RuleDefinition>,
    #[serde(default)]
    pub extraction_schema: BTreeMap<String, FieldSpec>,
}

impl PolicyDocument {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// 规则定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_logic")]
    pub logic: String,
    #[serde(default)]
    pub threshold: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<ConditionDefinition>,
    #[serde(default)]
    pub exclusion: bool,
    #[serde(default)]
    pub exception_pathway: bool,
    #[serde(default)]
    pub overrides: Vec<String>,
    #[serde(default = "default_scoreable")]
    pub scoreable: bool,
}

fn default_logic() -> String {
    "all".to_string()
}

fn default_scoreable() -> bool {
    true
}

/// 条件定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionDefinition {
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// 字段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Boolean,
    #[serde(alias = "integer", alias = "float")]
    Number,
    #[serde(alias = "string")]
    Text,
    #[serde(alias = "array")]
    List,
    Object,
}

/// 抽取 schema 中的字段声明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// 领域字段注册表
///
/// 同一领域（如膝关节影像）下所有付款方共享的字段词表，可选地用于加载时校验。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldRegistry {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl FieldRegistry {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// 字段是否在注册表中（以 `_` 开头的键是注释，不算字段）
    pub fn contains(&self, field: &str) -> bool {
        !field.starts_with('_') && self.fields.contains_key(field)
    }

    /// 注册表中的字段名（含注释键，由调用方过滤）
    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_deserialization() {
        let json = r#"
        {
            "payer": "utah_medicaid",
            "cpt_code": "73721",
            "canonical_rules": [
                {
                    "id": "conservative_treatment",
                    "description": "Conservative treatment",
                    "logic": "count_gte",
                    "threshold": 2,
                    "conditions": [
                        { "field": "pt_weeks", "operator": "gte", "value": 6 },
                        { "field": "bracing", "operator": "eq", "value": true }
                    ]
                },
                {
                    "id": "wc",
                    "exclusion": true,
                    "conditions": [
                        { "field": "workers_comp", "operator": "eq", "value": false }
                    ]
                }
            ],
            "extraction_schema": {
                "pt_weeks": { "type": "integer" },
                "bracing": { "type": "boolean", "default": false },
                "workers_comp": { "type": "boolean" }
            }
        }
        "#;

        let doc = PolicyDocument::from_json(json).unwrap();
        assert_eq!(doc.cpt_code, "73721");
        assert_eq!(doc.canonical_rules.len(), 2);

        let first = &doc.canonical_rules[0];
        assert_eq!(first.threshold, Some(2));
        assert!(first.scoreable);
        assert!(!first.exclusion);

        let second = &doc.canonical_rules[1];
        assert_eq!(second.logic, "all");
        assert!(second.exclusion);

        assert_eq!(doc.extraction_schema["pt_weeks"].field_type, FieldType::Number);
        assert_eq!(
            doc.extraction_schema["bracing"].default,
            Some(serde_json::Value::Bool(false))
        );
    }

    #[test]
    fn test_registry_ignores_comment_keys() {
        let registry = FieldRegistry::from_json(
            r#"{ "version": "1.0", "fields": { "_comment": "knee", "pt_weeks": {} } }"#,
        )
        .unwrap();

        assert!(registry.contains("pt_weeks"));
        assert!(!registry.contains("_comment"));
        assert!(!registry.contains("bracing"));
    }
}
