//! 规则集仓库与加载期校验集成测试
//!
//! 使用 tests/fixtures 下的策略文档、领域注册表与患者事实记录。

use eligibility_engine::{
    Check, EngineError, FactRecord, FieldRegistry, PolicyDocument, RepeatImagingCheck,
    RuleExecutor, RuleSetCompiler, RuleSetRepository, ThresholdBanding, Verdict, VerdictPolicy,
};
use std::path::PathBuf;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixtures_dir().join(name)).unwrap()
}

fn registry() -> FieldRegistry {
    FieldRegistry::from_json(&read_fixture("knee_registry.json")).unwrap()
}

#[test]
fn test_fixture_policy_is_valid_against_registry() {
    let doc = PolicyDocument::from_json(&read_fixture("utah_medicaid_73721.json")).unwrap();
    let report = RuleSetCompiler::new().with_registry(registry()).validate(&doc);

    assert!(report.is_valid(), "{:?}", report.errors);
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
}

#[test]
fn test_repository_loads_and_evaluates_fixture() {
    let repo = RuleSetRepository::with_compiler(
        fixtures_dir(),
        RuleSetCompiler::new().with_registry(registry()),
    );

    let rules = repo.load("UTAH_MEDICAID", "73721").unwrap();
    assert_eq!(rules.len(), 6);
    assert_eq!(rules.registry_version(), Some("1.0"));
    assert_eq!(repo.list_keys(), vec!["utah_medicaid_73721"]);

    let record = FactRecord::from_json_str(&read_fixture("patient_meniscal_tear.json")).unwrap();
    let executor = RuleExecutor::new().with_advisory(Box::new(RepeatImagingCheck::new(rules.procedure_code())));
    let result = executor.execute(&rules, &record);

    assert!(!result.excluded);
    assert_eq!(
        result.exceptions_applied,
        vec!["Red flag findings waive the conservative treatment requirement"]
    );
    assert!(result.result("conservative_treatment").unwrap().overridden_by_exception);
    assert_eq!((result.rules_met, result.total_scoreable), (3, 3));
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("3.2 month(s) ago"));

    assert_eq!(ThresholdBanding::default().verdict(&result), Verdict::LikelyToApprove);
}

#[test]
fn test_repository_reports_missing_ruleset() {
    let repo = RuleSetRepository::new(fixtures_dir());

    match repo.load("utah_medicaid", "73722") {
        Err(EngineError::RuleSetNotFound { payer, procedure_code }) => {
            assert_eq!(payer, "utah_medicaid");
            assert_eq!(procedure_code, "73722");
        }
        other => panic!("expected RuleSetNotFound, got {:?}", other.map(|r| r.len())),
    }
}

#[test]
fn test_registry_rejects_unknown_field() {
    let mut doc = PolicyDocument::from_json(&read_fixture("utah_medicaid_73721.json")).unwrap();
    doc.canonical_rules[3].conditions[0].field = "xray_weeks_ago".to_string();
    doc.extraction_schema.insert(
        "xray_weeks_ago".to_string(),
        serde_json::from_str(r#"{ "type": "number" }"#).unwrap(),
    );

    let report = RuleSetCompiler::new().with_registry(registry()).validate(&doc);

    assert!(!report.is_valid());
    let missing = report
        .errors
        .iter()
        .find(|v| v.check == Check::FieldNotInRegistry)
        .unwrap();
    assert!(missing.message.ends_with("是否应为 'xray_days_ago'?"), "{}", missing.message);
    // xray_days_ago 不再被引用
    assert!(report.has_check(Check::OrphanSchemaField));
}

#[test]
fn test_registry_version_mismatch_is_warning() {
    let mut doc = PolicyDocument::from_json(&read_fixture("utah_medicaid_73721.json")).unwrap();
    doc.domain_registry_version = Some("0.9".to_string());

    let compiler = RuleSetCompiler::new().with_registry(registry());
    let report = compiler.validate(&doc);

    assert!(report.is_valid());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].check, Check::RegistryVersionMismatch);
    assert!(compiler.compile(&doc).is_ok());
}

#[test]
fn test_invalid_document_collects_all_errors() {
    let json = r#"
    {
        "payer": "aetna",
        "cpt_code": "73721",
        "canonical_rules": [
            { "id": "a", "logic": "count_gte", "threshold": 4,
              "conditions": [ { "field": "pt_weeks", "operator": "gte", "value": 6 } ] },
            { "id": "a", "conditions": [ { "field": "pt_weeks", "operator": "approx", "value": 6 } ] },
            { "id": "b", "exception_pathway": true, "overrides": ["missing"],
              "conditions": [ { "field": "infection", "operator": "eq", "value": true } ] }
        ],
        "extraction_schema": { "pt_weeks": { "type": "number" } }
    }
    "#;

    let err = RuleSetCompiler::new().compile_from_json(json).unwrap_err();
    let EngineError::InvalidRuleSet { violations } = err else {
        panic!("expected InvalidRuleSet");
    };

    let checks: Vec<Check> = violations.iter().map(|v| v.check).collect();
    assert_eq!(
        checks,
        vec![
            Check::ThresholdOutOfRange,
            Check::DuplicateRuleId,
            Check::UnknownOperator,
            Check::DanglingOverride,
            Check::UndeclaredField,
        ]
    );
}
