//! 资格规则评估命令行
//!
//! 校验编译后的策略文档，或针对事实记录评估规则集并输出 JSON 结果。

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use eligibility_engine::{
    AggregateResult, FactRecord, FieldRegistry, PolicyDocument, RepeatImagingCheck, RuleExecutor,
    RuleSet, RuleSetCompiler, RuleSetRepository, ThresholdBanding, Verdict, VerdictPolicy,
    readiness_score,
};
use eligibility_shared::config::AppConfig;
use eligibility_shared::observability;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

const SERVICE_NAME: &str = "eligibility-engine";

/// Prior-authorization eligibility rule engine.
#[derive(Parser)]
#[command(name = "eligibility-engine", version, about = "Prior-authorization eligibility rule engine")]
struct Cli {
    /// Domain field registry used to check field references
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a compiled policy document
    Validate {
        /// Path to the compiled rules JSON file
        rules: PathBuf,
    },

    /// Evaluate fact records against a rule set
    Evaluate {
        /// Path to the compiled rules JSON file (omit to look up by payer and procedure)
        rules: Option<PathBuf>,
        /// Fact record JSON files
        #[arg(long, required = true, num_args = 1..)]
        facts: Vec<PathBuf>,
        /// Payer name for rules directory lookup
        #[arg(long, requires = "procedure")]
        payer: Option<String>,
        /// Procedure (CPT) code for rules directory lookup
        #[arg(long, requires = "payer")]
        procedure: Option<String>,
        /// Rules directory (defaults to rules.dir from configuration)
        #[arg(long)]
        rules_dir: Option<PathBuf>,
        /// Requested CPT code for advisory checks (defaults to the rule set's code)
        #[arg(long)]
        cpt: Option<String>,
        /// Include readiness score and verdict
        #[arg(long)]
        verdict: bool,
    },
}

/// 单条事实记录的评估输出
#[derive(Serialize)]
struct EvaluationReport {
    facts: String,
    #[serde(flatten)]
    result: AggregateResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    readiness_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verdict: Option<Verdict>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });
    let _guard = observability::init(SERVICE_NAME, &config.observability)?;

    let compiler = build_compiler(cli.registry.as_deref(), &config)?;

    match cli.command {
        Commands::Validate { rules } => validate(&compiler, &rules),
        Commands::Evaluate {
            rules,
            facts,
            payer,
            procedure,
            rules_dir,
            cpt,
            verdict,
        } => {
            let ruleset = match (rules, payer, procedure) {
                (Some(path), _, _) => Arc::new(compile_file(&compiler, &path)?),
                (None, Some(payer), Some(procedure)) => {
                    let dir = rules_dir.unwrap_or_else(|| config.rules.dir_path());
                    RuleSetRepository::with_compiler(dir, compiler).load(&payer, &procedure)?
                }
                _ => bail!("either a rules file or --payer/--procedure is required"),
            };

            let policy = verdict.then(|| ThresholdBanding::from_config(&config.banding));
            evaluate(&ruleset, &facts, cpt.as_deref(), policy.as_ref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_compiler(registry: Option<&Path>, config: &AppConfig) -> Result<RuleSetCompiler> {
    let path = registry
        .map(Path::to_path_buf)
        .or_else(|| config.rules.registry_path.as_ref().map(PathBuf::from));

    let Some(path) = path else {
        return Ok(RuleSetCompiler::new());
    };

    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read registry {}", path.display()))?;
    let registry = FieldRegistry::from_json(&json)
        .with_context(|| format!("invalid registry {}", path.display()))?;
    info!(path = %path.display(), fields = registry.fields.len(), "Field registry loaded");
    Ok(RuleSetCompiler::new().with_registry(registry))
}

fn compile_file(compiler: &RuleSetCompiler, path: &Path) -> Result<RuleSet> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rules {}", path.display()))?;
    compiler
        .compile_from_json(&json)
        .with_context(|| format!("failed to load rules {}", path.display()))
}

fn validate(compiler: &RuleSetCompiler, path: &Path) -> Result<ExitCode> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read rules {}", path.display()))?;
    let doc = PolicyDocument::from_json(&json)
        .with_context(|| format!("malformed policy document {}", path.display()))?;

    let report = compiler.validate(&doc);
    println!("{}", serde_json::to_string_pretty(&report)?);

    for violation in report.errors.iter().chain(report.warnings.iter()) {
        eprintln!("{:?}: {}", violation.severity, violation);
    }

    if report.is_valid() {
        info!(
            rules = doc.canonical_rules.len(),
            warnings = report.warnings.len(),
            "Validation passed"
        );
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn evaluate(
    ruleset: &RuleSet,
    facts: &[PathBuf],
    cpt: Option<&str>,
    policy: Option<&ThresholdBanding>,
) -> Result<()> {
    let records = facts
        .iter()
        .map(|path| {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read facts {}", path.display()))?;
            FactRecord::from_json_str(&json)
                .with_context(|| format!("invalid fact record {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let requested = cpt.unwrap_or(ruleset.procedure_code());
    let executor = RuleExecutor::new().with_advisory(Box::new(RepeatImagingCheck::new(requested)));
    let results = executor.execute_batch(ruleset, &records);

    let reports: Vec<EvaluationReport> = facts
        .iter()
        .zip(results)
        .map(|(path, result)| EvaluationReport {
            facts: path.display().to_string(),
            readiness_score: policy.map(|_| readiness_score(&result)),
            verdict: policy.map(|p| p.verdict(&result)),
            result,
        })
        .collect();

    info!(
        payer = %ruleset.payer(),
        procedure_code = %ruleset.procedure_code(),
        records = reports.len(),
        "Evaluation complete"
    );

    let output = match reports.as_slice() {
        [single] => serde_json::to_string_pretty(single)?,
        many => serde_json::to_string_pretty(many)?,
    };
    println!("{}", output);
    Ok(())
}
