//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// 规则文件配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// 编译后规则文件所在目录（文件名形如 `{payer}_{procedure}.json`）
    pub dir: String,
    /// 可选的领域字段注册表文件，用于加载时校验字段引用
    pub registry_path: Option<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            dir: "compiled_rules".to_string(),
            registry_path: None,
        }
    }
}

impl RulesConfig {
    /// 规则目录路径
    pub fn dir_path(&self) -> PathBuf {
        PathBuf::from(&self.dir)
    }
}

/// 结论分档配置
///
/// 分档属于展示策略，评估引擎本身不读取这些阈值。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BandingConfig {
    /// 达到该分数且无失败项时判定为可能通过
    pub approve_score: u8,
    /// 低于该分数判定为可能拒绝
    pub deny_score: u8,
    /// 失败项达到该数量判定为可能拒绝
    pub deny_failures: usize,
}

impl Default for BandingConfig {
    fn default() -> Self {
        Self {
            approve_score: 80,
            deny_score: 50,
            deny_failures: 2,
        }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// 是否输出 JSON 格式日志
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub rules: RulesConfig,
    pub banding: BandingConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（ELIGIBILITY_ 前缀，如 ELIGIBILITY_RULES__DIR -> rules.dir）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("ELIGIBILITY_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(service_name, &env, Path::new(&config_dir))
    }

    /// 从指定目录加载配置，便于测试时绕开进程环境变量
    pub fn load_from(service_name: &str, env: &str, config_dir: &Path) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            // 双下划线分隔层级，保留字段名中的单下划线（log_level）
            .add_source(
                Environment::with_prefix("ELIGIBILITY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
