//! 规则集仓库
//!
//! 从规则目录加载 `{payer}_{procedure}.json`，编译校验一次后以 `Arc<RuleSet>` 缓存在 DashMap 中，
//! 之后的并发评估共享同一份不可变规则集。

use crate::compiler::RuleSetCompiler;
use crate::error::{EngineError, Result};
use crate::models::RuleSet;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 规则集仓库
#[derive(Clone)]
pub struct RuleSetRepository {
    /// 规则文件目录
    dir: PathBuf,
    /// 已编译的规则集缓存，键为 `{payer}_{procedure}`
    rulesets: Arc<DashMap<String, Arc<RuleSet>>>,
    compiler: Arc<RuleSetCompiler>,
}

impl RuleSetRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_compiler(dir, RuleSetCompiler::new())
    }

    /// 使用自定义编译器（如附带领域注册表）
    pub fn with_compiler(dir: impl Into<PathBuf>, compiler: RuleSetCompiler) -> Self {
        Self {
            dir: dir.into(),
            rulesets: Arc::new(DashMap::new()),
            compiler: Arc::new(compiler),
        }
    }

    /// 规则文件目录
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 规则集缓存键，付款方名称统一为小写
    pub fn key(payer: &str, procedure_code: &str) -> String {
        format!("{}_{}", payer.to_lowercase(), procedure_code)
    }

    /// 规则文件路径
    pub fn path_for(&self, payer: &str, procedure_code: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", Self::key(payer, procedure_code)))
    }

    /// 加载规则集，已缓存时直接返回
    #[instrument(skip(self))]
    pub fn load(&self, payer: &str, procedure_code: &str) -> Result<Arc<RuleSet>> {
        let key = Self::key(payer, procedure_code);
        if let Some(cached) = self.rulesets.get(&key) {
            debug!("规则集命中缓存: {}", key);
            return Ok(Arc::clone(cached.value()));
        }

        let path = self.path_for(payer, procedure_code);
        if !path.is_file() {
            warn!(path = %path.display(), "规则文件不存在");
            return Err(EngineError::RuleSetNotFound {
                payer: payer.to_string(),
                procedure_code: procedure_code.to_string(),
            });
        }

        let json = std::fs::read_to_string(&path)?;
        let ruleset = Arc::new(self.compiler.compile_from_json(&json)?);

        // 并发加载同一规则集时保留先写入的一份
        let entry = self.rulesets.entry(key.clone()).or_insert(ruleset);
        info!(
            rules = entry.len(),
            path = %path.display(),
            "规则集已加载: {}",
            key
        );
        Ok(Arc::clone(entry.value()))
    }

    /// 从 JSON 字符串加载规则集，覆盖同一付款方与 CPT 的旧版本
    #[instrument(skip(self, json))]
    pub fn load_from_json(&self, json: &str) -> Result<Arc<RuleSet>> {
        let ruleset = Arc::new(self.compiler.compile_from_json(json)?);
        let key = Self::key(ruleset.payer(), ruleset.procedure_code());

        if self.rulesets.insert(key.clone(), Arc::clone(&ruleset)).is_some() {
            info!("规则集已替换: {}", key);
        } else {
            info!(rules = ruleset.len(), "规则集已加载: {}", key);
        }
        Ok(ruleset)
    }

    /// 获取已缓存的规则集
    pub fn get(&self, payer: &str, procedure_code: &str) -> Option<Arc<RuleSet>> {
        self.rulesets
            .get(&Self::key(payer, procedure_code))
            .map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, payer: &str, procedure_code: &str) -> bool {
        self.rulesets.contains_key(&Self::key(payer, procedure_code))
    }

    /// 所有已缓存规则集的键（有序）
    pub fn list_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.rulesets.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys
    }

    /// 移除缓存，下次加载时重新读取文件
    #[instrument(skip(self))]
    pub fn evict(&self, payer: &str, procedure_code: &str) -> bool {
        let removed = self
            .rulesets
            .remove(&Self::key(payer, procedure_code))
            .is_some();
        if removed {
            info!("规则集已移除");
        }
        removed
    }

    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.rulesets.len();
        self.rulesets.clear();
        info!("已清空 {} 个规则集", count);
    }

    pub fn len(&self) -> usize {
        self.rulesets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rulesets.is_empty()
    }

    /// 获取统计信息
    pub fn stats(&self) -> RuleSetStats {
        let rulesets_count = self.rulesets.len();
        let (total_rules, total_fields) = self.rulesets.iter().fold((0, 0), |(rules, fields), r| {
            (rules + r.len(), fields + r.required_fields().len())
        });

        RuleSetStats {
            rulesets_count,
            total_rules,
            total_fields,
        }
    }
}

/// 仓库统计信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSetStats {
    pub rulesets_count: usize,
    /// 所有规则集的规则总数
    pub total_rules: usize,
    /// 所有规则集引用的字段总数
    pub total_fields: usize,
}
