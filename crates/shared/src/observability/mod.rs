//! 统一可观测性模块
//!
//! 提供日志与追踪的统一初始化。所有入口（命令行、嵌入方服务）通过单一入口点配置，
//! 确保一致的日志字段与格式。

pub mod tracing;

use ::tracing::info;
use anyhow::Result;

use crate::config::ObservabilityConfig;

/// 可观测性资源守卫
///
/// 持有日志订阅器的生命周期，drop 时输出关闭日志。
pub struct ObservabilityGuard {
    service_name: String,
    _tracing_guard: Option<tracing::TracingGuard>,
}

impl ObservabilityGuard {
    /// 创建一个空的 Guard（用于测试或禁用可观测性时）
    pub fn empty() -> Self {
        Self {
            service_name: String::new(),
            _tracing_guard: None,
        }
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if self._tracing_guard.is_some() {
            info!(service = %self.service_name, "Shutting down observability...");
        }
    }
}

/// 统一初始化可观测性
///
/// # Example
///
/// ```ignore
/// use eligibility_shared::config::AppConfig;
/// use eligibility_shared::observability;
///
/// fn main() -> anyhow::Result<()> {
///     let config = AppConfig::load("eligibility-engine")?;
///     let _guard = observability::init(&config.service_name, &config.observability)?;
///     Ok(())
/// }
/// ```
pub fn init(service_name: &str, config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    let tracing_guard = tracing::init(config)?;

    info!(
        service = %service_name,
        log_level = %config.log_level,
        log_format = %config.log_format,
        "Observability initialized"
    );

    Ok(ObservabilityGuard {
        service_name: service_name.to_string(),
        _tracing_guard: Some(tracing_guard),
    })
}
