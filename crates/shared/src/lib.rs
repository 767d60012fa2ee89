//! 共享库
//!
//! 包含资格评估引擎与命令行工具共用的配置、可观测性初始化以及测试数据生成器。

pub mod config;
pub mod observability;
pub mod test_utils;
