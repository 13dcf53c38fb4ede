//! 共享库
//!
//! 各服务共用的配置加载与日志初始化。

pub mod config;
pub mod observability;
