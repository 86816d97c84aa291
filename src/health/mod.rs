//! 健康监控：心跳、退避错误计数、重启标记

pub mod monitor;

pub use monitor::{AgentStatus, HealthConfig, HealthMonitor, DEFAULT_RESTART_THRESHOLD};
