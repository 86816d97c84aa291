//! 编排层错误类型
//!
//! 协作方（推理服务、能力处理器、持久化）各自一类错误；OrchestratorError 汇总请求路径上的错误，
//! 仅在 Router::process_input 的最外层兜底时被消费，从不向调用方抛出。
//! 持久化错误在 ConversationStore 内部吞掉，不进入请求路径。

use std::any::Any;

use thiserror::Error;

/// 推理服务错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("Model not loaded")]
    NotLoaded,

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Model returned an empty response")]
    EmptyResponse,
}

/// 能力处理器（消息 / 媒体 / 提醒 / 简报）错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Capability failed: {0}")]
    Failed(String),

    #[error("Capability unavailable: {0}")]
    Unavailable(String),
}

/// 对话持久化错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "async-sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// 请求路径上可能出现的全部错误
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    /// 协作方 panic，被 catch_unwind 捕获后转换
    #[error("Request handler panicked: {0}")]
    Panicked(String),
}

/// catch_unwind 捕获到的 panic 负载 → 文本
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
