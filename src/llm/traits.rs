//! 推理服务抽象
//!
//! 端侧模型由外部协作方加载与运行；编排层只依赖 generate 与 is_loaded。
//! 重试由实现方负责，本层每个调用点都自行捕获错误并降级。

use async_trait::async_trait;

use crate::core::InferenceError;

/// 推理服务：单轮补全 + 加载状态
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// 非流式补全
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, InferenceError>;

    /// 模型是否已加载；未加载时调用方走关键词 / 模板路径
    fn is_loaded(&self) -> bool;
}

/// 无模型：始终未加载
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInference;

#[async_trait]
impl InferenceService for NoopInference {
    async fn generate(
        &self,
        _prompt: &str,
        _system_prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String, InferenceError> {
        Err(InferenceError::NotLoaded)
    }

    fn is_loaded(&self) -> bool {
        false
    }
}
