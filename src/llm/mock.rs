//! Mock 推理服务（用于测试，无需模型）
//!
//! 按顺序返回预置的回复；队列耗尽后回显提示词。记录每次调用，便于断言提示内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::InferenceError;
use crate::llm::InferenceService;

/// 单次 generate 调用记录
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub prompt: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Mock 推理服务
#[derive(Debug)]
pub struct MockInference {
    loaded: bool,
    fail_all: bool,
    responses: Mutex<VecDeque<Result<String, InferenceError>>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockInference {
    /// 已加载，回显提示词
    pub fn loaded() -> Self {
        Self {
            loaded: true,
            fail_all: false,
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 未加载：is_loaded 为 false，generate 返回 NotLoaded
    pub fn unloaded() -> Self {
        Self {
            loaded: false,
            ..Self::loaded()
        }
    }

    /// 已加载但每次调用都失败
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::loaded()
        }
    }

    /// 已加载，按顺序返回给定回复
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::loaded();
        for r in responses {
            mock.push_response(Ok(r.into()));
        }
        mock
    }

    pub fn push_response(&self, response: Result<String, InferenceError>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    /// 至今为止的全部调用
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl InferenceService for MockInference {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, InferenceError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(MockCall {
                prompt: prompt.to_string(),
                system_prompt: system_prompt.to_string(),
                max_tokens,
                temperature,
            });

        if !self.loaded {
            return Err(InferenceError::NotLoaded);
        }
        if self.fail_all {
            return Err(InferenceError::Generation("mock failure".to_string()));
        }

        let next = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(response) => response,
            None => Ok(format!("Echo from Mock: {}", prompt)),
        }
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }
}
