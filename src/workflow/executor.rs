//! 步骤执行器
//!
//! 按 (agent_kind, action) 把步骤分派到能力处理器；通用步骤交给推理服务。

use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::Capabilities;
use crate::config::SamplingParams;
use crate::core::{AgentKind, InferenceError, OrchestratorError, FALLBACK_SYSTEM_PROMPT};
use crate::intent::keywords::{self, MessageFields};
use crate::llm::InferenceService;
use crate::workflow::types::{PipelineStep, PREV_OUTPUT_MARKER};

/// 流水线步骤执行器 trait
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// 执行单个步骤；`input` 为已注入上游输出的自然语言输入
    async fn execute(&self, step: &PipelineStep, input: &str) -> Result<String, OrchestratorError>;
}

/// 默认执行器：能力处理器 + 推理服务
pub struct CapabilityExecutor {
    capabilities: Capabilities,
    inference: Arc<dyn InferenceService>,
    params: SamplingParams,
}

impl CapabilityExecutor {
    pub fn new(capabilities: Capabilities, inference: Arc<dyn InferenceService>) -> Self {
        Self {
            capabilities,
            inference,
            params: SamplingParams::new(512, 0.7),
        }
    }

    pub fn with_params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }

    async fn messaging(&self, step: &PipelineStep, input: &str) -> Result<String, OrchestratorError> {
        let messaging = &self.capabilities.messaging;
        let out = match step.action.as_str() {
            "send" => {
                let fields = message_fields(step, input);
                if fields.recipient.is_empty() {
                    messaging.handle(input).await?
                } else {
                    messaging
                        .send_message(&fields.recipient, &fields.content, &fields.source)
                        .await?
                }
            }
            "summarize" => messaging.summarize(input).await?,
            _ => messaging.handle(input).await?,
        };
        Ok(out)
    }

    async fn media(&self, action: &str, input: &str) -> Result<String, OrchestratorError> {
        let media = &self.capabilities.media;
        let out = match action {
            "play" => {
                let (query, source) = keywords::extract_media(input);
                media.play(&query, source.as_deref()).await?
            }
            "queue" => {
                let (query, source) = keywords::extract_media(input);
                media.queue(&query, source.as_deref()).await?
            }
            "control" | "pause" | "resume" | "skip" | "stop" => media.control(input).await?,
            _ => media.handle(input).await?,
        };
        Ok(out)
    }

    async fn reminder(&self, action: &str, input: &str) -> Result<String, OrchestratorError> {
        let reminder = &self.capabilities.reminder;
        let out = match action {
            "create" | "set" => {
                let (description, time_expression) = keywords::extract_reminder(input);
                reminder.create(&description, &time_expression).await?
            }
            "list" | "query" => reminder.list(input).await?,
            _ => reminder.handle(input).await?,
        };
        Ok(out)
    }

    async fn general(&self, input: &str) -> Result<String, OrchestratorError> {
        if !self.inference.is_loaded() {
            return Err(InferenceError::NotLoaded.into());
        }
        let answer = self
            .inference
            .generate(
                input,
                FALLBACK_SYSTEM_PROMPT,
                self.params.max_tokens,
                self.params.temperature,
            )
            .await?;
        if answer.trim().is_empty() {
            return Err(InferenceError::EmptyResponse.into());
        }
        Ok(answer.trim().to_string())
    }
}

/// 发送步骤的字段
///
/// 依赖上游且输入中没有 PREV_OUTPUT 标记时，收件人取自步骤原始输入，
/// 内容为空或只是指代（"it"、"the summary"）时换成上游输出。
fn message_fields(step: &PipelineStep, input: &str) -> MessageFields {
    let upstream = step
        .depends_on_step
        .and(step.previous_output())
        .filter(|prev| !prev.is_empty());
    match upstream {
        Some(prev) if !step.input().contains(PREV_OUTPUT_MARKER) => {
            let mut fields = keywords::extract_message(step.input());
            if fields.content.is_empty() || keywords::is_placeholder_content(&fields.content) {
                fields.content = prev.to_string();
            }
            fields
        }
        _ => keywords::extract_message(input),
    }
}

#[async_trait]
impl StepExecutor for CapabilityExecutor {
    async fn execute(&self, step: &PipelineStep, input: &str) -> Result<String, OrchestratorError> {
        let action = step.action.as_str();
        match step.agent_kind {
            AgentKind::Messaging => self.messaging(step, input).await,
            AgentKind::Media => self.media(action, input).await,
            AgentKind::Reminder => self.reminder(action, input).await,
            AgentKind::Briefing => {
                if action == "briefing" {
                    Ok(self.capabilities.briefing.briefing().await?)
                } else {
                    Ok(self.capabilities.briefing.handle(input).await?)
                }
            }
            AgentKind::General | AgentKind::Router | AgentKind::Pipeline => self.general(input).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::MockCapabilities;
    use crate::llm::MockInference;
    use crate::workflow::types::PREVIOUS_OUTPUT_KEY;

    fn executor(caps: Arc<MockCapabilities>, inference: MockInference) -> CapabilityExecutor {
        CapabilityExecutor::new(Capabilities::uniform(caps), Arc::new(inference))
    }

    #[tokio::test]
    async fn test_dispatch_by_kind_and_action() {
        let caps = Arc::new(MockCapabilities::new());
        let exec = executor(caps.clone(), MockInference::unloaded());

        let step = PipelineStep::new(AgentKind::Media, "play", "play jazz on spotify");
        let out = exec.execute(&step, step.input()).await.unwrap();
        assert_eq!(out, "Now playing jazz");

        let step = PipelineStep::new(AgentKind::Reminder, "create", "remind me to call mom at 5pm");
        let out = exec.execute(&step, step.input()).await.unwrap();
        assert_eq!(out, "Reminder set: call mom at 5pm");

        let calls = caps.calls();
        assert!(calls[0].starts_with("media.play(jazz"));
    }

    #[tokio::test]
    async fn test_send_without_recipient_uses_handle() {
        let caps = Arc::new(MockCapabilities::new());
        let exec = executor(caps.clone(), MockInference::unloaded());

        let step = PipelineStep::new(AgentKind::Messaging, "send", "read my texts");
        let out = exec.execute(&step, step.input()).await.unwrap();
        assert_eq!(out, "Messages for: read my texts");
    }

    fn dependent_step(input: &str, previous: &str) -> PipelineStep {
        let mut step = PipelineStep::new(AgentKind::Messaging, "send", input);
        step.depends_on_step = Some(0);
        step.inputs
            .insert(PREVIOUS_OUTPUT_KEY.to_string(), previous.to_string());
        step
    }

    #[tokio::test]
    async fn test_dependent_send_forwards_previous_output() {
        let caps = Arc::new(MockCapabilities::new());
        let exec = executor(caps.clone(), MockInference::unloaded());

        let step = dependent_step("text it to Alex", "Summary of: chat with Sam");
        let out = exec
            .execute(&step, "text it to Alex: Summary of: chat with Sam")
            .await
            .unwrap();
        assert_eq!(out, "Message sent to Alex: Summary of: chat with Sam");
        assert_eq!(
            caps.calls(),
            vec!["messaging.send_message(Alex, Summary of: chat with Sam, sms)"]
        );
    }

    #[tokio::test]
    async fn test_dependent_send_keeps_explicit_content() {
        let caps = Arc::new(MockCapabilities::new());
        let exec = executor(caps.clone(), MockInference::unloaded());

        let step = dependent_step("tell Sam that I'm on my way", "Now playing jazz");
        exec.execute(&step, "tell Sam that I'm on my way: Now playing jazz")
            .await
            .unwrap();
        assert_eq!(
            caps.calls(),
            vec!["messaging.send_message(Sam, I'm on my way, sms)"]
        );
    }

    #[tokio::test]
    async fn test_marker_input_is_resolved_in_place() {
        let caps = Arc::new(MockCapabilities::new());
        let exec = executor(caps.clone(), MockInference::unloaded());

        let step = dependent_step("text mom PREV_OUTPUT", "Good morning!");
        exec.execute(&step, "text mom Good morning!").await.unwrap();
        assert_eq!(
            caps.calls(),
            vec!["messaging.send_message(mom, Good morning, sms)"]
        );
    }

    #[tokio::test]
    async fn test_general_step_requires_model() {
        let caps = Arc::new(MockCapabilities::new());
        let exec = executor(caps, MockInference::unloaded());

        let step = PipelineStep::new(AgentKind::General, "ask", "why is the sky blue");
        let err = exec.execute(&step, step.input()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Inference(InferenceError::NotLoaded)));
    }

    #[tokio::test]
    async fn test_capability_failure_is_error() {
        let caps = Arc::new(MockCapabilities::new());
        caps.fail(AgentKind::Briefing);
        let exec = executor(caps, MockInference::unloaded());

        let step = PipelineStep::new(AgentKind::Briefing, "briefing", "brief me");
        assert!(exec.execute(&step, step.input()).await.is_err());
    }
}
