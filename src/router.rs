//! 请求路由
//!
//! `process_input` 是整个编排层的入口，对调用方是全函数：总是返回字符串，从不向外抛错或 panic。
//! 复合指令交给流水线，其余请求分类后按路由表分派到能力处理器；每个路由自己兜住失败并返回对应的道歉语，
//! 路由之外的任何失败（包括 panic）由最外层改用模型补全或静态道歉语回复。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::capability::Capabilities;
use crate::config::{AppConfig, SamplingParams};
use crate::core::{
    panic_message, AgentKind, InferenceError, OrchestratorError, RecoveryAction, RecoveryEngine,
    FALLBACK_SYSTEM_PROMPT, STATIC_APOLOGY,
};
use crate::health::HealthMonitor;
use crate::intent::{keywords, Intent, IntentClassifier};
use crate::llm::InferenceService;
use crate::memory::ConversationStore;
use crate::workflow::TaskPipeline;

/// 模型未加载时通用问答的回复
pub const NO_MODEL_REPLY: &str =
    "I can't answer general questions right now because the on-device model isn't loaded.";

const QUERY_SYSTEM_PROMPT: &str = "You are a helpful on-device assistant. Use the previous conversation \
when it is relevant and answer the request concisely.";

/// 路由表的出口（同一个意图可能对应两种用户动作）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    SendMessage,
    /// 控制当前播放
    MediaControl,
    /// 开始新的播放
    PlayMedia,
    QueueMedia,
    CreateReminder,
    ListReminders,
    SummarizeThread,
    /// 完整每日简报
    Briefing,
    GeneralQuery,
}

impl Route {
    /// 二次关键词判断后的路由
    pub fn select(intent: &Intent, text: &str) -> Route {
        match intent {
            Intent::SendMessage { .. } => Route::SendMessage,
            Intent::PlayMedia { .. } => {
                if keywords::is_media_control(text) {
                    Route::MediaControl
                } else {
                    Route::PlayMedia
                }
            }
            Intent::QueueMedia { .. } => Route::QueueMedia,
            Intent::SetReminder { .. } => {
                if keywords::is_reminder_query(text) {
                    Route::ListReminders
                } else {
                    Route::CreateReminder
                }
            }
            Intent::Summarize { .. } => {
                if keywords::is_briefing(text) {
                    Route::Briefing
                } else {
                    Route::SummarizeThread
                }
            }
            Intent::GeneralQuery { .. } => Route::GeneralQuery,
        }
    }

    pub fn agent_kind(&self) -> AgentKind {
        match self {
            Route::SendMessage | Route::SummarizeThread => AgentKind::Messaging,
            Route::MediaControl | Route::PlayMedia | Route::QueueMedia => AgentKind::Media,
            Route::CreateReminder | Route::ListReminders => AgentKind::Reminder,
            Route::Briefing => AgentKind::Briefing,
            Route::GeneralQuery => AgentKind::General,
        }
    }
}

pub struct Router {
    classifier: IntentClassifier,
    pipeline: Arc<TaskPipeline>,
    conversation: Arc<ConversationStore>,
    capabilities: Capabilities,
    inference: Arc<dyn InferenceService>,
    recovery: RecoveryEngine,
    query_params: SamplingParams,
    fallback_params: SamplingParams,
    context_turns: usize,
    health: Option<Arc<HealthMonitor>>,
}

impl Router {
    pub fn new(
        inference: Arc<dyn InferenceService>,
        capabilities: Capabilities,
        conversation: Arc<ConversationStore>,
        pipeline: Arc<TaskPipeline>,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(inference.clone(), conversation.clone()),
            pipeline,
            conversation,
            capabilities,
            inference,
            recovery: RecoveryEngine::new(),
            query_params: SamplingParams::new(512, 0.7),
            fallback_params: SamplingParams::new(256, 0.7),
            context_turns: 10,
            health: None,
        }
    }

    /// 按配置设置采样参数与上下文轮数
    pub fn from_config(
        inference: Arc<dyn InferenceService>,
        capabilities: Capabilities,
        conversation: Arc<ConversationStore>,
        pipeline: Arc<TaskPipeline>,
        cfg: &AppConfig,
    ) -> Self {
        let mut router = Self::new(inference, capabilities, conversation, pipeline);
        router.classifier = router
            .classifier
            .with_params(cfg.inference.classify)
            .with_context_turns(cfg.conversation.classification_context_turns);
        router.query_params = cfg.inference.query;
        router.fallback_params = cfg.inference.fallback;
        router.context_turns = cfg.conversation.context_turns;
        router
    }

    /// 路由结果上报健康监控
    pub fn with_health(mut self, health: Arc<HealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// 处理一条用户输入
    pub async fn process_input(&self, text: &str) -> String {
        self.conversation.add_user_turn(text).await;

        let outcome = AssertUnwindSafe(self.respond(text))
            .catch_unwind()
            .await
            .map_err(|panic| OrchestratorError::Panicked(panic_message(&*panic)));

        let (reply, agent_kind) = match outcome {
            Ok(answer) => answer,
            Err(e) => (self.last_resort(text, &e).await, AgentKind::Router),
        };

        self.conversation
            .add_assistant_turn(reply.clone(), agent_kind)
            .await;
        reply
    }

    async fn respond(&self, text: &str) -> (String, AgentKind) {
        if self.pipeline.is_compound_command(text) {
            let steps = self.pipeline.decompose(text).await;
            if !steps.is_empty() {
                tracing::info!(steps = steps.len(), "handling compound command");
                let result = self.pipeline.execute_pipeline(steps).await;
                return (result.summary, AgentKind::Pipeline);
            }
            tracing::debug!("compound command produced no steps, routing as single intent");
        }

        let intent = self.classifier.classify_intent(text).await;
        let route = Route::select(&intent, text);
        (self.dispatch(route, intent, text).await, route.agent_kind())
    }

    /// 把意图分派到能力处理器；处理器失败时返回该路由的道歉语
    pub async fn route_intent(&self, intent: Intent, original_text: &str) -> String {
        let route = Route::select(&intent, original_text);
        self.dispatch(route, intent, original_text).await
    }

    async fn dispatch(&self, route: Route, intent: Intent, text: &str) -> String {
        tracing::info!(intent = intent.name(), route = ?route, "routing request");
        let kind = route.agent_kind();

        match self.call_handler(route, intent, text).await {
            Ok(reply) => {
                if let Some(health) = &self.health {
                    health.record_heartbeat(kind);
                }
                reply
            }
            Err(e) => {
                tracing::warn!(route = ?route, error = %e, "route handler failed");
                if let Some(health) = &self.health {
                    health.record_error(kind, &e.to_string());
                }
                self.recovery.apology(route).to_string()
            }
        }
    }

    async fn call_handler(
        &self,
        route: Route,
        intent: Intent,
        text: &str,
    ) -> Result<String, OrchestratorError> {
        let caps = &self.capabilities;
        let reply = match intent {
            Intent::SendMessage {
                recipient,
                content,
                source,
            } => {
                if recipient.is_empty() {
                    caps.messaging.handle(text).await?
                } else {
                    caps.messaging
                        .send_message(&recipient, &content, &source)
                        .await?
                }
            }
            Intent::PlayMedia { query, source } => {
                if route == Route::MediaControl {
                    caps.media.control(text).await?
                } else {
                    caps.media.play(&query, source.as_deref()).await?
                }
            }
            Intent::QueueMedia { query, source } => caps.media.queue(&query, source.as_deref()).await?,
            Intent::SetReminder {
                description,
                time_expression,
            } => {
                if route == Route::ListReminders {
                    caps.reminder.list(text).await?
                } else {
                    caps.reminder.create(&description, &time_expression).await?
                }
            }
            Intent::Summarize { context } => {
                if route == Route::Briefing {
                    caps.briefing.briefing().await?
                } else {
                    caps.messaging.summarize(&context).await?
                }
            }
            Intent::GeneralQuery { query } => self.general_query(&query).await?,
        };
        Ok(reply)
    }

    async fn general_query(&self, query: &str) -> Result<String, OrchestratorError> {
        if !self.inference.is_loaded() {
            return Ok(NO_MODEL_REPLY.to_string());
        }

        let context = self
            .conversation
            .build_context_prompt_before(query, self.context_turns)
            .await;
        let prompt = if context.is_empty() {
            query.to_string()
        } else {
            format!("{}\n\nRequest: {}", context, query)
        };
        let answer = self
            .inference
            .generate(
                &prompt,
                QUERY_SYSTEM_PROMPT,
                self.query_params.max_tokens,
                self.query_params.temperature,
            )
            .await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(InferenceError::EmptyResponse.into());
        }
        Ok(answer.to_string())
    }

    /// 最后一道防线：模型补全，否则静态道歉语
    async fn last_resort(&self, text: &str, err: &OrchestratorError) -> String {
        match self.recovery.handle(err, self.inference.is_loaded()) {
            RecoveryAction::StaticApology => STATIC_APOLOGY.to_string(),
            RecoveryAction::ModelCompletion => {
                let completion = AssertUnwindSafe(self.inference.generate(
                    text,
                    FALLBACK_SYSTEM_PROMPT,
                    self.fallback_params.max_tokens,
                    self.fallback_params.temperature,
                ))
                .catch_unwind()
                .await;
                match completion {
                    Ok(Ok(answer)) if !answer.trim().is_empty() => answer.trim().to_string(),
                    _ => STATIC_APOLOGY.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::MockCapabilities;
    use crate::health::HealthConfig;
    use crate::llm::MockInference;
    use crate::core::StoreError;
    use crate::memory::{ConversationTurn, InMemoryTurnStore, Role, TurnStore};
    use async_trait::async_trait;

    struct Fixture {
        router: Router,
        caps: Arc<MockCapabilities>,
        conversation: Arc<ConversationStore>,
    }

    fn fixture(inference: MockInference) -> Fixture {
        fixture_with_store(inference, Arc::new(InMemoryTurnStore::new()))
    }

    fn fixture_with_store(inference: MockInference, store: Arc<dyn TurnStore>) -> Fixture {
        let inference: Arc<dyn InferenceService> = Arc::new(inference);
        let caps = Arc::new(MockCapabilities::new());
        let capabilities = Capabilities::uniform(caps.clone());
        let conversation = Arc::new(ConversationStore::new(store));
        let pipeline = Arc::new(TaskPipeline::new(inference.clone(), capabilities.clone()));
        let router = Router::new(inference, capabilities, conversation.clone(), pipeline);
        Fixture {
            router,
            caps,
            conversation,
        }
    }

    #[test]
    fn test_route_selection_rechecks_keywords() {
        let play = Intent::PlayMedia {
            query: "x".to_string(),
            source: None,
        };
        assert_eq!(Route::select(&play, "pause the music"), Route::MediaControl);
        assert_eq!(Route::select(&play, "play some jazz"), Route::PlayMedia);

        let reminder = Intent::SetReminder {
            description: "x".to_string(),
            time_expression: String::new(),
        };
        assert_eq!(Route::select(&reminder, "show my reminders"), Route::ListReminders);
        assert_eq!(Route::select(&reminder, "remind me to stretch"), Route::CreateReminder);

        let summarize = Intent::Summarize {
            context: "x".to_string(),
        };
        assert_eq!(Route::select(&summarize, "catch me up"), Route::Briefing);
        assert_eq!(Route::select(&summarize, "summarize my chat with Sam"), Route::SummarizeThread);
    }

    #[tokio::test]
    async fn test_process_input_records_both_turns() {
        let f = fixture(MockInference::unloaded());

        let reply = f.router.process_input("play some jazz").await;
        assert_eq!(reply, "Now playing some jazz");

        let turns = f.conversation.get_recent_context(10).await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].content, "play some jazz");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].agent_kind, AgentKind::Media);
    }

    #[tokio::test]
    async fn test_handler_failure_returns_route_apology() {
        let f = fixture(MockInference::unloaded());
        f.caps.fail(AgentKind::Reminder);

        let reply = f.router.process_input("remind me to call mom at 5pm").await;
        assert_eq!(reply, RecoveryEngine::new().apology(Route::CreateReminder));
    }

    #[tokio::test]
    async fn test_panic_falls_back_to_static_apology() {
        let f = fixture(MockInference::unloaded());
        f.caps.panic_on(AgentKind::Media);

        let reply = f.router.process_input("play some jazz").await;
        assert_eq!(reply, STATIC_APOLOGY);

        let turns = f.conversation.get_recent_context(10).await;
        assert_eq!(turns.last().map(|t| t.content.as_str()), Some(STATIC_APOLOGY));
    }

    #[tokio::test]
    async fn test_panic_falls_back_to_model_completion() {
        // 第一条回复用于分类，第二条用于兜底补全
        let f = fixture(MockInference::with_responses(["MEDIA", "Here is some jazz for you."]));
        f.caps.panic_on(AgentKind::Media);

        let reply = f.router.process_input("play some jazz").await;
        assert_eq!(reply, "Here is some jazz for you.");
    }

    #[tokio::test]
    async fn test_general_query_without_model() {
        let f = fixture(MockInference::unloaded());
        let reply = f.router.process_input("how tall is everest").await;
        assert_eq!(reply, NO_MODEL_REPLY);
    }

    #[tokio::test]
    async fn test_tell_me_is_a_question_not_a_message() {
        let f = fixture(MockInference::unloaded());
        let reply = f.router.process_input("tell me a joke").await;
        assert_eq!(reply, NO_MODEL_REPLY);
        assert!(f.caps.calls().is_empty());
    }

    #[tokio::test]
    async fn test_summary_forwarded_to_named_recipient() {
        let f = fixture(MockInference::unloaded());
        let reply = f
            .router
            .process_input("summarize my chat with Sam, then text it to Alex")
            .await;

        assert_eq!(
            f.caps.calls(),
            vec![
                "messaging.summarize(summarize my chat with Sam)",
                "messaging.send_message(Alex, Summary of: summarize my chat with Sam, sms)",
            ]
        );
        assert!(reply.contains("Done: Message sent to Alex"));
    }

    #[tokio::test]
    async fn test_briefing_sent_to_recipient() {
        let f = fixture(MockInference::unloaded());
        let reply = f.router.process_input("send the daily briefing to mom").await;

        assert_eq!(
            f.caps.calls(),
            vec![
                "briefing.briefing()",
                "messaging.send_message(mom, Good morning! 3 unread messages and 2 reminders today., sms)",
            ]
        );
        assert!(reply.starts_with("Completed 2 of 2 steps:"));
    }

    struct PanickingStore;

    #[async_trait]
    impl TurnStore for PanickingStore {
        async fn append(&self, _turn: ConversationTurn) -> Result<(), StoreError> {
            panic!("append exploded")
        }
        async fn recent(&self, _limit: usize) -> Result<Vec<ConversationTurn>, StoreError> {
            panic!("recent exploded")
        }
        async fn delete_older_than(&self, _cutoff_ms: i64) -> Result<usize, StoreError> {
            panic!("delete exploded")
        }
        async fn clear(&self) -> Result<(), StoreError> {
            panic!("clear exploded")
        }
    }

    #[tokio::test]
    async fn test_panicking_store_does_not_escape() {
        let f = fixture_with_store(MockInference::unloaded(), Arc::new(PanickingStore));
        let router = Arc::new(f.router);

        let task = {
            let router = router.clone();
            tokio::spawn(async move { router.process_input("play jazz").await })
        };
        let reply = task.await.unwrap();
        assert_eq!(reply, "Now playing jazz");
    }

    #[tokio::test]
    async fn test_general_query_with_model_uses_context() {
        let f = fixture(MockInference::with_responses(["GENERAL", "About 8,849 metres."]));
        let reply = f.router.process_input("how tall is everest").await;
        assert_eq!(reply, "About 8,849 metres.");
    }

    #[tokio::test]
    async fn test_compound_command_uses_pipeline_summary() {
        let f = fixture(MockInference::unloaded());
        let reply = f
            .router
            .process_input("play jazz and then remind me to call mom")
            .await;

        assert!(reply.starts_with("Completed 2 of 2 steps:"));
        let turns = f.conversation.get_recent_context(10).await;
        assert_eq!(turns[1].agent_kind, AgentKind::Pipeline);
    }

    #[tokio::test]
    async fn test_route_intent_with_empty_recipient_uses_handle() {
        let f = fixture(MockInference::unloaded());
        let intent = Intent::SendMessage {
            recipient: String::new(),
            content: "check my inbox".to_string(),
            source: "sms".to_string(),
        };
        let reply = f.router.route_intent(intent, "check my inbox").await;
        assert_eq!(reply, "Messages for: check my inbox");
    }

    #[tokio::test]
    async fn test_health_wiring() {
        let f = fixture(MockInference::unloaded());
        let health = Arc::new(HealthMonitor::new(HealthConfig::default()));
        let router = f.router.with_health(health.clone());
        f.caps.fail(AgentKind::Briefing);

        router.process_input("play some jazz").await;
        router.process_input("give me my briefing").await;

        assert!(health.status(AgentKind::Media).unwrap().is_healthy);
        assert_eq!(health.status(AgentKind::Briefing).unwrap().error_count, 1);
    }
}
