//! 组合根
//!
//! 供宿主应用调用：create_agent_components 用显式传入的服务句柄组装
//! Router / TaskPipeline / ConversationStore / EventBus / HealthMonitor，
//! process_message 对单条用户输入返回最终回复。

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capability::Capabilities;
use crate::config::AppConfig;
use crate::core::AgentKind;
use crate::events::EventBus;
use crate::health::{HealthConfig, HealthMonitor};
use crate::llm::InferenceService;
use crate::memory::{ConversationStore, InMemoryTurnStore, TurnStore};
use crate::router::Router;
use crate::workflow::TaskPipeline;

/// 预构建的编排组件，可在多个调用点共享
pub struct AgentComponents {
    pub router: Router,
    pub pipeline: Arc<TaskPipeline>,
    pub conversation: Arc<ConversationStore>,
    pub events: Arc<EventBus>,
    pub health: Arc<HealthMonitor>,
}

/// 按配置组装全部组件；能力处理器与推理服务由宿主提供
pub fn create_agent_components(
    cfg: &AppConfig,
    inference: Arc<dyn InferenceService>,
    capabilities: Capabilities,
    turn_store: Arc<dyn TurnStore>,
) -> AgentComponents {
    let conversation = Arc::new(
        ConversationStore::new(turn_store).with_retention_days(cfg.conversation.retention_days),
    );
    let events = Arc::new(EventBus::new(
        cfg.events.history_capacity,
        cfg.events.channel_capacity,
    ));

    let health = Arc::new(HealthMonitor::new(HealthConfig::from(&cfg.health)));
    for kind in [
        AgentKind::Messaging,
        AgentKind::Media,
        AgentKind::Reminder,
        AgentKind::Briefing,
        AgentKind::General,
    ] {
        health.register(kind);
    }

    let pipeline = Arc::new(
        TaskPipeline::from_config(inference.clone(), capabilities.clone(), cfg)
            .with_health(health.clone()),
    );
    let router = Router::from_config(
        inference,
        capabilities,
        conversation.clone(),
        pipeline.clone(),
        cfg,
    )
    .with_health(health.clone());

    tracing::info!(
        history_capacity = cfg.events.history_capacity,
        restart_threshold = cfg.health.restart_threshold,
        "agent components ready"
    );

    AgentComponents {
        router,
        pipeline,
        conversation,
        events,
        health,
    }
}

/// 选择对话存储：启用 async-sqlite 且配置了路径时用 SQLite，否则用内存
pub async fn create_turn_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn TurnStore>> {
    match &cfg.storage.database_path {
        Some(path) => open_database_store(path).await,
        None => Ok(Arc::new(InMemoryTurnStore::new())),
    }
}

#[cfg(feature = "async-sqlite")]
async fn open_database_store(path: &std::path::Path) -> anyhow::Result<Arc<dyn TurnStore>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = crate::memory::SqliteTurnStore::new(path).await?;
    tracing::info!(path = %path.display(), "using sqlite conversation store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "async-sqlite"))]
async fn open_database_store(path: &std::path::Path) -> anyhow::Result<Arc<dyn TurnStore>> {
    tracing::warn!(
        path = %path.display(),
        "database_path set but async-sqlite feature is disabled, using memory store"
    );
    Ok(Arc::new(InMemoryTurnStore::new()))
}

/// 启动周期健康检查，直到 token 取消
pub fn spawn_health_check(
    components: &AgentComponents,
    cfg: &AppConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let interval = std::time::Duration::from_secs(cfg.health.check_interval_secs.max(1));
    components.health.spawn_periodic_check(interval, cancel)
}

/// 启动对话记录的周期剪枝（按 retention_days），直到 token 取消
pub fn spawn_conversation_pruning(
    components: &AgentComponents,
    cfg: &AppConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let interval = std::time::Duration::from_secs(cfg.conversation.prune_interval_secs.max(1));
    components.conversation.spawn_periodic_prune(interval, cancel)
}

/// 处理单条用户消息，总是返回回复文本
pub async fn process_message(components: &AgentComponents, user_input: &str) -> String {
    components.router.process_input(user_input).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::MockCapabilities;
    use crate::llm::MockInference;

    #[tokio::test]
    async fn test_components_share_conversation() {
        let cfg = AppConfig::default();
        let store = create_turn_store(&cfg).await.unwrap();
        let components = create_agent_components(
            &cfg,
            Arc::new(MockInference::unloaded()),
            Capabilities::uniform(Arc::new(MockCapabilities::new())),
            store,
        );

        let reply = process_message(&components, "what's playing").await;
        assert_eq!(reply, "Playback updated: what's playing");
        assert_eq!(components.conversation.get_recent_context(5).await.len(), 2);
        assert_eq!(components.health.all_statuses().len(), 5);
        assert!(components.health.is_system_healthy());
    }

    #[tokio::test]
    async fn test_health_check_task_stops() {
        let cfg = AppConfig::default();
        let components = create_agent_components(
            &cfg,
            Arc::new(MockInference::unloaded()),
            Capabilities::uniform(Arc::new(MockCapabilities::new())),
            Arc::new(InMemoryTurnStore::new()),
        );
        let cancel = CancellationToken::new();
        let handle = spawn_health_check(&components, &cfg, cancel.clone());
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_pruning_task_removes_expired_turns() {
        let cfg = AppConfig::default();
        let store = Arc::new(InMemoryTurnStore::new());
        let expired = crate::memory::ConversationTurn {
            role: crate::memory::Role::User,
            content: "last month".to_string(),
            agent_kind: AgentKind::Router,
            timestamp_ms: crate::core::now_ms() - 30 * 24 * 60 * 60 * 1000,
        };
        store.append(expired).await.unwrap();
        let components = create_agent_components(
            &cfg,
            Arc::new(MockInference::unloaded()),
            Capabilities::uniform(Arc::new(MockCapabilities::new())),
            store.clone(),
        );
        process_message(&components, "play some jazz").await;

        // 首个 tick 立即触发
        let cancel = CancellationToken::new();
        let handle = spawn_conversation_pruning(&components, &cfg, cancel.clone());
        let drained = tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while store.len().await > 2 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(drained.is_ok());
        let turns = components.conversation.get_recent_context(10).await;
        assert!(turns.iter().all(|t| t.content != "last month"));
    }
}
