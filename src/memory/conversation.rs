//! 对话上下文：只追加的对话轮次记录
//!
//! 所有读写失败（包括存储协作方 panic）都被吞掉并降级为空结果：上下文只是增强，不是正确性前提。

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::{panic_message, AgentKind, Clock, StoreError, SystemClock};
use crate::memory::TurnStore;

/// 上下文提示的固定标题行
pub const CONTEXT_HEADER: &str = "Previous conversation:";

/// 默认保留 7 天
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// 上下文提示中的显示名
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::System,
        }
    }
}

/// 单条对话轮次（创建后不可变）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub agent_kind: AgentKind,
    pub timestamp_ms: i64,
}

/// 对话记录：包装持久化协作方，负责排序、渲染与按时间剪枝
pub struct ConversationStore {
    store: Arc<dyn TurnStore>,
    clock: Arc<dyn Clock>,
    retention_ms: i64,
}

impl ConversationStore {
    pub fn new(store: Arc<dyn TurnStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            retention_ms: DEFAULT_RETENTION_DAYS as i64 * DAY_MS,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_ms = days as i64 * DAY_MS;
        self
    }

    /// 调用持久化协作方；错误与 panic 都只记日志，返回 None
    async fn guarded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Option<T> {
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                tracing::warn!(op, error = %e, "conversation store call failed");
                None
            }
            Err(panic) => {
                tracing::error!(op, panic = %panic_message(&*panic), "conversation store panicked");
                None
            }
        }
    }

    pub async fn add_turn(&self, role: Role, content: impl Into<String>, agent_kind: AgentKind) {
        let turn = ConversationTurn {
            role,
            content: content.into(),
            agent_kind,
            timestamp_ms: self.clock.now_ms(),
        };
        self.guarded("append", self.store.append(turn)).await;
    }

    pub async fn add_user_turn(&self, content: impl Into<String>) {
        self.add_turn(Role::User, content, AgentKind::Router).await;
    }

    pub async fn add_assistant_turn(&self, content: impl Into<String>, agent_kind: AgentKind) {
        self.add_turn(Role::Assistant, content, agent_kind).await;
    }

    /// 最近 limit 条轮次，按时间正序（最旧在前）
    ///
    /// 存储按最新优先返回，这里反转后再按时间戳稳定排序。
    pub async fn get_recent_context(&self, limit: usize) -> Vec<ConversationTurn> {
        if limit == 0 {
            return Vec::new();
        }
        let Some(mut turns) = self.guarded("recent", self.store.recent(limit)).await else {
            return Vec::new();
        };
        turns.reverse();
        turns.sort_by_key(|t| t.timestamp_ms);
        turns
    }

    /// 渲染为 "Role: content" 行；无历史时返回空串（调用方据此省略上下文）
    pub async fn build_context_prompt(&self, limit: usize) -> String {
        render_context(&self.get_recent_context(limit).await)
    }

    /// 同 build_context_prompt，但不计入刚记录的当前请求
    ///
    /// Router 先记录用户轮次再分类 / 问答，当前请求会另行放在提示末尾。
    pub async fn build_context_prompt_before(&self, current: &str, limit: usize) -> String {
        if limit == 0 {
            return String::new();
        }
        let mut turns = self.get_recent_context(limit + 1).await;
        if turns
            .last()
            .is_some_and(|t| t.role == Role::User && t.content == current)
        {
            turns.pop();
        }
        let skip = turns.len().saturating_sub(limit);
        render_context(&turns[skip..])
    }

    /// 删除超出保留窗口的轮次，返回删除数量（失败时为 0）
    pub async fn prune_old_turns(&self) -> usize {
        let cutoff = self.clock.now_ms() - self.retention_ms;
        let removed = self
            .guarded("delete_older_than", self.store.delete_older_than(cutoff))
            .await
            .unwrap_or(0);
        if removed > 0 {
            tracing::debug!(removed, "pruned old conversation turns");
        }
        removed
    }

    pub async fn clear(&self) {
        self.guarded("clear", self.store.clear()).await;
    }

    /// 启动后台周期剪枝，直到 token 被取消
    pub fn spawn_periodic_prune(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let conversation = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("conversation prune loop stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        conversation.prune_old_turns().await;
                    }
                }
            }
        })
    }
}

fn render_context(turns: &[ConversationTurn]) -> String {
    if turns.is_empty() {
        return String::new();
    }
    let mut prompt = String::from(CONTEXT_HEADER);
    for turn in turns {
        prompt.push('\n');
        prompt.push_str(turn.role.label());
        prompt.push_str(": ");
        prompt.push_str(&turn.content);
    }
    prompt
}
