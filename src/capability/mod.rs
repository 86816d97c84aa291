//! 能力处理器抽象
//!
//! 消息、媒体、提醒、简报四类领域能力均为外部协作方：输入自然语言或结构化字段，
//! 返回自然语言结果或错误。Router 与 TaskPipeline 共享同一组句柄。

pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::CapabilityError;

pub use mock::MockCapabilities;

/// 消息能力：发送、线程摘要、自然语言指令
#[async_trait]
pub trait MessagingCapability: Send + Sync {
    async fn send_message(
        &self,
        recipient: &str,
        content: &str,
        source: &str,
    ) -> Result<String, CapabilityError>;

    async fn summarize(&self, context: &str) -> Result<String, CapabilityError>;

    /// 查询、搜索等未结构化的消息指令
    async fn handle(&self, text: &str) -> Result<String, CapabilityError>;
}

/// 媒体能力：播放、排队、播放控制
#[async_trait]
pub trait MediaCapability: Send + Sync {
    async fn play(&self, query: &str, source: Option<&str>) -> Result<String, CapabilityError>;

    async fn queue(&self, query: &str, source: Option<&str>) -> Result<String, CapabilityError>;

    /// 暂停 / 继续 / 切歌 / 正在播放
    async fn control(&self, text: &str) -> Result<String, CapabilityError>;

    async fn handle(&self, text: &str) -> Result<String, CapabilityError>;
}

/// 提醒能力：创建与查询
#[async_trait]
pub trait ReminderCapability: Send + Sync {
    async fn create(
        &self,
        description: &str,
        time_expression: &str,
    ) -> Result<String, CapabilityError>;

    async fn list(&self, text: &str) -> Result<String, CapabilityError>;

    async fn handle(&self, text: &str) -> Result<String, CapabilityError>;
}

/// 每日简报能力
#[async_trait]
pub trait BriefingCapability: Send + Sync {
    async fn briefing(&self) -> Result<String, CapabilityError>;

    async fn handle(&self, text: &str) -> Result<String, CapabilityError>;
}

/// 四类能力句柄
#[derive(Clone)]
pub struct Capabilities {
    pub messaging: Arc<dyn MessagingCapability>,
    pub media: Arc<dyn MediaCapability>,
    pub reminder: Arc<dyn ReminderCapability>,
    pub briefing: Arc<dyn BriefingCapability>,
}

impl Capabilities {
    pub fn new(
        messaging: Arc<dyn MessagingCapability>,
        media: Arc<dyn MediaCapability>,
        reminder: Arc<dyn ReminderCapability>,
        briefing: Arc<dyn BriefingCapability>,
    ) -> Self {
        Self {
            messaging,
            media,
            reminder,
            briefing,
        }
    }

    /// 同一对象实现全部四类能力时的便捷构造
    pub fn uniform<T>(handler: Arc<T>) -> Self
    where
        T: MessagingCapability
            + MediaCapability
            + ReminderCapability
            + BriefingCapability
            + 'static,
    {
        Self {
            messaging: handler.clone(),
            media: handler.clone(),
            reminder: handler.clone(),
            briefing: handler,
        }
    }
}
