//! Mock 能力处理器（用于测试）
//!
//! 一个对象实现全部四类能力，记录每次调用；可按 AgentKind 注入失败或 panic。

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{BriefingCapability, MediaCapability, MessagingCapability, ReminderCapability};
use crate::core::{AgentKind, CapabilityError};

#[derive(Debug, Default)]
pub struct MockCapabilities {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<AgentKind>>,
    panicking: Mutex<HashSet<AgentKind>>,
}

impl MockCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让某类能力的所有调用返回 CapabilityError::Failed
    pub fn fail(&self, kind: AgentKind) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind);
    }

    /// 让某类能力的所有调用 panic
    pub fn panic_on(&self, kind: AgentKind) {
        self.panicking
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind);
    }

    /// 形如 "media.play(jazz)" 的调用记录
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn enter(&self, kind: AgentKind, call: String) -> Result<(), CapabilityError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call.clone());
        if self
            .panicking
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&kind)
        {
            panic!("mock {} capability panicked in {}", kind, call);
        }
        if self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&kind)
        {
            return Err(CapabilityError::Failed(format!("{} unavailable", kind)));
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingCapability for MockCapabilities {
    async fn send_message(
        &self,
        recipient: &str,
        content: &str,
        source: &str,
    ) -> Result<String, CapabilityError> {
        self.enter(
            AgentKind::Messaging,
            format!("messaging.send_message({recipient}, {content}, {source})"),
        )?;
        Ok(format!("Message sent to {recipient}: {content}"))
    }

    async fn summarize(&self, context: &str) -> Result<String, CapabilityError> {
        self.enter(AgentKind::Messaging, format!("messaging.summarize({context})"))?;
        Ok(format!("Summary of: {context}"))
    }

    async fn handle(&self, text: &str) -> Result<String, CapabilityError> {
        self.enter(AgentKind::Messaging, format!("messaging.handle({text})"))?;
        Ok(format!("Messages for: {text}"))
    }
}

#[async_trait]
impl MediaCapability for MockCapabilities {
    async fn play(&self, query: &str, source: Option<&str>) -> Result<String, CapabilityError> {
        self.enter(
            AgentKind::Media,
            format!("media.play({query}, {})", source.unwrap_or("-")),
        )?;
        Ok(format!("Now playing {query}"))
    }

    async fn queue(&self, query: &str, source: Option<&str>) -> Result<String, CapabilityError> {
        self.enter(
            AgentKind::Media,
            format!("media.queue({query}, {})", source.unwrap_or("-")),
        )?;
        Ok(format!("Added {query} to the queue"))
    }

    async fn control(&self, text: &str) -> Result<String, CapabilityError> {
        self.enter(AgentKind::Media, format!("media.control({text})"))?;
        Ok(format!("Playback updated: {text}"))
    }

    async fn handle(&self, text: &str) -> Result<String, CapabilityError> {
        self.enter(AgentKind::Media, format!("media.handle({text})"))?;
        Ok(format!("Media: {text}"))
    }
}

#[async_trait]
impl ReminderCapability for MockCapabilities {
    async fn create(
        &self,
        description: &str,
        time_expression: &str,
    ) -> Result<String, CapabilityError> {
        self.enter(
            AgentKind::Reminder,
            format!("reminder.create({description}, {time_expression})"),
        )?;
        Ok(format!("Reminder set: {description} {time_expression}").trim_end().to_string())
    }

    async fn list(&self, text: &str) -> Result<String, CapabilityError> {
        self.enter(AgentKind::Reminder, format!("reminder.list({text})"))?;
        Ok("You have 2 upcoming reminders".to_string())
    }

    async fn handle(&self, text: &str) -> Result<String, CapabilityError> {
        self.enter(AgentKind::Reminder, format!("reminder.handle({text})"))?;
        Ok(format!("Reminder: {text}"))
    }
}

#[async_trait]
impl BriefingCapability for MockCapabilities {
    async fn briefing(&self) -> Result<String, CapabilityError> {
        self.enter(AgentKind::Briefing, "briefing.briefing()".to_string())?;
        Ok("Good morning! 3 unread messages and 2 reminders today.".to_string())
    }

    async fn handle(&self, text: &str) -> Result<String, CapabilityError> {
        self.enter(AgentKind::Briefing, format!("briefing.handle({text})"))?;
        Ok(format!("Briefing: {text}"))
    }
}
