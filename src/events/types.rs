//! 跨组件事件：新消息、媒体状态、提醒触发、模型加载、系统事件、健康检查、主动洞察

use serde::Serialize;

use crate::core::{now_ms, AgentKind};

/// 事件种类（订阅过滤用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewMessage,
    MediaStateChanged,
    ReminderFired,
    ModelLoaded,
    ModelUnloaded,
    SystemEvent,
    AgentHealthCheck,
    ProactiveInsight,
}

/// 单个事件（构造后不可变，可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    NewMessage {
        sender: String,
        preview: String,
        source: String,
        timestamp_ms: i64,
    },
    MediaStateChanged {
        is_playing: bool,
        title: Option<String>,
        timestamp_ms: i64,
    },
    ReminderFired {
        reminder_id: String,
        description: String,
        timestamp_ms: i64,
    },
    ModelLoaded {
        model_name: String,
        timestamp_ms: i64,
    },
    ModelUnloaded {
        timestamp_ms: i64,
    },
    SystemEvent {
        message: String,
        timestamp_ms: i64,
    },
    AgentHealthCheck {
        agent: AgentKind,
        healthy: bool,
        timestamp_ms: i64,
    },
    /// 主动推送的建议（如"你有 3 条未读消息"）
    ProactiveInsight {
        title: String,
        body: String,
        timestamp_ms: i64,
    },
}

impl AgentEvent {
    pub fn new_message(
        sender: impl Into<String>,
        preview: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        AgentEvent::NewMessage {
            sender: sender.into(),
            preview: preview.into(),
            source: source.into(),
            timestamp_ms: now_ms(),
        }
    }

    pub fn media_state_changed(is_playing: bool, title: Option<String>) -> Self {
        AgentEvent::MediaStateChanged {
            is_playing,
            title,
            timestamp_ms: now_ms(),
        }
    }

    pub fn reminder_fired(reminder_id: impl Into<String>, description: impl Into<String>) -> Self {
        AgentEvent::ReminderFired {
            reminder_id: reminder_id.into(),
            description: description.into(),
            timestamp_ms: now_ms(),
        }
    }

    pub fn model_loaded(model_name: impl Into<String>) -> Self {
        AgentEvent::ModelLoaded {
            model_name: model_name.into(),
            timestamp_ms: now_ms(),
        }
    }

    pub fn model_unloaded() -> Self {
        AgentEvent::ModelUnloaded {
            timestamp_ms: now_ms(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        AgentEvent::SystemEvent {
            message: message.into(),
            timestamp_ms: now_ms(),
        }
    }

    pub fn health_check(agent: AgentKind, healthy: bool) -> Self {
        AgentEvent::AgentHealthCheck {
            agent,
            healthy,
            timestamp_ms: now_ms(),
        }
    }

    pub fn proactive_insight(title: impl Into<String>, body: impl Into<String>) -> Self {
        AgentEvent::ProactiveInsight {
            title: title.into(),
            body: body.into(),
            timestamp_ms: now_ms(),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            AgentEvent::NewMessage { .. } => EventKind::NewMessage,
            AgentEvent::MediaStateChanged { .. } => EventKind::MediaStateChanged,
            AgentEvent::ReminderFired { .. } => EventKind::ReminderFired,
            AgentEvent::ModelLoaded { .. } => EventKind::ModelLoaded,
            AgentEvent::ModelUnloaded { .. } => EventKind::ModelUnloaded,
            AgentEvent::SystemEvent { .. } => EventKind::SystemEvent,
            AgentEvent::AgentHealthCheck { .. } => EventKind::AgentHealthCheck,
            AgentEvent::ProactiveInsight { .. } => EventKind::ProactiveInsight,
        }
    }

    pub fn timestamp_ms(&self) -> i64 {
        match self {
            AgentEvent::NewMessage { timestamp_ms, .. }
            | AgentEvent::MediaStateChanged { timestamp_ms, .. }
            | AgentEvent::ReminderFired { timestamp_ms, .. }
            | AgentEvent::ModelLoaded { timestamp_ms, .. }
            | AgentEvent::ModelUnloaded { timestamp_ms }
            | AgentEvent::SystemEvent { timestamp_ms, .. }
            | AgentEvent::AgentHealthCheck { timestamp_ms, .. }
            | AgentEvent::ProactiveInsight { timestamp_ms, .. } => *timestamp_ms,
        }
    }

    /// 序列化为 JSON（转发给前端）
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = AgentEvent::health_check(AgentKind::Media, false);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "agent_health_check");
        assert_eq!(json["agent"], "media");
        assert_eq!(json["healthy"], false);
    }

    #[test]
    fn test_kind_and_timestamp() {
        let event = AgentEvent::reminder_fired("r1", "call mom");
        assert_eq!(event.kind(), EventKind::ReminderFired);
        assert!(event.timestamp_ms() > 0);
        assert!(event.to_json().unwrap().contains("\"type\":\"reminder_fired\""));
    }
}
