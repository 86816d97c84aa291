//! 共享类型：Agent 种类

use serde::{Deserialize, Serialize};

/// 编排层内的 Agent 种类（对话记录、流水线步骤、健康追踪共用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// 路由器本身（用户输入、兜底回复）
    Router,
    Messaging,
    Media,
    Reminder,
    Briefing,
    /// 通用问答（直接交给推理服务）
    General,
    /// 复合指令流水线
    Pipeline,
}

impl AgentKind {
    pub const ALL: [AgentKind; 7] = [
        AgentKind::Router,
        AgentKind::Messaging,
        AgentKind::Media,
        AgentKind::Reminder,
        AgentKind::Briefing,
        AgentKind::General,
        AgentKind::Pipeline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Router => "router",
            AgentKind::Messaging => "messaging",
            AgentKind::Media => "media",
            AgentKind::Reminder => "reminder",
            AgentKind::Briefing => "briefing",
            AgentKind::General => "general",
            AgentKind::Pipeline => "pipeline",
        }
    }

    /// 宽松解析（模型输出、持久化字段），未知名称返回 None
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "router" => Some(AgentKind::Router),
            "messaging" | "message" | "messages" | "sms" | "chat" => Some(AgentKind::Messaging),
            "media" | "music" | "player" => Some(AgentKind::Media),
            "reminder" | "reminders" | "alarm" => Some(AgentKind::Reminder),
            "briefing" | "brief" => Some(AgentKind::Briefing),
            "general" | "assistant" | "llm" => Some(AgentKind::General),
            "pipeline" => Some(AgentKind::Pipeline),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
