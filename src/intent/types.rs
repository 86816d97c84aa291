//! 意图类型

use serde::{Deserialize, Serialize};

/// 识别出的意图（每个请求产生一次，由 Router 消费一次）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    SendMessage {
        recipient: String,
        content: String,
        source: String,
    },
    /// 新的播放，或对当前播放的控制（路由时二次判断）
    PlayMedia {
        query: String,
        source: Option<String>,
    },
    QueueMedia {
        query: String,
        source: Option<String>,
    },
    /// 创建提醒，或查询已有提醒（路由时二次判断）
    SetReminder {
        description: String,
        time_expression: String,
    },
    /// 线程摘要，或完整每日简报（路由时二次判断）
    Summarize {
        context: String,
    },
    GeneralQuery {
        query: String,
    },
}

impl Intent {
    /// 日志用短名
    pub fn name(&self) -> &'static str {
        match self {
            Intent::SendMessage { .. } => "send_message",
            Intent::PlayMedia { .. } => "play_media",
            Intent::QueueMedia { .. } => "queue_media",
            Intent::SetReminder { .. } => "set_reminder",
            Intent::Summarize { .. } => "summarize",
            Intent::GeneralQuery { .. } => "general_query",
        }
    }
}
