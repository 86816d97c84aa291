//! 兜底恢复
//!
//! 根据失败位置给出回复：路由级失败返回对应的道歉语；请求级失败（错误或 panic）
//! 在模型可用时改用原始补全，否则返回静态道歉语。

use crate::core::OrchestratorError;
use crate::router::Route;

/// 模型与所有处理器都不可用时的最终回复
pub const STATIC_APOLOGY: &str =
    "Sorry, something went wrong while handling that. Please try again.";

/// 兜底补全使用的系统提示
pub const FALLBACK_SYSTEM_PROMPT: &str =
    "You are a helpful on-device assistant. Answer the user's request briefly and directly.";

/// 请求级失败后的兜底动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 把原始输入直接交给推理服务补全
    ModelCompletion,
    /// 返回静态道歉语
    StaticApology,
}

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// 请求级失败的兜底动作：模型已加载则尝试补全
    pub fn handle(&self, err: &OrchestratorError, model_loaded: bool) -> RecoveryAction {
        tracing::warn!(error = %err, "request failed, falling back");
        if model_loaded {
            RecoveryAction::ModelCompletion
        } else {
            RecoveryAction::StaticApology
        }
    }

    /// 单个路由失败时的道歉语
    pub fn apology(&self, route: Route) -> &'static str {
        match route {
            Route::SendMessage => "Sorry, I couldn't send that message.",
            Route::MediaControl => "Sorry, I couldn't control playback right now.",
            Route::PlayMedia => "Sorry, I couldn't start playing that.",
            Route::QueueMedia => "Sorry, I couldn't add that to the queue.",
            Route::CreateReminder => "Sorry, I couldn't set that reminder.",
            Route::ListReminders => "Sorry, I couldn't look up your reminders.",
            Route::SummarizeThread => "Sorry, I couldn't summarize that conversation.",
            Route::Briefing => "Sorry, I couldn't put together your briefing.",
            Route::GeneralQuery => "Sorry, I couldn't come up with an answer to that.",
        }
    }
}
