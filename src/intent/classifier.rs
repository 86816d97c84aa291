//! 意图识别器
//!
//! 模型已加载时让模型输出单个类别词；未加载、调用失败或回复为空时走关键词阶梯。

use std::sync::Arc;

use crate::config::SamplingParams;
use crate::intent::keywords::{self, KeywordCategory};
use crate::intent::Intent;
use crate::llm::InferenceService;
use crate::memory::ConversationStore;

/// 分类时默认带上的最近对话轮数
pub const DEFAULT_CLASSIFICATION_CONTEXT_TURNS: usize = 3;

const CLASSIFY_SYSTEM_PROMPT: &str = r#"You are an intent classifier for an on-device assistant.
Classify the user's request into exactly one category and output ONLY that word:
- MESSAGE: sending, reading or searching messages
- MEDIA: playing music or controlling playback
- QUEUE: adding songs to the play queue
- REMINDER: creating or checking reminders and alarms
- SUMMARY: summarizing a conversation or thread
- BRIEFING: a daily briefing or catch-up of everything
- GENERAL: anything else
No explanation."#;

pub struct IntentClassifier {
    inference: Arc<dyn InferenceService>,
    conversation: Arc<ConversationStore>,
    params: SamplingParams,
    context_turns: usize,
}

impl IntentClassifier {
    pub fn new(inference: Arc<dyn InferenceService>, conversation: Arc<ConversationStore>) -> Self {
        Self {
            inference,
            conversation,
            params: SamplingParams::new(16, 0.1),
            context_turns: DEFAULT_CLASSIFICATION_CONTEXT_TURNS,
        }
    }

    pub fn with_params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_context_turns(mut self, turns: usize) -> Self {
        self.context_turns = turns;
        self
    }

    /// 识别用户意图（不会失败）
    pub async fn classify_intent(&self, text: &str) -> Intent {
        if self.inference.is_loaded() {
            if let Some(intent) = self.model_classify(text).await {
                tracing::debug!(intent = intent.name(), "classified by model");
                return intent;
            }
        }

        let intent = keywords::classify_intent(text);
        tracing::debug!(intent = intent.name(), "classified by keywords");
        intent
    }

    /// None 表示需要回退到关键词阶梯
    async fn model_classify(&self, text: &str) -> Option<Intent> {
        let context = self
            .conversation
            .build_context_prompt_before(text, self.context_turns)
            .await;
        let prompt = if context.is_empty() {
            format!("Request: {}\nCategory:", text)
        } else {
            format!("{}\n\nRequest: {}\nCategory:", context, text)
        };

        let answer = match self
            .inference
            .generate(
                &prompt,
                CLASSIFY_SYSTEM_PROMPT,
                self.params.max_tokens,
                self.params.temperature,
            )
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(error = %e, "model classification failed, using keywords");
                return None;
            }
        };

        let category = parse_category(&answer)?;
        Some(intent_for_category(&category, text))
    }
}

/// 取回复中第一个单词（大写、去标点）
fn parse_category(answer: &str) -> Option<String> {
    answer
        .split(|c: char| !c.is_ascii_alphabetic())
        .find(|w| !w.is_empty())
        .map(|w| w.to_ascii_uppercase())
}

/// 类别词 → 意图；字段由关键词抽取器填充，无法识别的类别视为通用问答
fn intent_for_category(category: &str, text: &str) -> Intent {
    match category {
        "MESSAGE" | "MESSAGING" => keywords::intent_for(KeywordCategory::Messaging, text),
        "MEDIA" | "MUSIC" | "PLAY" => {
            if keywords::is_media_control(text) {
                keywords::intent_for(KeywordCategory::MediaControl, text)
            } else {
                keywords::intent_for(KeywordCategory::PlayMedia, text)
            }
        }
        "QUEUE" => keywords::intent_for(KeywordCategory::Queue, text),
        "REMINDER" | "ALARM" => {
            if keywords::is_reminder_query(text) {
                keywords::intent_for(KeywordCategory::ReminderQuery, text)
            } else {
                keywords::intent_for(KeywordCategory::ReminderCreate, text)
            }
        }
        "SUMMARY" | "SUMMARIZE" => keywords::intent_for(KeywordCategory::Summarize, text),
        "BRIEFING" => keywords::intent_for(KeywordCategory::Briefing, text),
        other => {
            if other != "GENERAL" {
                tracing::debug!(category = other, "unrecognized category from model");
            }
            Intent::GeneralQuery {
                query: text.trim().to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockInference;
    use crate::memory::{InMemoryTurnStore, Role};
    use crate::core::AgentKind;

    fn conversation() -> Arc<ConversationStore> {
        Arc::new(ConversationStore::new(Arc::new(InMemoryTurnStore::new())))
    }

    #[tokio::test]
    async fn test_keyword_fallback_when_unloaded() {
        let classifier = IntentClassifier::new(Arc::new(MockInference::unloaded()), conversation());

        let intent = classifier.classify_intent("remind me to call mom at 5pm").await;
        assert_eq!(
            intent,
            Intent::SetReminder {
                description: "call mom".to_string(),
                time_expression: "at 5pm".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_model_category_maps_to_intent() {
        let mock = Arc::new(MockInference::with_responses(["QUEUE"]));
        let classifier = IntentClassifier::new(mock.clone(), conversation());

        let intent = classifier.classify_intent("add Bohemian Rhapsody please").await;
        assert!(matches!(intent, Intent::QueueMedia { .. }));

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].temperature < 0.3);
        assert!(calls[0].prompt.ends_with("Category:"));
    }

    #[tokio::test]
    async fn test_model_answer_is_normalized() {
        let mock = Arc::new(MockInference::with_responses(["  reminder.\nBecause..."]));
        let classifier = IntentClassifier::new(mock, conversation());

        let intent = classifier.classify_intent("wake me at 7").await;
        assert!(matches!(intent, Intent::SetReminder { .. }));
    }

    #[tokio::test]
    async fn test_garbled_answer_is_general_query() {
        let mock = Arc::new(MockInference::with_responses(["BANANA"]));
        let classifier = IntentClassifier::new(mock, conversation());

        let intent = classifier.classify_intent("play some jazz").await;
        assert_eq!(
            intent,
            Intent::GeneralQuery {
                query: "play some jazz".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_keywords() {
        let classifier = IntentClassifier::new(Arc::new(MockInference::failing()), conversation());

        let intent = classifier.classify_intent("play some jazz").await;
        assert!(matches!(intent, Intent::PlayMedia { .. }));
    }

    #[tokio::test]
    async fn test_context_turns_are_sent_to_model() {
        let conv = conversation();
        conv.add_turn(Role::User, "who is playing tonight", AgentKind::Router).await;
        let mock = Arc::new(MockInference::with_responses(["GENERAL"]));
        let classifier = IntentClassifier::new(mock.clone(), conv);

        classifier.classify_intent("and tomorrow?").await;
        let calls = mock.calls();
        assert!(calls[0].prompt.contains("User: who is playing tonight"));
        assert!(calls[0].prompt.contains("Request: and tomorrow?"));
    }

    #[tokio::test]
    async fn test_current_request_not_counted_as_context() {
        let conv = conversation();
        for text in ["u1", "u2", "u3", "u4"] {
            conv.add_turn(Role::User, text, AgentKind::Router).await;
        }
        // Router 在分类前已记录当前请求
        conv.add_user_turn("play jazz").await;
        let mock = Arc::new(MockInference::with_responses(["MEDIA"]));
        let classifier = IntentClassifier::new(mock.clone(), conv);

        classifier.classify_intent("play jazz").await;
        let prompt = &mock.calls()[0].prompt;
        assert_eq!(prompt.matches("play jazz").count(), 1);
        assert!(prompt.contains("User: u2\nUser: u3\nUser: u4"));
        assert!(!prompt.contains("u1"));
    }
}
