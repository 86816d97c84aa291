//! 复合指令检测

use std::sync::LazyLock;

use regex::Regex;

use crate::core::AgentKind;
use crate::intent::keywords;

/// 动作动词（用于 "A and B" 判断与分句）
const ACTION_VERBS: &str = "play|pause|resume|skip|queue|send|text|message|tell|remind|set|summarize|summarise|read|show|list|check|brief|email|reply|search|find|stop|add";

static SEQUENCING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:,|\band)?\s+then\s+\w|\b(?:and also|after that|afterwards|followed by)\b").unwrap()
});

static AND_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s+and\s+").unwrap());

static VERB_ANYWHERE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)\b({})\b", ACTION_VERBS)).unwrap());

static VERB_AT_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^(?:please |also |then |can you |could you )?({})\b",
        ACTION_VERBS
    ))
    .unwrap()
});

/// "remind me about Sam's message"
pub(crate) static REMIND_ABOUT_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bremind me (?:about|of) (\w+)'s (?:message|text|email|dm)s?\b").unwrap()
});

/// "send the daily briefing to mom on whatsapp"：先生成内容，再转发
static SEND_DERIVED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:send|text|share|forward|email)\s+(.+?)\s+(?:to|with)\s+(\w+)((?:\s+(?:on|via|through|over|using)\s+\w+)?)\s*[.!?]?$",
    )
    .unwrap()
});

static DERIVED_PAYLOAD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(summary|briefing|reminders)\b").unwrap());

static SUMMARY_OF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:the |a |my )?(?:summary|recap) of\s+").unwrap());

/// 需要先由另一能力产出内容、再发送给某人的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DerivedSend {
    pub agent_kind: AgentKind,
    pub action: &'static str,
    /// 产出步骤的输入
    pub payload: String,
    pub recipient: String,
    /// 原文中的渠道后缀，如 " on whatsapp"
    pub channel: String,
}

pub(crate) fn derived_send(text: &str) -> Option<DerivedSend> {
    let caps = SEND_DERIVED.captures(text)?;
    let recipient = &caps[2];
    if keywords::is_non_recipient(recipient) {
        return None;
    }
    let payload = caps[1].trim();
    let kind = DERIVED_PAYLOAD.captures(payload)?;
    let (agent_kind, action) = match kind[1].to_ascii_lowercase().as_str() {
        "briefing" => (AgentKind::Briefing, "briefing"),
        "reminders" => (AgentKind::Reminder, "list"),
        _ => (AgentKind::Messaging, "summarize"),
    };
    let topic = SUMMARY_OF.replace(payload, "");
    let payload = if topic.trim().is_empty() {
        payload.to_string()
    } else {
        topic.trim().to_string()
    };

    Some(DerivedSend {
        agent_kind,
        action,
        payload,
        recipient: recipient.to_string(),
        channel: caps[3].to_string(),
    })
}

fn normalize(text: &str) -> String {
    text.replace(['\u{2019}', '\u{2018}'], "'")
}

/// 是否需要多个能力按顺序配合
///
/// 命中任一即为复合：显式顺序连接词；"and" 连接两个不同的动作动词；跨能力引用。
pub fn is_compound_command(text: &str) -> bool {
    let text = normalize(text);
    let text = text.trim();
    if text.is_empty() {
        return false;
    }

    SEQUENCING.is_match(text)
        || has_distinct_verbs_joined_by_and(text)
        || REMIND_ABOUT_MESSAGE.is_match(text)
        || derived_send(text).is_some()
}

/// "and" 右侧以动作动词开头、且与左侧第一个动词不同时返回 true
fn has_distinct_verbs_joined_by_and(text: &str) -> bool {
    AND_SPLIT
        .find_iter(text)
        .any(|m| starts_new_action(&text[..m.start()], &text[m.end()..]))
}

/// 供分句使用：`right` 是否是一个新的动作分句
pub(crate) fn starts_new_action(left: &str, right: &str) -> bool {
    let Some(right_verb) = VERB_AT_START.captures(right.trim_start()) else {
        return false;
    };
    let Some(left_verb) = VERB_ANYWHERE.captures(left) else {
        return false;
    };
    !left_verb[1].eq_ignore_ascii_case(&right_verb[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequencing_words() {
        assert!(is_compound_command("play jazz and then remind me to call mom"));
        assert!(is_compound_command("summarize my chat with Sam, then text it to Alex"));
        assert!(is_compound_command("pause the music and after that read my messages"));
        assert!(!is_compound_command("what happened then"));
    }

    #[test]
    fn test_single_requests_are_not_compound() {
        assert!(!is_compound_command("play some jazz"));
        assert!(!is_compound_command("text mom and dad saying dinner is ready"));
        assert!(!is_compound_command("play rock and roll"));
        assert!(!is_compound_command(""));
    }

    #[test]
    fn test_two_verbs_joined_by_and() {
        assert!(is_compound_command("play some jazz and remind me to stretch at 5pm"));
        assert!(is_compound_command("check my reminders and text Sam I'm on my way"));
        assert!(!is_compound_command("play jazz and play blues"));
    }

    #[test]
    fn test_cross_capability_patterns() {
        assert!(is_compound_command("remind me about Sam's message"));
        assert!(is_compound_command("Remind me of Alex\u{2019}s text tomorrow"));
        assert!(is_compound_command("send the daily briefing to mom"));
        assert!(!is_compound_command("send my briefing to me"));
    }

    #[test]
    fn test_derived_send_fields() {
        let derived = derived_send("send the daily briefing to mom").unwrap();
        assert_eq!(derived.agent_kind, AgentKind::Briefing);
        assert_eq!(derived.recipient, "mom");
        assert_eq!(derived.channel, "");

        let derived = derived_send("send the summary of my chat with Sam to Alex on whatsapp").unwrap();
        assert_eq!(derived.agent_kind, AgentKind::Messaging);
        assert_eq!(derived.action, "summarize");
        assert_eq!(derived.payload, "my chat with Sam");
        assert_eq!(derived.recipient, "Alex");
        assert_eq!(derived.channel, " on whatsapp");

        let derived = derived_send("text my reminders to Sam").unwrap();
        assert_eq!((derived.agent_kind, derived.action), (AgentKind::Reminder, "list"));

        assert!(derived_send("send a message to Alex saying hi").is_none());
    }
}
