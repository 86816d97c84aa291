//! 关键词阶梯与字段抽取
//!
//! 模型不可用时按固定优先级匹配（前面的规则在重叠时胜出）：
//! 简报 → 排队 → 播放控制 → 提醒查询 → 提醒创建 → 消息 → 摘要 → 播放 → 通用问答。
//! 更具体的类别先判断，"add to queue"、"what's playing" 这类短语才能落到正确类别。

use std::sync::LazyLock;

use regex::Regex;

use crate::core::AgentKind;
use crate::intent::Intent;

/// 默认消息渠道
pub const DEFAULT_MESSAGE_SOURCE: &str = "sms";

static BRIEFING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:briefing|brief me|daily (?:summary|digest|update)|morning (?:summary|update)|my day|what did i miss|catch me up)\b",
    )
    .unwrap()
});

static QUEUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:queue|play (?:it |this |that )?next|up next|add (?:\w+ )*to (?:my |the )?playlist)\b")
        .unwrap()
});

static MEDIA_CONTROL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:pause|unpause|resume|skip|next (?:song|track)|previous (?:song|track)|stop (?:the )?(?:music|playing|playback|song)|what's playing|what is playing|whats playing|now playing|volume|shuffle|mute)\b",
    )
    .unwrap()
});

static REMINDER_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:my reminders|(?:list|show|check|view|read) (?:my |all )?reminders|what reminders|any reminders|upcoming reminders|reminders (?:for|today|tomorrow|this week)|do i have (?:any )?reminders)\b",
    )
    .unwrap()
});

static REMINDER_CREATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:remind me|set (?:a |an )?(?:reminder|alarm)|create (?:a )?reminder|add (?:a )?reminder|don't let me forget|reminder|alarm|wake me)\b",
    )
    .unwrap()
});

/// 不能作为收件人的代词与限定词（"tell me a joke" 不是发消息）
const NON_RECIPIENTS: &[&str] = &[
    "me", "us", "it", "this", "that", "these", "those", "the", "them", "a", "an", "my", "our",
    "your", "about", "what", "how", "why", "when", "where", "who",
];

/// 指代已有内容的宾语："it"、"the summary"、"my reminders"
const PLACEHOLDER_OBJECT: &str =
    r"(?:it|this|that|these|those|them|(?:the|my|our|this|that|today's) \w+(?: \w+)?)";

static MESSAGING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bsend (?:a |an )?(?:message|text|sms|email|dm)\b|\b(?:sms|whatsapp|telegram)\b|\b(?:read|check|search) (?:my )?(?:messages|texts|inbox)\b",
    )
    .unwrap()
});

static DIRECT_VERB_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:can you |could you |please )?(?:text|message|tell|dm|email|reply to)\s+(\w+)")
        .unwrap()
});

/// "text it to Alex" / "send the daily briefing to mom"
static FORWARD_TO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:send|text|message|forward|share|email|dm)\s+({})\s+(?:to|with)\s+(?:the |my )?(\w+)(?:\s*[:,]\s*|\s+(?:saying|that|says)\s+|\s+|\s*$)(.*)$",
        PLACEHOLDER_OBJECT
    ))
    .unwrap()
});

static PLACEHOLDER_CONTENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)^{}$", PLACEHOLDER_OBJECT)).unwrap());

static SUMMARIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:summarize|summarise|summary|recap|sum up|tl;?dr)\b").unwrap()
});

static PLAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:play|listen to|put on|start playing)\b").unwrap()
});

static MESSAGE_SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\b(?:on|via|through|over|using) (whatsapp|sms|telegram|signal|messenger|email)\b")
        .unwrap()
});

static SEND_TO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bsend (?:a |an )?(?:message|text|sms|email|dm) to (\w+)(?:\s*[:,]\s*|\s+(?:saying|that|says)\s+|\s*$)(.*)$",
    )
    .unwrap()
});

static DIRECT_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:text|message|tell|dm|email|reply to) (\w+)(?:\s*[:,]\s*|\s+(?:saying|that|to say|says)\s+|\s+|\s*$)(.*)$",
    )
    .unwrap()
});

static MEDIA_SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\b(?:on|from|using) (spotify|youtube music|youtube|apple music|soundcloud|the radio|radio)\b")
        .unwrap()
});

static MEDIA_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:can you |could you |please )?(?:play|listen to|put on|start playing|queue(?: up)?|add)\s+")
        .unwrap()
});

static MEDIA_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:(?:to|in|on) (?:the |my )?(?:queue|playlist)|next)\s*$").unwrap()
});

static REMINDER_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:can you |could you |please )?(?:remind me|set (?:a |an )?(?:reminder|alarm)|create (?:a )?reminder|add (?:a )?reminder|don't let me forget)\s*(?:to |about |that |of |for )?",
    )
    .unwrap()
});

static TIME_EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:at \d{1,2}(?::\d{2})?\s*(?:am|pm)?|in (?:\d+|an?|one|two|five|ten) (?:minutes?|mins?|hours?|days?|weeks?)|tomorrow(?: (?:morning|afternoon|evening|night))?|tonight|this (?:morning|afternoon|evening)|(?:on|next|every) (?:monday|tuesday|wednesday|thursday|friday|saturday|sunday|day|morning|evening|week|month))(?:\s+at \d{1,2}(?::\d{2})?\s*(?:am|pm)?)?",
    )
    .unwrap()
});

/// 阶梯的九个出口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordCategory {
    Briefing,
    Queue,
    MediaControl,
    ReminderQuery,
    ReminderCreate,
    Messaging,
    Summarize,
    PlayMedia,
    General,
}

impl KeywordCategory {
    /// 流水线按能力粒度使用的 Agent 种类
    pub fn agent_kind(&self) -> AgentKind {
        match self {
            KeywordCategory::Briefing => AgentKind::Briefing,
            KeywordCategory::Queue | KeywordCategory::MediaControl | KeywordCategory::PlayMedia => {
                AgentKind::Media
            }
            KeywordCategory::ReminderQuery | KeywordCategory::ReminderCreate => AgentKind::Reminder,
            KeywordCategory::Messaging | KeywordCategory::Summarize => AgentKind::Messaging,
            KeywordCategory::General => AgentKind::General,
        }
    }

    /// 流水线步骤的动作名
    pub fn action(&self) -> &'static str {
        match self {
            KeywordCategory::Briefing => "briefing",
            KeywordCategory::Queue => "queue",
            KeywordCategory::MediaControl => "control",
            KeywordCategory::ReminderQuery => "list",
            KeywordCategory::ReminderCreate => "create",
            KeywordCategory::Messaging => "send",
            KeywordCategory::Summarize => "summarize",
            KeywordCategory::PlayMedia => "play",
            KeywordCategory::General => "ask",
        }
    }
}

fn normalize(text: &str) -> String {
    text.replace(['\u{2019}', '\u{2018}'], "'")
}

pub fn is_briefing(text: &str) -> bool {
    BRIEFING.is_match(&normalize(text))
}

pub fn is_queue(text: &str) -> bool {
    QUEUE.is_match(&normalize(text))
}

pub fn is_media_control(text: &str) -> bool {
    MEDIA_CONTROL.is_match(&normalize(text))
}

pub fn is_reminder_query(text: &str) -> bool {
    REMINDER_QUERY.is_match(&normalize(text))
}

pub fn is_reminder_create(text: &str) -> bool {
    REMINDER_CREATE.is_match(&normalize(text))
}

pub fn is_messaging(text: &str) -> bool {
    let text = normalize(text);
    let text = text.trim();
    MESSAGING.is_match(text)
        || FORWARD_TO.is_match(text)
        || DIRECT_VERB_START
            .captures(text)
            .is_some_and(|c| !is_non_recipient(&c[1]))
}

pub fn is_non_recipient(word: &str) -> bool {
    NON_RECIPIENTS.iter().any(|w| w.eq_ignore_ascii_case(word))
}

/// 内容只是对已有结果的指代（如 "it"、"the summary"），需要由上游输出替换
pub fn is_placeholder_content(text: &str) -> bool {
    PLACEHOLDER_CONTENT.is_match(text.trim())
}

pub fn is_summarize(text: &str) -> bool {
    SUMMARIZE.is_match(&normalize(text))
}

pub fn is_play(text: &str) -> bool {
    PLAY.is_match(&normalize(text))
}

/// 按优先级跑阶梯
pub fn classify(text: &str) -> KeywordCategory {
    if is_briefing(text) {
        KeywordCategory::Briefing
    } else if is_queue(text) {
        KeywordCategory::Queue
    } else if is_media_control(text) {
        KeywordCategory::MediaControl
    } else if is_reminder_query(text) {
        KeywordCategory::ReminderQuery
    } else if is_reminder_create(text) {
        KeywordCategory::ReminderCreate
    } else if is_messaging(text) {
        KeywordCategory::Messaging
    } else if is_summarize(text) {
        KeywordCategory::Summarize
    } else if is_play(text) {
        KeywordCategory::PlayMedia
    } else {
        KeywordCategory::General
    }
}

/// 关键词路径的完整意图（含字段抽取）
pub fn classify_intent(text: &str) -> Intent {
    intent_for(classify(text), text)
}

/// 类别 + 原文 → 意图
pub fn intent_for(category: KeywordCategory, text: &str) -> Intent {
    let text = text.trim();
    match category {
        KeywordCategory::Briefing | KeywordCategory::Summarize => Intent::Summarize {
            context: text.to_string(),
        },
        KeywordCategory::Queue => {
            let (query, source) = extract_media(text);
            Intent::QueueMedia { query, source }
        }
        KeywordCategory::MediaControl => Intent::PlayMedia {
            query: text.to_string(),
            source: None,
        },
        KeywordCategory::ReminderQuery => Intent::SetReminder {
            description: text.to_string(),
            time_expression: String::new(),
        },
        KeywordCategory::ReminderCreate => {
            let (description, time_expression) = extract_reminder(text);
            Intent::SetReminder {
                description,
                time_expression,
            }
        }
        KeywordCategory::Messaging => {
            let fields = extract_message(text);
            Intent::SendMessage {
                recipient: fields.recipient,
                content: fields.content,
                source: fields.source,
            }
        }
        KeywordCategory::PlayMedia => {
            let (query, source) = extract_media(text);
            Intent::PlayMedia { query, source }
        }
        KeywordCategory::General => Intent::GeneralQuery {
            query: text.to_string(),
        },
    }
}

/// 消息字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFields {
    pub recipient: String,
    pub content: String,
    pub source: String,
}

/// "text mom saying hi" / "send a message to Alex: ..." / "tell Sam that ... on whatsapp"
///
/// "text it to Alex" 这类转发句式以 "to" 后的词为收件人，内容为宾语本身（"it"），
/// 由调用方决定是否换成上游输出；代词与限定词永远不会成为收件人。
pub fn extract_message(text: &str) -> MessageFields {
    let text = normalize(text);
    let source = MESSAGE_SOURCE
        .captures(&text)
        .map(|c| c[1].to_lowercase())
        .unwrap_or_else(|| DEFAULT_MESSAGE_SOURCE.to_string());
    let stripped = MESSAGE_SOURCE.replace_all(&text, "");
    let stripped = stripped.trim();

    match recipient_and_content(stripped) {
        Some((recipient, content)) => MessageFields {
            recipient,
            content,
            source,
        },
        None => MessageFields {
            recipient: String::new(),
            content: stripped.to_string(),
            source,
        },
    }
}

fn recipient_and_content(text: &str) -> Option<(String, String)> {
    let found = if let Some(c) = SEND_TO.captures(text) {
        (c[1].to_string(), clean_tail(&c[2]))
    } else if let Some(c) = FORWARD_TO.captures(text) {
        let tail = clean_tail(&c[3]);
        let content = if tail.is_empty() { c[1].to_string() } else { tail };
        (c[2].to_string(), content)
    } else {
        let c = DIRECT_MESSAGE.captures(text)?;
        (c[1].to_string(), clean_tail(&c[2]))
    };
    (!is_non_recipient(&found.0)).then_some(found)
}

/// (查询, 来源)；去掉动词与 "to the queue" 之类的尾巴
pub fn extract_media(text: &str) -> (String, Option<String>) {
    let text = normalize(text);
    let source = MEDIA_SOURCE.captures(&text).map(|c| c[1].to_lowercase());
    let stripped = MEDIA_SOURCE.replace_all(&text, "");
    let stripped = MEDIA_VERB.replace(stripped.trim(), "");
    let stripped = MEDIA_TAIL.replace(stripped.trim(), "");
    let query = clean_tail(&stripped);
    if query.is_empty() {
        (text.trim().to_string(), source)
    } else {
        (query, source)
    }
}

/// (描述, 时间表达)；"remind me to call mom at 5pm" → ("call mom", "at 5pm")
pub fn extract_reminder(text: &str) -> (String, String) {
    let text = normalize(text);
    let body = REMINDER_PREFIX.replace(text.trim(), "");
    let body = body.trim();

    match TIME_EXPRESSION.find(body) {
        Some(m) => {
            let time = m.as_str().trim().to_string();
            let description = format!("{} {}", &body[..m.start()], &body[m.end()..]);
            let description = clean_tail(&description);
            (
                if description.is_empty() {
                    body.to_string()
                } else {
                    description
                },
                time,
            )
        }
        None => (clean_tail(body), String::new()),
    }
}

fn clean_tail(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', '!', '?', ','])
        .trim()
        .to_string()
}
