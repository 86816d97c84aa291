//! 复合指令分解
//!
//! 模型可用时让模型按 `STEP n: AGENT=..., ACTION=..., INPUT=...` 文法输出步骤；
//! 模型不可用或输出无法解析时，按连接词切句并用关键词阶梯判断每句的能力。

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::config::SamplingParams;
use crate::core::AgentKind;
use crate::intent::keywords;
use crate::llm::InferenceService;
use crate::workflow::builder::validate_steps;
use crate::workflow::detect::{derived_send, starts_new_action, REMIND_ABOUT_MESSAGE};
use crate::workflow::types::*;

const DECOMPOSE_SYSTEM_PROMPT: &str = r#"You split a compound assistant request into ordered steps.
Available agents and actions:
- messaging: send, summarize, search
- media: play, queue, control
- reminder: create, list
- briefing: briefing
- general: ask
Output one line per step, nothing else:
STEP 1: AGENT=<agent>, ACTION=<action>, INPUT=<text for that step>
Write PREV_OUTPUT inside INPUT when a step needs the previous step's result."#;

static STEP_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)STEP\s*(\d+)\s*:\s*AGENT\s*=\s*(\w+)\s*,\s*ACTION\s*=\s*(\w+)\s*,\s*INPUT\s*=\s*(.+)")
        .unwrap()
});

static STRONG_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*,?\s*\b(?:and then|then|and also|after that|afterwards|followed by)\b\s*|\s*;\s*|[.!?]\s+")
        .unwrap()
});

static AND_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s+and\s+").unwrap());

static ANAPHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:that|it|this|the result|the summary)\b").unwrap());

static LEADING_FILLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:and |also |then |please )+").unwrap());

pub struct Decomposer {
    inference: Arc<dyn InferenceService>,
    params: SamplingParams,
}

impl Decomposer {
    pub fn new(inference: Arc<dyn InferenceService>) -> Self {
        Self {
            inference,
            params: SamplingParams::new(256, 0.2),
        }
    }

    pub fn with_params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }

    /// 分解复合指令；返回空列表表示无法分解
    pub async fn decompose(&self, text: &str) -> Vec<PipelineStep> {
        if self.inference.is_loaded() {
            match self
                .inference
                .generate(
                    text,
                    DECOMPOSE_SYSTEM_PROMPT,
                    self.params.max_tokens,
                    self.params.temperature,
                )
                .await
            {
                Ok(answer) => {
                    let steps = parse_step_grammar(&answer);
                    if !steps.is_empty() {
                        tracing::debug!(steps = steps.len(), "decomposed by model");
                        return steps;
                    }
                    tracing::debug!("model decomposition unparseable, using keyword split");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "model decomposition failed, using keyword split");
                }
            }
        }

        let steps = keyword_decompose(text);
        tracing::debug!(steps = steps.len(), "decomposed by keyword split");
        steps
    }
}

/// 解析 STEP 文法；INPUT 含 PREV_OUTPUT 的步骤依赖前一步
pub fn parse_step_grammar(answer: &str) -> Vec<PipelineStep> {
    let mut steps: Vec<PipelineStep> = Vec::new();
    for caps in answer.lines().filter_map(|line| STEP_LINE.captures(line)) {
        let agent_kind = AgentKind::parse(&caps[2]).unwrap_or(AgentKind::General);
        let input = caps[4].trim();
        let mut step = PipelineStep::new(agent_kind, caps[3].to_lowercase(), input);
        if input.contains(PREV_OUTPUT_MARKER) && !steps.is_empty() {
            step.depends_on_step = Some(steps.len() - 1);
        }
        steps.push(step);
    }

    match validate_steps(&steps) {
        Ok(()) => steps,
        Err(e) => {
            tracing::warn!(error = %e, "discarding model decomposition");
            Vec::new()
        }
    }
}

/// 不依赖模型的分解
pub fn keyword_decompose(text: &str) -> Vec<PipelineStep> {
    let text = text.replace(['\u{2019}', '\u{2018}'], "'");
    let text = text.trim();

    if let Some(caps) = REMIND_ABOUT_MESSAGE.captures(text) {
        let name = &caps[1];
        let lookup = PipelineStep::new(
            AgentKind::Messaging,
            "search",
            format!("find the latest message from {}", name),
        );
        let mut remind = PipelineStep::new(
            AgentKind::Reminder,
            "create",
            format!("remind me about {}'s message: {}", name, PREV_OUTPUT_MARKER),
        );
        remind.depends_on_step = Some(0);
        return vec![lookup, remind];
    }

    let segments = split_segments(text);
    if let [only] = segments.as_slice() {
        if let Some(derived) = derived_send(only) {
            let produce = PipelineStep::new(derived.agent_kind, derived.action, derived.payload);
            let mut send = PipelineStep::new(
                AgentKind::Messaging,
                "send",
                format!("send it to {}{}", derived.recipient, derived.channel),
            );
            send.depends_on_step = Some(0);
            return vec![produce, send];
        }
    }

    segments
        .into_iter()
        .enumerate()
        .map(|(index, segment)| {
            let category = keywords::classify(&segment);
            let mut step = PipelineStep::new(category.agent_kind(), category.action(), segment.as_str());
            if index > 0 && ANAPHOR.is_match(&segment) {
                step.depends_on_step = Some(index - 1);
            }
            step
        })
        .collect()
}

/// 先按强分隔符切，再在 "and + 新动作" 处切
fn split_segments(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    for part in STRONG_SEPARATOR.split(text) {
        let mut rest = part;
        loop {
            let split_at = AND_SPLIT
                .find_iter(rest)
                .find(|m| starts_new_action(&rest[..m.start()], &rest[m.end()..]));
            match split_at {
                Some(m) => {
                    push_segment(&mut segments, &rest[..m.start()]);
                    rest = &rest[m.end()..];
                }
                None => {
                    push_segment(&mut segments, rest);
                    break;
                }
            }
        }
    }
    segments
}

fn push_segment(segments: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim().trim_end_matches([',', '.', '!', '?', ';']).trim();
    let cleaned = LEADING_FILLER.replace(trimmed, "");
    let cleaned = cleaned.trim();
    if !cleaned.is_empty() {
        segments.push(cleaned.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockInference;

    #[test]
    fn test_parse_step_grammar() {
        let answer = "STEP 1: AGENT=media, ACTION=play, INPUT=jazz\n\
                      STEP 2: AGENT=messaging, ACTION=send, INPUT=text Sam PREV_OUTPUT\n\
                      garbage line\n\
                      step 3: agent=weather, action=Ask, input=will it rain";
        let steps = parse_step_grammar(answer);

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].agent_kind, AgentKind::Media);
        assert_eq!(steps[0].input(), "jazz");
        assert_eq!(steps[1].depends_on_step, Some(0));
        assert_eq!(steps[2].agent_kind, AgentKind::General);
        assert_eq!(steps[2].action, "ask");
    }

    #[test]
    fn test_first_step_marker_has_no_dependency() {
        let steps = parse_step_grammar("STEP 1: AGENT=general, ACTION=ask, INPUT=PREV_OUTPUT");
        assert_eq!(steps[0].depends_on_step, None);
    }

    #[test]
    fn test_keyword_split_on_then() {
        let steps = keyword_decompose("play jazz and then remind me to call mom");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].agent_kind, AgentKind::Media);
        assert_eq!(steps[0].action, "play");
        assert_eq!(steps[1].agent_kind, AgentKind::Reminder);
        assert_eq!(steps[1].action, "create");
        assert_eq!(steps[1].input(), "remind me to call mom");
        assert_eq!(steps[1].depends_on_step, None);
    }

    #[test]
    fn test_keyword_split_with_anaphor() {
        let steps = keyword_decompose("summarize my chat with Sam, then text the summary to Alex");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].action, "summarize");
        assert_eq!(steps[1].agent_kind, AgentKind::Messaging);
        assert_eq!(steps[1].depends_on_step, Some(0));
    }

    #[test]
    fn test_send_derived_content_becomes_two_steps() {
        let steps = keyword_decompose("send the daily briefing to mom");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].agent_kind, AgentKind::Briefing);
        assert_eq!(steps[0].action, "briefing");
        assert_eq!(steps[1].agent_kind, AgentKind::Messaging);
        assert_eq!(steps[1].action, "send");
        assert_eq!(steps[1].input(), "send it to mom");
        assert_eq!(steps[1].depends_on_step, Some(0));
    }

    #[test]
    fn test_send_derived_inside_sequence_uses_segments() {
        let steps = keyword_decompose("summarize my chat with Sam, then send the summary to Alex");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].action, "summarize");
        assert_eq!(steps[0].input(), "summarize my chat with Sam");
        assert_eq!(steps[1].action, "send");
        assert_eq!(steps[1].depends_on_step, Some(0));
    }

    #[test]
    fn test_keyword_split_on_and_with_new_verb() {
        let steps = keyword_decompose("pause the music and check my reminders");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].action, "control");
        assert_eq!(steps[1].action, "list");
    }

    #[test]
    fn test_cross_capability_reminder() {
        let steps = keyword_decompose("remind me about Sam's message");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].agent_kind, AgentKind::Messaging);
        assert_eq!(steps[1].agent_kind, AgentKind::Reminder);
        assert_eq!(steps[1].depends_on_step, Some(0));
        assert!(steps[1].input().contains(PREV_OUTPUT_MARKER));
    }

    #[tokio::test]
    async fn test_unparseable_model_output_falls_back() {
        let mock = Arc::new(MockInference::with_responses(["Sure! I'd be happy to help."]));
        let decomposer = Decomposer::new(mock);

        let steps = decomposer.decompose("play jazz and then remind me to call mom").await;
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].agent_kind, AgentKind::Reminder);
    }

    #[tokio::test]
    async fn test_model_decomposition_used_when_parseable() {
        let mock = Arc::new(MockInference::with_responses([
            "STEP 1: AGENT=briefing, ACTION=briefing, INPUT=today\nSTEP 2: AGENT=messaging, ACTION=send, INPUT=text mom PREV_OUTPUT",
        ]));
        let decomposer = Decomposer::new(mock.clone());

        let steps = decomposer.decompose("send my briefing to mom").await;
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].agent_kind, AgentKind::Briefing);
        assert_eq!(steps[1].depends_on_step, Some(0));
        assert!(mock.calls()[0].temperature <= 0.2);
    }
}
