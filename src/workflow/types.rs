//! 流水线类型定义
//!
//! 复合指令被拆成按顺序执行的步骤，步骤之间通过文本输出传递数据

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::AgentKind;

/// 步骤输入表中的自然语言输入
pub const INPUT_KEY: &str = "input";
/// 步骤输入表中注入的上游输出
pub const PREVIOUS_OUTPUT_KEY: &str = "previous_output";
/// 分解文法中引用上一步输出的标记
pub const PREV_OUTPUT_MARKER: &str = "PREV_OUTPUT";

/// 流水线中的一个步骤，绑定一个能力处理器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub agent_kind: AgentKind,
    /// 能力内的动作名，如 "play" / "create" / "send"
    pub action: String,
    pub inputs: HashMap<String, String>,
    /// 依赖的步骤下标，必须严格小于自身下标
    pub depends_on_step: Option<usize>,
}

impl PipelineStep {
    pub fn new(agent_kind: AgentKind, action: impl Into<String>, input: impl Into<String>) -> Self {
        let mut inputs = HashMap::new();
        inputs.insert(INPUT_KEY.to_string(), input.into());
        Self {
            agent_kind,
            action: action.into(),
            inputs,
            depends_on_step: None,
        }
    }

    /// 自然语言输入（缺省为空串）
    pub fn input(&self) -> &str {
        self.inputs.get(INPUT_KEY).map(String::as_str).unwrap_or("")
    }

    pub fn previous_output(&self) -> Option<&str> {
        self.inputs.get(PREVIOUS_OUTPUT_KEY).map(String::as_str)
    }
}

/// 单步执行结果，按执行顺序一步一条
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: PipelineStep,
    pub output: String,
    pub success: bool,
    pub error: Option<String>,
}

impl StepResult {
    pub fn ok(step: PipelineStep, output: impl Into<String>) -> Self {
        Self {
            step,
            output: output.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(step: PipelineStep, error: impl Into<String>) -> Self {
        Self {
            step,
            output: String::new(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// 整条流水线的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// 所有步骤成功的逻辑与
    pub success: bool,
    pub steps: Vec<StepResult>,
    pub summary: String,
}

impl PipelineResult {
    pub fn succeeded_count(&self) -> usize {
        self.steps.iter().filter(|s| s.success).count()
    }
}

/// 流水线错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// 步骤依赖了自身或之后的步骤
    #[error("Step {step} depends on step {depends_on}, which is not an earlier step")]
    InvalidDependency { step: usize, depends_on: usize },
    #[error("Pipeline has no steps")]
    EmptyPipeline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_input_accessors() {
        let mut step = PipelineStep::new(AgentKind::Media, "play", "jazz");
        assert_eq!(step.input(), "jazz");
        assert_eq!(step.previous_output(), None);

        step.inputs
            .insert(PREVIOUS_OUTPUT_KEY.to_string(), "Now playing jazz".to_string());
        assert_eq!(step.previous_output(), Some("Now playing jazz"));
    }

    #[test]
    fn test_succeeded_count() {
        let step = PipelineStep::new(AgentKind::Media, "play", "jazz");
        let result = PipelineResult {
            success: false,
            steps: vec![
                StepResult::ok(step.clone(), "ok"),
                StepResult::failed(step, "boom"),
            ],
            summary: String::new(),
        };
        assert_eq!(result.succeeded_count(), 1);
    }
}
