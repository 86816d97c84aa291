//! 流水线构建器
//!
//! 提供流畅的 API 来构建步骤列表，构建时校验依赖只指向更早的步骤

use crate::core::AgentKind;
use crate::workflow::types::*;

/// 流水线构建器
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    steps: Vec<PipelineStep>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加步骤
    pub fn step(
        mut self,
        agent_kind: AgentKind,
        action: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        self.steps.push(PipelineStep::new(agent_kind, action, input));
        self
    }

    /// 让最近添加的步骤依赖 `index`
    pub fn depends_on(mut self, index: usize) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.depends_on_step = Some(index);
        }
        self
    }

    /// 让最近添加的步骤依赖前一步
    pub fn depends_on_previous(self) -> Self {
        match self.steps.len() {
            0 | 1 => self,
            n => self.depends_on(n - 2),
        }
    }

    /// 给最近添加的步骤设置额外输入
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.inputs.insert(key.into(), value.into());
        }
        self
    }

    pub fn push(mut self, step: PipelineStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 构建步骤列表
    pub fn build(self) -> Result<Vec<PipelineStep>, WorkflowError> {
        if self.steps.is_empty() {
            return Err(WorkflowError::EmptyPipeline);
        }
        validate_steps(&self.steps)?;
        Ok(self.steps)
    }
}

/// 每个 depends_on_step 必须严格小于所在下标
pub fn validate_steps(steps: &[PipelineStep]) -> Result<(), WorkflowError> {
    for (index, step) in steps.iter().enumerate() {
        if let Some(dep) = step.depends_on_step {
            if dep >= index {
                return Err(WorkflowError::InvalidDependency {
                    step: index,
                    depends_on: dep,
                });
            }
        }
    }
    Ok(())
}
