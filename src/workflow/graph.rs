//! 步骤依赖图
//!
//! 依赖只指向更早的步骤，所以按下标顺序执行就是拓扑序；这里只记录每步结果并回答
//! "某步的依赖是否满足"。

use std::collections::HashMap;

use crate::workflow::types::*;

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    /// 尚未执行
    Waiting,
    Completed,
    Failed,
    /// 因依赖不满足而跳过
    Skipped,
}

/// 依赖检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyCheck {
    /// 无依赖或依赖已成功，附带可注入的上游下标
    Ready(Option<usize>),
    /// 依赖步骤失败或被跳过
    Failed(usize),
    /// 依赖下标越界或不早于自身
    Missing(usize),
}

impl DependencyCheck {
    /// 跳过原因（步骤号从 1 开始）
    pub fn skip_reason(&self) -> Option<String> {
        match self {
            DependencyCheck::Ready(_) => None,
            DependencyCheck::Failed(dep) => {
                Some(format!("Skipped: depends on step {} which failed", dep + 1))
            }
            DependencyCheck::Missing(dep) => Some(format!(
                "Skipped: depends on step {} which does not exist",
                dep + 1
            )),
        }
    }
}

/// 步骤依赖图
pub struct StepGraph {
    /// 邻接表：步骤下标 -> 依赖它的步骤
    pub dependents: HashMap<usize, Vec<usize>>,
    states: Vec<StepState>,
    depends_on: Vec<Option<usize>>,
}

impl StepGraph {
    pub fn new(steps: &[PipelineStep]) -> Self {
        let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
        for (index, step) in steps.iter().enumerate() {
            if let Some(dep) = step.depends_on_step {
                dependents.entry(dep).or_default().push(index);
            }
        }

        Self {
            dependents,
            states: vec![StepState::Waiting; steps.len()],
            depends_on: steps.iter().map(|s| s.depends_on_step).collect(),
        }
    }

    pub fn state(&self, index: usize) -> Option<StepState> {
        self.states.get(index).copied()
    }

    /// 检查 `index` 的依赖
    pub fn check(&self, index: usize) -> DependencyCheck {
        let Some(dep) = self.depends_on.get(index).copied().flatten() else {
            return DependencyCheck::Ready(None);
        };
        if dep >= index || dep >= self.states.len() {
            return DependencyCheck::Missing(dep);
        }
        match self.states[dep] {
            StepState::Completed => DependencyCheck::Ready(Some(dep)),
            StepState::Failed | StepState::Skipped => DependencyCheck::Failed(dep),
            // 依赖更早，按顺序执行时不会出现
            StepState::Waiting => DependencyCheck::Missing(dep),
        }
    }

    pub fn mark(&mut self, index: usize, state: StepState) {
        if let Some(slot) = self.states.get_mut(index) {
            *slot = state;
        }
    }

    /// 最近一个已完成步骤（用于无显式依赖时的输出注入）
    pub fn last_completed_before(&self, index: usize) -> Option<usize> {
        (0..index.min(self.states.len()))
            .rev()
            .find(|&i| self.states[i] == StepState::Completed)
    }
}
