//! 流水线引擎
//!
//! 步骤严格按顺序执行，不并行：第 N 步的输出在第 N+1 步开始前可用。
//! 依赖失败或越界的步骤不执行，记为失败并继续后面的独立步骤；整体成功是各步成功的逻辑与。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::Instrument;

use crate::capability::Capabilities;
use crate::config::{AppConfig, SamplingParams};
use crate::core::{panic_message, OrchestratorError};
use crate::health::HealthMonitor;
use crate::llm::InferenceService;
use crate::workflow::decompose::Decomposer;
use crate::workflow::detect;
use crate::workflow::executor::{CapabilityExecutor, StepExecutor};
use crate::workflow::graph::{DependencyCheck, StepGraph, StepState};
use crate::workflow::types::*;

/// 模板摘要中每步详情的默认截断长度
pub const DEFAULT_SUMMARY_DETAIL_CHARS: usize = 100;

/// 空流水线的摘要
pub const EMPTY_PIPELINE_SUMMARY: &str = "Nothing to do.";

const SUMMARY_SYSTEM_PROMPT: &str = "You are an on-device assistant. Several tasks were just completed for the user. \
Tell the user what was done in one or two short, natural sentences.";

pub struct TaskPipeline {
    decomposer: Decomposer,
    executor: Arc<dyn StepExecutor>,
    inference: Arc<dyn InferenceService>,
    summary_params: SamplingParams,
    summary_detail_chars: usize,
    health: Option<Arc<HealthMonitor>>,
}

impl TaskPipeline {
    pub fn new(inference: Arc<dyn InferenceService>, capabilities: Capabilities) -> Self {
        Self {
            decomposer: Decomposer::new(inference.clone()),
            executor: Arc::new(CapabilityExecutor::new(capabilities, inference.clone())),
            inference,
            summary_params: SamplingParams::new(200, 0.5),
            summary_detail_chars: DEFAULT_SUMMARY_DETAIL_CHARS,
            health: None,
        }
    }

    /// 按配置中的采样参数与截断长度创建
    pub fn from_config(
        inference: Arc<dyn InferenceService>,
        capabilities: Capabilities,
        cfg: &AppConfig,
    ) -> Self {
        Self {
            decomposer: Decomposer::new(inference.clone()).with_params(cfg.inference.decompose),
            executor: Arc::new(
                CapabilityExecutor::new(capabilities, inference.clone())
                    .with_params(cfg.inference.query),
            ),
            inference,
            summary_params: cfg.inference.summary,
            summary_detail_chars: cfg.pipeline.summary_detail_chars,
            health: None,
        }
    }

    /// 替换步骤执行器
    pub fn with_executor(mut self, executor: Arc<dyn StepExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// 每步结果上报健康监控
    pub fn with_health(mut self, health: Arc<HealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn is_compound_command(&self, text: &str) -> bool {
        detect::is_compound_command(text)
    }

    pub async fn decompose(&self, text: &str) -> Vec<PipelineStep> {
        self.decomposer.decompose(text).await
    }

    /// 分解并执行
    pub async fn run(&self, text: &str) -> PipelineResult {
        let steps = self.decompose(text).await;
        self.execute_pipeline(steps).await
    }

    /// 顺序执行全部步骤
    pub async fn execute_pipeline(&self, steps: Vec<PipelineStep>) -> PipelineResult {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("pipeline", run_id = %run_id, steps = steps.len());
        self.execute_inner(steps).instrument(span).await
    }

    async fn execute_inner(&self, steps: Vec<PipelineStep>) -> PipelineResult {
        if steps.is_empty() {
            return PipelineResult {
                success: true,
                steps: Vec::new(),
                summary: EMPTY_PIPELINE_SUMMARY.to_string(),
            };
        }

        let mut graph = StepGraph::new(&steps);
        let mut results: Vec<StepResult> = Vec::with_capacity(steps.len());

        for (index, mut step) in steps.into_iter().enumerate() {
            let check = graph.check(index);
            if let Some(reason) = check.skip_reason() {
                tracing::warn!(step = index + 1, %reason, "skipping pipeline step");
                graph.mark(index, StepState::Skipped);
                results.push(StepResult::failed(step, reason));
                continue;
            }

            let upstream = match check {
                DependencyCheck::Ready(Some(dep)) => Some(dep),
                _ => graph.last_completed_before(index),
            };
            if let Some(up) = upstream {
                step.inputs
                    .insert(PREVIOUS_OUTPUT_KEY.to_string(), results[up].output.clone());
            }
            let input = resolve_input(&step);

            tracing::info!(
                step = index + 1,
                agent = %step.agent_kind,
                action = %step.action,
                "running pipeline step"
            );
            let outcome = AssertUnwindSafe(self.executor.execute(&step, &input))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(OrchestratorError::Panicked(panic_message(&*panic))));

            match outcome {
                Ok(output) => {
                    if let Some(health) = &self.health {
                        health.record_heartbeat(step.agent_kind);
                    }
                    graph.mark(index, StepState::Completed);
                    results.push(StepResult::ok(step, output));
                }
                Err(e) => {
                    tracing::warn!(step = index + 1, error = %e, "pipeline step failed");
                    if let Some(health) = &self.health {
                        health.record_error(step.agent_kind, &e.to_string());
                    }
                    graph.mark(index, StepState::Failed);
                    results.push(StepResult::failed(step, e.to_string()));
                }
            }
        }

        let success = results.iter().all(|r| r.success);
        let summary = self.summarize(&results).await;
        tracing::info!(
            success,
            succeeded = results.iter().filter(|r| r.success).count(),
            total = results.len(),
            "pipeline finished"
        );

        PipelineResult {
            success,
            steps: results,
            summary,
        }
    }

    /// 单步直接返回输出或错误；多步优先模型汇总，否则用模板
    async fn summarize(&self, results: &[StepResult]) -> String {
        if let [only] = results {
            return if only.success {
                only.output.clone()
            } else {
                only.error.clone().unwrap_or_default()
            };
        }

        let all_ok = results.iter().all(|r| r.success);
        if all_ok && self.inference.is_loaded() {
            let prompt = results
                .iter()
                .enumerate()
                .map(|(i, r)| format!("{}. {}", i + 1, r.output))
                .collect::<Vec<_>>()
                .join("\n");
            match self
                .inference
                .generate(
                    &prompt,
                    SUMMARY_SYSTEM_PROMPT,
                    self.summary_params.max_tokens,
                    self.summary_params.temperature,
                )
                .await
            {
                Ok(text) if !text.trim().is_empty() => return text.trim().to_string(),
                Ok(_) => tracing::debug!("empty model summary, using template"),
                Err(e) => tracing::debug!(error = %e, "model summary failed, using template"),
            }
        }

        template_summary(results, self.summary_detail_chars)
    }
}

/// "Completed N of M steps:" + 每步 Done/Failed 行
pub fn template_summary(results: &[StepResult], detail_chars: usize) -> String {
    let done = results.iter().filter(|r| r.success).count();
    let mut lines = vec![format!("Completed {} of {} steps:", done, results.len())];
    for (i, r) in results.iter().enumerate() {
        let line = if r.success {
            format!("{}. Done: {}", i + 1, truncate(&r.output, detail_chars))
        } else {
            let err = r.error.as_deref().unwrap_or("unknown error");
            format!("{}. Failed: {}", i + 1, truncate(err, detail_chars))
        };
        lines.push(line);
    }
    lines.join("\n")
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

/// 把 PREV_OUTPUT 替换成上游输出；显式依赖但没有标记时把上游输出附在后面
fn resolve_input(step: &PipelineStep) -> String {
    let input = step.input();
    let previous = step.previous_output();
    if input.contains(PREV_OUTPUT_MARKER) {
        input.replace(PREV_OUTPUT_MARKER, previous.unwrap_or(""))
    } else {
        match (step.depends_on_step, previous) {
            (Some(_), Some(prev)) if !prev.is_empty() => format!("{}: {}", input, prev),
            _ => input.to_string(),
        }
    }
}
