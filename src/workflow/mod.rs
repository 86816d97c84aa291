//! 复合指令流水线：检测、分解、顺序执行

pub mod builder;
pub mod decompose;
pub mod detect;
pub mod engine;
pub mod executor;
pub mod graph;
pub mod types;

pub use builder::{validate_steps, PipelineBuilder};
pub use decompose::Decomposer;
pub use detect::is_compound_command;
pub use engine::{template_summary, TaskPipeline, EMPTY_PIPELINE_SUMMARY};
pub use executor::{CapabilityExecutor, StepExecutor};
pub use graph::{DependencyCheck, StepGraph, StepState};
pub use types::*;
