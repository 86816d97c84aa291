//! 推理层：服务抽象与实现（Noop / Mock）

pub mod mock;
pub mod traits;

pub use mock::{MockCall, MockInference};
pub use traits::{InferenceService, NoopInference};
