//! 事件层：跨组件事件类型与总线

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventSubscription, DEFAULT_CHANNEL_CAPACITY, DEFAULT_HISTORY_CAPACITY};
pub use types::{AgentEvent, EventKind};
