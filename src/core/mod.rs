//! 核心：错误类型、兜底恢复、时间源、共享类型

pub mod clock;
pub mod error;
pub mod recovery;
pub mod types;

pub use clock::{now_ms, Clock, ManualClock, SystemClock};
pub use error::{panic_message, CapabilityError, InferenceError, OrchestratorError, StoreError};
pub use recovery::{RecoveryAction, RecoveryEngine, FALLBACK_SYSTEM_PROMPT, STATIC_APOLOGY};
pub use types::AgentKind;
