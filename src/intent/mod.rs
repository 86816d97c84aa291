//! 意图识别：模型分类 + 确定性关键词阶梯

pub mod classifier;
pub mod keywords;
pub mod types;

pub use classifier::{IntentClassifier, DEFAULT_CLASSIFICATION_CONTEXT_TURNS};
pub use keywords::KeywordCategory;
pub use types::Intent;
