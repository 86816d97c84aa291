//! Castor - 端侧助手编排层
//!
//! 模块划分：
//! - **agent**: 组合根（组装组件、选择对话存储、处理单条消息）
//! - **capability**: 能力处理器接口（消息、媒体、提醒、简报）与 Mock
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、时钟、Agent 种类、兜底恢复
//! - **events**: 带有界历史的事件总线
//! - **health**: 心跳 / 退避错误计数 / 重启标记
//! - **intent**: 意图类型、关键词阶梯、模型分类
//! - **llm**: 推理服务接口与 Mock
//! - **memory**: 对话记录与持久化（内存 / SQLite）
//! - **observability**: tracing 初始化
//! - **router**: 请求入口与路由表
//! - **workflow**: 复合指令检测、分解与顺序执行

pub mod agent;
pub mod capability;
pub mod config;
pub mod core;
pub mod events;
pub mod health;
pub mod intent;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod router;
pub mod workflow;

pub use agent::{
    create_agent_components, create_turn_store, process_message, spawn_conversation_pruning,
    spawn_health_check, AgentComponents,
};
pub use router::{Route, Router};
