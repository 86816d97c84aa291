//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CASTOR__*` 覆盖（双下划线表示嵌套，如 `CASTOR__HEALTH__RESTART_THRESHOLD=3`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub conversation: ConversationSection,
    pub health: HealthSection,
    pub events: EventsSection,
    pub inference: InferenceSection,
    pub pipeline: PipelineSection,
    pub storage: StorageSection,
}

/// [conversation] 段：保留天数与上下文轮数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConversationSection {
    pub retention_days: u32,
    /// 意图分类时带给模型的最近轮数
    pub classification_context_turns: usize,
    /// 通用问答时带给模型的最近轮数
    pub context_turns: usize,
    /// 后台剪枝间隔（秒）
    pub prune_interval_secs: u64,
}

impl Default for ConversationSection {
    fn default() -> Self {
        Self {
            retention_days: 7,
            classification_context_turns: 3,
            context_turns: 10,
            prune_interval_secs: 60 * 60,
        }
    }
}

/// [health] 段：心跳超时、重启阈值、错误退避
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthSection {
    pub heartbeat_timeout_ms: u64,
    pub restart_threshold: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// 周期检查间隔（秒）
    pub check_interval_secs: u64,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            heartbeat_timeout_ms: 5 * 60 * 1000,
            restart_threshold: 5,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
            check_interval_secs: 60,
        }
    }
}

/// [events] 段：历史容量与订阅缓冲
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventsSection {
    pub history_capacity: usize,
    pub channel_capacity: usize,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            channel_capacity: 256,
        }
    }
}

/// 单类模型调用的采样参数；只覆盖其中一项时另一项取 Default
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl SamplingParams {
    pub const fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens,
            temperature,
        }
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self::new(256, 0.7)
    }
}

/// [inference] 段：各调用点的 token 上限与温度
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceSection {
    pub classify: SamplingParams,
    pub decompose: SamplingParams,
    pub summary: SamplingParams,
    pub query: SamplingParams,
    pub fallback: SamplingParams,
}

impl Default for InferenceSection {
    fn default() -> Self {
        Self {
            classify: SamplingParams::new(16, 0.1),
            decompose: SamplingParams::new(256, 0.2),
            summary: SamplingParams::new(200, 0.5),
            query: SamplingParams::new(512, 0.7),
            fallback: SamplingParams::new(256, 0.7),
        }
    }
}

/// [pipeline] 段：模板摘要中每步详情的截断长度
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub summary_detail_chars: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            summary_detail_chars: 100,
        }
    }
}

/// [storage] 段：对话数据库路径（需 async-sqlite feature）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageSection {
    pub database_path: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 CASTOR__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CASTOR__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CASTOR")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.conversation.retention_days, 7);
        assert_eq!(cfg.conversation.classification_context_turns, 3);
        assert_eq!(cfg.health.restart_threshold, 5);
        assert_eq!(cfg.events.history_capacity, 100);
        assert!(cfg.inference.classify.temperature < 0.3);
        assert!(cfg.storage.database_path.is_none());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("castor.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[health]\nrestart_threshold = 3\n\n[events]\nhistory_capacity = 10").unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.health.restart_threshold, 3);
        assert_eq!(cfg.health.backoff_base_ms, 1_000);
        assert_eq!(cfg.events.history_capacity, 10);
        assert_eq!(cfg.events.channel_capacity, 256);
    }

    #[test]
    fn test_partial_sampling_override() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[inference.classify]\ntemperature = 0.2\n\n[conversation]\nprune_interval_secs = 30",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.inference.classify.temperature, 0.2);
        assert_eq!(cfg.inference.classify.max_tokens, SamplingParams::default().max_tokens);
        assert_eq!(cfg.inference.decompose, SamplingParams::new(256, 0.2));
        assert_eq!(cfg.conversation.prune_interval_secs, 30);
        assert_eq!(cfg.conversation.retention_days, 7);
    }
}
