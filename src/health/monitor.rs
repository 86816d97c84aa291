//! Agent 健康监控
//!
//! 每个 Agent 一个追踪器：心跳、错误计数、最近错误。状态机：
//! 从未活动（健康）→ 健康（心跳在超时窗口内）→ 过期（有过活动且心跳超时）→
//! 需重启（错误数达到阈值，与心跳无关）。
//!
//! 错误计数经过指数退避门控：距上次计入的错误不足 base × 2^(count-1)（封顶 max）时不计入，
//! 避免错误风暴瞬间触发重启阈值。
//!
//! Agent 集合小且固定，追踪表用一把粗粒度锁；每次变更后通过 watch 通道重新发布快照。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::HealthSection;
use crate::core::{AgentKind, Clock, SystemClock};

pub const DEFAULT_RESTART_THRESHOLD: u32 = 5;
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: i64 = 5 * 60 * 1000;
pub const DEFAULT_BACKOFF_BASE_MS: i64 = 1_000;
pub const DEFAULT_BACKOFF_MAX_MS: i64 = 60_000;

/// 监控参数
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub heartbeat_timeout_ms: i64,
    pub restart_threshold: u32,
    pub backoff_base_ms: i64,
    pub backoff_max_ms: i64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
            restart_threshold: DEFAULT_RESTART_THRESHOLD,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
        }
    }
}

impl From<&HealthSection> for HealthConfig {
    fn from(section: &HealthSection) -> Self {
        Self {
            heartbeat_timeout_ms: section.heartbeat_timeout_ms as i64,
            restart_threshold: section.restart_threshold.max(1),
            backoff_base_ms: section.backoff_base_ms as i64,
            backoff_max_ms: section.backoff_max_ms as i64,
        }
    }
}

/// 单个 Agent 的可变追踪状态，只在监控器内部持有
#[derive(Debug, Clone)]
struct AgentTracker {
    last_heartbeat_ms: Option<i64>,
    error_count: u32,
    last_error: Option<String>,
    last_error_time_ms: i64,
    registered_at_ms: i64,
    had_activity: bool,
}

impl AgentTracker {
    fn new(now: i64) -> Self {
        Self {
            last_heartbeat_ms: None,
            error_count: 0,
            last_error: None,
            last_error_time_ms: 0,
            registered_at_ms: now,
            had_activity: false,
        }
    }
}

/// 对外暴露的只读快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentStatus {
    pub agent_kind: AgentKind,
    pub is_healthy: bool,
    pub last_heartbeat_ms: Option<i64>,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub uptime_ms: i64,
    pub needs_restart: bool,
}

pub struct HealthMonitor {
    trackers: Mutex<HashMap<AgentKind, AgentTracker>>,
    config: HealthConfig,
    clock: Arc<dyn Clock>,
    snapshot_tx: watch::Sender<Vec<AgentStatus>>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: HealthConfig, clock: Arc<dyn Clock>) -> Self {
        let (snapshot_tx, _) = watch::channel(Vec::new());
        Self {
            trackers: Mutex::new(HashMap::new()),
            config,
            clock,
            snapshot_tx,
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// 显式登记（从未活动状态，视为健康）
    pub fn register(&self, agent: AgentKind) {
        let now = self.clock.now_ms();
        {
            let mut trackers = self.trackers.lock().unwrap_or_else(|e| e.into_inner());
            trackers.entry(agent).or_insert_with(|| AgentTracker::new(now));
        }
        self.publish();
    }

    pub fn record_heartbeat(&self, agent: AgentKind) {
        let now = self.clock.now_ms();
        {
            let mut trackers = self.trackers.lock().unwrap_or_else(|e| e.into_inner());
            let tracker = trackers.entry(agent).or_insert_with(|| AgentTracker::new(now));
            tracker.last_heartbeat_ms = Some(now);
            tracker.had_activity = true;
        }
        self.publish();
    }

    /// 记录错误；返回是否通过退避门控被计入
    pub fn record_error(&self, agent: AgentKind, error: &str) -> bool {
        let now = self.clock.now_ms();
        let admitted = {
            let mut trackers = self.trackers.lock().unwrap_or_else(|e| e.into_inner());
            let tracker = trackers.entry(agent).or_insert_with(|| AgentTracker::new(now));
            tracker.had_activity = true;

            if tracker.error_count > 0 {
                let window = self.backoff_window(tracker.error_count);
                if now - tracker.last_error_time_ms < window {
                    tracing::debug!(
                        agent = %agent,
                        window_ms = window,
                        "error suppressed by backoff"
                    );
                    return false;
                }
            }

            tracker.error_count += 1;
            tracker.last_error = Some(error.to_string());
            tracker.last_error_time_ms = now;
            if tracker.error_count == self.config.restart_threshold {
                tracing::warn!(agent = %agent, errors = tracker.error_count, "agent flagged for restart");
            }
            true
        };
        self.publish();
        admitted
    }

    /// 清空计数并重启运行时间
    pub fn reset_agent(&self, agent: AgentKind) {
        let now = self.clock.now_ms();
        {
            let mut trackers = self.trackers.lock().unwrap_or_else(|e| e.into_inner());
            trackers.insert(agent, AgentTracker::new(now));
        }
        tracing::info!(agent = %agent, "agent health reset");
        self.publish();
    }

    pub fn status(&self, agent: AgentKind) -> Option<AgentStatus> {
        let now = self.clock.now_ms();
        let trackers = self.trackers.lock().unwrap_or_else(|e| e.into_inner());
        trackers.get(&agent).map(|t| self.derive(agent, t, now))
    }

    /// 全部已追踪 Agent 的快照，按种类排序
    pub fn all_statuses(&self) -> Vec<AgentStatus> {
        let now = self.clock.now_ms();
        let trackers = self.trackers.lock().unwrap_or_else(|e| e.into_inner());
        let mut statuses: Vec<_> = trackers
            .iter()
            .map(|(agent, t)| self.derive(*agent, t, now))
            .collect();
        statuses.sort_by_key(|s| s.agent_kind);
        statuses
    }

    /// 周期性检查：重新计算心跳是否过期并发布快照；只记录日志，不改计数
    pub fn perform_health_check(&self) -> Vec<AgentStatus> {
        let statuses = self.all_statuses();
        for status in statuses.iter().filter(|s| !s.is_healthy) {
            tracing::warn!(
                agent = %status.agent_kind,
                errors = status.error_count,
                needs_restart = status.needs_restart,
                "agent unhealthy"
            );
        }
        self.snapshot_tx.send_replace(statuses.clone());
        statuses
    }

    /// 没有不健康的 Agent 即为健康（未追踪任何 Agent 时也为健康）
    pub fn is_system_healthy(&self) -> bool {
        self.all_statuses().iter().all(|s| s.is_healthy)
    }

    /// 每个 Agent 一行的文本报告
    pub fn status_report(&self) -> String {
        let statuses = self.all_statuses();
        let mut lines = vec![format!("Agent health ({} monitored):", statuses.len())];
        for s in &statuses {
            let tag = if s.is_healthy { "HEALTHY" } else { "UNHEALTHY" };
            let heartbeat = s
                .last_heartbeat_ms
                .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string());
            let restart = if s.needs_restart { "YES" } else { "no" };
            lines.push(format!(
                "[{tag}] {} | last heartbeat: {heartbeat} | errors: {} | restart: {restart}",
                s.agent_kind, s.error_count
            ));
        }
        lines.join("\n")
    }

    /// 订阅快照（每次变更后重新发布）
    pub fn subscribe(&self) -> watch::Receiver<Vec<AgentStatus>> {
        self.snapshot_tx.subscribe()
    }

    /// 启动后台周期检查，直到 token 被取消
    pub fn spawn_periodic_check(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("health check loop stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        monitor.perform_health_check();
                    }
                }
            }
        })
    }

    fn backoff_window(&self, error_count: u32) -> i64 {
        let exponent = error_count.saturating_sub(1).min(30);
        self.config
            .backoff_base_ms
            .saturating_mul(1i64 << exponent)
            .min(self.config.backoff_max_ms)
    }

    fn derive(&self, agent: AgentKind, t: &AgentTracker, now: i64) -> AgentStatus {
        let needs_restart = t.error_count >= self.config.restart_threshold;
        let reference = t.last_heartbeat_ms.unwrap_or(t.registered_at_ms);
        let stale = t.had_activity && now - reference > self.config.heartbeat_timeout_ms;
        AgentStatus {
            agent_kind: agent,
            is_healthy: !needs_restart && !stale,
            last_heartbeat_ms: t.last_heartbeat_ms,
            error_count: t.error_count,
            last_error: t.last_error.clone(),
            uptime_ms: now - t.registered_at_ms,
            needs_restart,
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.all_statuses());
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}
