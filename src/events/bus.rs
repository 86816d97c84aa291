//! 事件总线：有界历史 + 广播
//!
//! emit 先在锁内写入环形历史（满时淘汰最旧），再通过 broadcast 通道扇出。
//! broadcast 自带缓冲，慢订阅者只会 Lagged，不会阻塞发送方。

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::events::{AgentEvent, EventKind};

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

pub struct EventBus {
    history: Mutex<VecDeque<AgentEvent>>,
    capacity: usize,
    tx: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    /// history_capacity 为历史上限，channel_capacity 为每个订阅者的缓冲深度
    pub fn new(history_capacity: usize, channel_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            capacity: history_capacity,
            tx,
        }
    }

    /// 写入历史并广播；没有订阅者时只写历史
    pub fn emit(&self, event: AgentEvent) {
        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if self.capacity > 0 {
                while history.len() >= self.capacity {
                    history.pop_front();
                }
                history.push_back(event.clone());
            }
        }
        tracing::debug!(kind = ?event.kind(), "event emitted");
        let _ = self.tx.send(event);
    }

    /// 订阅全部事件
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.tx.subscribe()
    }

    /// 只订阅指定种类的事件
    pub fn subscribe_filtered(&self, kinds: impl IntoIterator<Item = EventKind>) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            kinds: Some(kinds.into_iter().collect()),
        }
    }

    /// 历史快照（副本，修改不影响总线）
    pub fn get_history(&self) -> Vec<AgentEvent> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// 最近 n 条，时间正序
    pub fn recent(&self, n: usize) -> Vec<AgentEvent> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let skip = history.len().saturating_sub(n);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn clear_history(&self) {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_CHANNEL_CAPACITY)
    }
}

/// 带种类过滤的订阅
pub struct EventSubscription {
    rx: broadcast::Receiver<AgentEvent>,
    kinds: Option<HashSet<EventKind>>,
}

impl EventSubscription {
    fn accepts(&self, event: &AgentEvent) -> bool {
        self.kinds
            .as_ref()
            .map(|k| k.contains(&event.kind()))
            .unwrap_or(true)
    }

    /// 等待下一条匹配事件；总线关闭时返回 None，落后时跳过丢失部分继续
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// 非阻塞取下一条匹配事件
    pub fn try_recv(&mut self) -> Option<AgentEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
