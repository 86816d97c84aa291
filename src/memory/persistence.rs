//! 对话持久化接口与内存实现
//!
//! 持久化由外部协作方负责；本层只需要追加、按最新优先查询、按时间删除。

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::StoreError;
use crate::memory::ConversationTurn;

/// 对话轮次存储
#[async_trait]
pub trait TurnStore: Send + Sync {
    async fn append(&self, turn: ConversationTurn) -> Result<(), StoreError>;

    /// 最近 limit 条，最新在前
    async fn recent(&self, limit: usize) -> Result<Vec<ConversationTurn>, StoreError>;

    /// 删除时间戳早于 cutoff_ms 的轮次，返回删除数量
    async fn delete_older_than(&self, cutoff_ms: i64) -> Result<usize, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}

/// 进程内存储（未配置数据库时使用）
#[derive(Debug, Default)]
pub struct InMemoryTurnStore {
    turns: Mutex<Vec<ConversationTurn>>,
}

impl InMemoryTurnStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.turns.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.turns.lock().await.is_empty()
    }
}

#[async_trait]
impl TurnStore for InMemoryTurnStore {
    async fn append(&self, turn: ConversationTurn) -> Result<(), StoreError> {
        self.turns.lock().await.push(turn);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ConversationTurn>, StoreError> {
        let turns = self.turns.lock().await;
        Ok(turns.iter().rev().take(limit).cloned().collect())
    }

    async fn delete_older_than(&self, cutoff_ms: i64) -> Result<usize, StoreError> {
        let mut turns = self.turns.lock().await;
        let before = turns.len();
        turns.retain(|t| t.timestamp_ms >= cutoff_ms);
        Ok(before - turns.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.turns.lock().await.clear();
        Ok(())
    }
}
