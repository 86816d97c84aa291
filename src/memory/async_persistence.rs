//! 异步 SQLite 对话存储
//!
//! 使用 sqlx 连接池，避免在 async 上下文中阻塞。需要启用 `async-sqlite` feature。

#[cfg(feature = "async-sqlite")]
mod sqlx_impl {
    use std::path::Path;

    use async_trait::async_trait;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
    use sqlx::Row;

    use crate::core::{AgentKind, StoreError};
    use crate::memory::{ConversationTurn, Role, TurnStore};

    /// SQLite 对话存储
    pub struct SqliteTurnStore {
        pool: SqlitePool,
    }

    impl SqliteTurnStore {
        pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
            let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&db_url)
                .await?;

            let store = Self { pool };
            store.init_tables().await?;

            Ok(store)
        }

        /// 从连接池创建
        pub fn from_pool(pool: SqlitePool) -> Self {
            Self { pool }
        }

        async fn init_tables(&self) -> Result<(), StoreError> {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS turns (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    agent_kind TEXT NOT NULL,
                    timestamp_ms INTEGER NOT NULL
                )",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query("CREATE INDEX IF NOT EXISTS idx_turns_timestamp ON turns(timestamp_ms)")
                .execute(&self.pool)
                .await?;

            Ok(())
        }

        pub async fn close(&self) {
            self.pool.close().await;
        }
    }

    #[async_trait]
    impl TurnStore for SqliteTurnStore {
        async fn append(&self, turn: ConversationTurn) -> Result<(), StoreError> {
            sqlx::query(
                "INSERT INTO turns (role, content, agent_kind, timestamp_ms) VALUES (?, ?, ?, ?)",
            )
            .bind(turn.role.as_str())
            .bind(&turn.content)
            .bind(turn.agent_kind.as_str())
            .bind(turn.timestamp_ms)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn recent(&self, limit: usize) -> Result<Vec<ConversationTurn>, StoreError> {
            let rows = sqlx::query(
                "SELECT role, content, agent_kind, timestamp_ms FROM turns
                 ORDER BY timestamp_ms DESC, id DESC LIMIT ?",
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

            let turns = rows
                .into_iter()
                .map(|row| {
                    let role: String = row.get("role");
                    let agent_kind: String = row.get("agent_kind");
                    ConversationTurn {
                        role: Role::parse(&role),
                        content: row.get("content"),
                        agent_kind: AgentKind::parse(&agent_kind).unwrap_or(AgentKind::Router),
                        timestamp_ms: row.get("timestamp_ms"),
                    }
                })
                .collect();

            Ok(turns)
        }

        async fn delete_older_than(&self, cutoff_ms: i64) -> Result<usize, StoreError> {
            let result = sqlx::query("DELETE FROM turns WHERE timestamp_ms < ?")
                .bind(cutoff_ms)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() as usize)
        }

        async fn clear(&self) -> Result<(), StoreError> {
            sqlx::query("DELETE FROM turns").execute(&self.pool).await?;
            Ok(())
        }
    }
}

#[cfg(feature = "async-sqlite")]
pub use sqlx_impl::SqliteTurnStore;
