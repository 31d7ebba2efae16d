use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use closetmind_core::domain::chat::{
    Conversation, ConversationId, NewTurn, Turn, TurnId, TurnRole, UserId,
};

use super::{HistoryStore, RepositoryError};
use crate::DbPool;

pub struct SqlHistoryStore {
    pool: DbPool,
}

impl SqlHistoryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl HistoryStore for SqlHistoryStore {
    async fn create_conversation(
        &self,
        title: &str,
        user_id: Option<UserId>,
    ) -> Result<Conversation, RepositoryError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO conversations (title, user_id, created_at, updated_at)
             VALUES (?, ?, ?, NULL)",
        )
        .bind(title)
        .bind(user_id.map(|id| id.0))
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Conversation {
            id: ConversationId(result.last_insert_rowid()),
            title: title.to_string(),
            user_id,
            created_at,
            updated_at: None,
        })
    }

    async fn find_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, title, user_id, created_at, updated_at
             FROM conversations
             WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(conversation_from_row).transpose()
    }

    async fn update_title(&self, id: ConversationId, title: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE conversations SET title = ? WHERE id = ?")
            .bind(title)
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::ConversationNotFound(id));
        }
        Ok(())
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("DELETE FROM conversations WHERE id = ?").bind(id.0).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::ConversationNotFound(id));
        }
        Ok(())
    }

    async fn append(
        &self,
        conversation_id: ConversationId,
        turn: NewTurn,
    ) -> Result<Turn, RepositoryError> {
        let created_at = Utc::now();
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(created_at)
            .bind(conversation_id.0)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(RepositoryError::ConversationNotFound(conversation_id));
        }

        let inserted = sqlx::query(
            "INSERT INTO turns (conversation_id, role, content, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(conversation_id.0)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Turn {
            id: TurnId(inserted.last_insert_rowid()),
            conversation_id,
            role: turn.role,
            content: turn.content,
            created_at,
        })
    }

    async fn recent(
        &self,
        conversation_id: ConversationId,
        limit: usize,
    ) -> Result<Vec<Turn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, role, content, created_at
             FROM turns
             WHERE conversation_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(conversation_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut turns =
            rows.into_iter().map(turn_from_row).collect::<Result<Vec<_>, RepositoryError>>()?;
        turns.reverse();
        Ok(turns)
    }

    async fn all(&self, conversation_id: ConversationId) -> Result<Vec<Turn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, role, content, created_at
             FROM turns
             WHERE conversation_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(conversation_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(turn_from_row).collect()
    }
}

fn conversation_from_row(row: SqliteRow) -> Result<Conversation, RepositoryError> {
    Ok(Conversation {
        id: ConversationId(row.get::<i64, _>("id")),
        title: row.get::<String, _>("title"),
        user_id: row.get::<Option<i64>, _>("user_id").map(UserId),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<Option<DateTime<Utc>>, _>("updated_at"),
    })
}

fn turn_from_row(row: SqliteRow) -> Result<Turn, RepositoryError> {
    let role = row
        .get::<String, _>("role")
        .parse::<TurnRole>()
        .map_err(RepositoryError::Decode)?;

    Ok(Turn {
        id: TurnId(row.get::<i64, _>("id")),
        conversation_id: ConversationId(row.get::<i64, _>("conversation_id")),
        role,
        content: row.get::<String, _>("content"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}
