// SQLite-backed moderation store.
//
// Tables:
// - moderation_cases: One row per case; at most one pending row per conversation
// - user_blocks: Directed block records, unique per (blocker, target)
// - users: Account view (display data, role, blocked flag)
// - conversations / chat_messages / listings: Collaborator tables this crate
//   reads from (and, for warnings, writes to)

use crate::core::moderation::{
    AccountStore, AuthorKind, BlockMetadata, CaseFilter, CaseId, CaseStatus, ChatMessage,
    Conversation, ListingRecord, ModerationCase, ModerationError, ModerationStore, NewCase,
    NewChatMessage, Pagination, Resolution, UnblockMetadata, UserAccount, UserBlockRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;

fn storage_error(e: impl std::fmt::Display) -> ModerationError {
    ModerationError::StorageError(e.to_string())
}

// Fixed-width UTC timestamps so text ordering matches time ordering.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ModerationError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| storage_error(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_optional_timestamp(
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, ModerationError> {
    raw.as_deref().map(parse_timestamp).transpose()
}

fn parse_column<T>(raw: &str) -> Result<T, ModerationError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(storage_error)
}

pub struct SqliteModerationStore {
    pool: Pool<Sqlite>,
}

// Pool is reference-counted, clones share connections.
impl Clone for SqliteModerationStore {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl SqliteModerationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) a database file and run migrations.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let path_str = database_url.trim_start_matches("sqlite://");
        if !database_url.contains(":memory:") && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        let mut options = SqlitePoolOptions::new();
        if database_url.contains(":memory:") {
            // Every connection would otherwise see its own empty database
            options = options.max_connections(1);
        }
        let pool = options.connect(&conn_str).await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), ModerationError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS moderation_cases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL,
                initiator_id INTEGER NOT NULL,
                counterparty_id INTEGER NOT NULL,
                listing_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                message_content TEXT NOT NULL,
                detected_keywords TEXT NOT NULL DEFAULT '[]',
                risk_level TEXT NOT NULL,
                category TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                resolved_by INTEGER,
                resolved_at TEXT,
                action_type TEXT,
                resolution_reason TEXT,
                resolution_notes TEXT
            );
            "#,
            // Backs the one-pending-case rule; violations surface as
            // DuplicatePendingCase.
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_moderation_cases_pending
                ON moderation_cases(conversation_id) WHERE status = 'pending';
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_moderation_cases_review
                ON moderation_cases(status, risk_level, updated_at);
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS user_blocks (
                blocker_id INTEGER NOT NULL,
                target_id INTEGER NOT NULL,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (blocker_id, target_id)
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                display_name TEXT NOT NULL,
                avatar_key TEXT,
                role TEXT NOT NULL DEFAULT 'user',
                is_blocked BOOLEAN NOT NULL DEFAULT 0,
                blocked_at TEXT,
                blocked_by INTEGER,
                block_reason TEXT,
                unblocked_at TEXT,
                unblocked_by INTEGER
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY,
                listing_id INTEGER NOT NULL,
                initiator_id INTEGER NOT NULL,
                counterparty_id INTEGER NOT NULL,
                hidden_for_initiator BOOLEAN NOT NULL DEFAULT 0,
                hidden_for_counterparty BOOLEAN NOT NULL DEFAULT 0
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL,
                author_id INTEGER NOT NULL,
                author_kind TEXT NOT NULL DEFAULT 'user',
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS listings (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                image_key TEXT
            );
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage_error)?;
        }
        Ok(())
    }

    /// Insert or replace an account row (owned by the profile service upstream).
    pub async fn upsert_account(&self, account: &UserAccount) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, display_name, avatar_key, role, is_blocked,
                blocked_at, blocked_by, block_reason, unblocked_at, unblocked_by
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                avatar_key = excluded.avatar_key,
                role = excluded.role,
                is_blocked = excluded.is_blocked,
                blocked_at = excluded.blocked_at,
                blocked_by = excluded.blocked_by,
                block_reason = excluded.block_reason,
                unblocked_at = excluded.unblocked_at,
                unblocked_by = excluded.unblocked_by
            "#,
        )
        .bind(account.id as i64)
        .bind(&account.display_name)
        .bind(account.avatar_key.as_deref())
        .bind(account.role.as_str())
        .bind(account.is_blocked)
        .bind(account.block.as_ref().map(|b| timestamp(&b.blocked_at)))
        .bind(account.block.as_ref().map(|b| b.blocked_by as i64))
        .bind(account.block.as_ref().map(|b| b.reason.as_str()))
        .bind(account.unblock.as_ref().map(|u| timestamp(&u.unblocked_at)))
        .bind(account.unblock.as_ref().map(|u| u.unblocked_by as i64))
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    pub async fn upsert_conversation(
        &self,
        conversation: &Conversation,
    ) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            INSERT INTO conversations (
                id, listing_id, initiator_id, counterparty_id,
                hidden_for_initiator, hidden_for_counterparty
            )
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                listing_id = excluded.listing_id,
                initiator_id = excluded.initiator_id,
                counterparty_id = excluded.counterparty_id,
                hidden_for_initiator = excluded.hidden_for_initiator,
                hidden_for_counterparty = excluded.hidden_for_counterparty
            "#,
        )
        .bind(conversation.id as i64)
        .bind(conversation.listing_id as i64)
        .bind(conversation.initiator_id as i64)
        .bind(conversation.counterparty_id as i64)
        .bind(conversation.hidden_for_initiator)
        .bind(conversation.hidden_for_counterparty)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    pub async fn upsert_listing(&self, listing: &ListingRecord) -> Result<(), ModerationError> {
        sqlx::query(
            r#"
            INSERT INTO listings (id, title, image_key)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                image_key = excluded.image_key
            "#,
        )
        .bind(listing.id as i64)
        .bind(&listing.title)
        .bind(listing.image_key.as_deref())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    /// Messages in a conversation, oldest first.
    pub async fn messages_for(
        &self,
        conversation_id: u64,
    ) -> Result<Vec<ChatMessage>, ModerationError> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, author_id, author_kind, body, created_at
            FROM chat_messages
            WHERE conversation_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(conversation_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(ChatMessage {
                id: row.get::<i64, _>("id") as u64,
                conversation_id: row.get::<i64, _>("conversation_id") as u64,
                author_id: row.get::<i64, _>("author_id") as u64,
                author_kind: parse_column::<AuthorKind>(&row.get::<String, _>("author_kind"))?,
                body: row.get("body"),
                created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            });
        }
        Ok(messages)
    }
}

fn case_from_row(row: &SqliteRow) -> Result<ModerationCase, ModerationError> {
    let keywords: String = row.get("detected_keywords");
    let detected_keywords: Vec<String> = serde_json::from_str(&keywords).map_err(storage_error)?;
    let status = parse_column::<CaseStatus>(&row.get::<String, _>("status"))?;

    let resolution = match row.get::<Option<i64>, _>("resolved_by") {
        Some(resolved_by) if status.is_terminal() => {
            let resolved_at: String = row.get("resolved_at");
            Some(Resolution {
                resolved_by: resolved_by as u64,
                resolved_at: parse_timestamp(&resolved_at)?,
                action: row
                    .get::<Option<String>, _>("action_type")
                    .as_deref()
                    .map(parse_column)
                    .transpose()?,
                reason: row
                    .get::<Option<String>, _>("resolution_reason")
                    .unwrap_or_default(),
                notes: row.get("resolution_notes"),
            })
        }
        _ => None,
    };

    Ok(ModerationCase {
        id: row.get::<i64, _>("id") as u64,
        conversation_id: row.get::<i64, _>("conversation_id") as u64,
        initiator_id: row.get::<i64, _>("initiator_id") as u64,
        counterparty_id: row.get::<i64, _>("counterparty_id") as u64,
        listing_id: row.get::<i64, _>("listing_id") as u64,
        message_id: row.get::<i64, _>("message_id") as u64,
        message_content: row.get("message_content"),
        detected_keywords,
        risk_level: parse_column(&row.get::<String, _>("risk_level"))?,
        category: parse_column(&row.get::<String, _>("category"))?,
        status,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
        resolution,
    })
}

fn account_from_row(row: &SqliteRow) -> Result<UserAccount, ModerationError> {
    let block = match parse_optional_timestamp(row.get("blocked_at"))? {
        Some(blocked_at) => Some(BlockMetadata {
            blocked_at,
            blocked_by: row.get::<Option<i64>, _>("blocked_by").unwrap_or_default() as u64,
            reason: row
                .get::<Option<String>, _>("block_reason")
                .unwrap_or_default(),
        }),
        None => None,
    };
    let unblock = match parse_optional_timestamp(row.get("unblocked_at"))? {
        Some(unblocked_at) => Some(UnblockMetadata {
            unblocked_at,
            unblocked_by: row
                .get::<Option<i64>, _>("unblocked_by")
                .unwrap_or_default() as u64,
        }),
        None => None,
    };

    Ok(UserAccount {
        id: row.get::<i64, _>("id") as u64,
        display_name: row.get("display_name"),
        avatar_key: row.get("avatar_key"),
        role: parse_column(&row.get::<String, _>("role"))?,
        is_blocked: row.get("is_blocked"),
        block,
        unblock,
    })
}

fn block_from_row(row: &SqliteRow) -> Result<UserBlockRecord, ModerationError> {
    Ok(UserBlockRecord {
        blocker_id: row.get::<i64, _>("blocker_id") as u64,
        target_id: row.get::<i64, _>("target_id") as u64,
        reason: row.get("reason"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

#[async_trait]
impl AccountStore for SqliteModerationStore {
    async fn get_account(&self, user_id: u64) -> Result<Option<UserAccount>, ModerationError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(user_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn mark_blocked(
        &self,
        user_id: u64,
        block: BlockMetadata,
    ) -> Result<(), ModerationError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                is_blocked = 1,
                blocked_at = ?,
                blocked_by = ?,
                block_reason = ?
            WHERE id = ?
            "#,
        )
        .bind(timestamp(&block.blocked_at))
        .bind(block.blocked_by as i64)
        .bind(&block.reason)
        .bind(user_id as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(ModerationError::UserNotFound(user_id));
        }
        Ok(())
    }

    async fn mark_unblocked(
        &self,
        user_id: u64,
        unblock: UnblockMetadata,
    ) -> Result<(), ModerationError> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                is_blocked = 0,
                unblocked_at = ?,
                unblocked_by = ?
            WHERE id = ?
            "#,
        )
        .bind(timestamp(&unblock.unblocked_at))
        .bind(unblock.unblocked_by as i64)
        .bind(user_id as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(ModerationError::UserNotFound(user_id));
        }
        Ok(())
    }

    async fn insert_block_if_absent(
        &self,
        record: UserBlockRecord,
    ) -> Result<bool, ModerationError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_blocks (blocker_id, target_id, reason, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(blocker_id, target_id) DO NOTHING
            "#,
        )
        .bind(record.blocker_id as i64)
        .bind(record.target_id as i64)
        .bind(&record.reason)
        .bind(timestamp(&record.created_at))
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_block(
        &self,
        blocker_id: u64,
        target_id: u64,
    ) -> Result<Option<UserBlockRecord>, ModerationError> {
        let row = sqlx::query("SELECT * FROM user_blocks WHERE blocker_id = ? AND target_id = ?")
            .bind(blocker_id as i64)
            .bind(target_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(block_from_row).transpose()
    }

    async fn delete_block(&self, blocker_id: u64, target_id: u64) -> Result<bool, ModerationError> {
        let result = sqlx::query("DELETE FROM user_blocks WHERE blocker_id = ? AND target_id = ?")
            .bind(blocker_id as i64)
            .bind(target_id as i64)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_blocks_targeting(&self, target_id: u64) -> Result<u64, ModerationError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM user_blocks WHERE target_id = ?")
            .bind(target_id as i64)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.get::<i64, _>("n") as u64)
    }
}

#[async_trait]
impl ModerationStore for SqliteModerationStore {
    async fn find_pending_case(
        &self,
        conversation_id: u64,
    ) -> Result<Option<ModerationCase>, ModerationError> {
        let row = sqlx::query(
            "SELECT * FROM moderation_cases WHERE conversation_id = ? AND status = 'pending'",
        )
        .bind(conversation_id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.as_ref().map(case_from_row).transpose()
    }

    async fn insert_case(&self, case: NewCase) -> Result<CaseId, ModerationError> {
        let conversation_id = case.conversation_id;
        let keywords = serde_json::to_string(&case.detected_keywords).map_err(storage_error)?;
        let created_at = timestamp(&case.created_at);

        let result = sqlx::query(
            r#"
            INSERT INTO moderation_cases (
                conversation_id, initiator_id, counterparty_id, listing_id,
                message_id, message_content, detected_keywords, risk_level,
                category, status, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(conversation_id as i64)
        .bind(case.initiator_id as i64)
        .bind(case.counterparty_id as i64)
        .bind(case.listing_id as i64)
        .bind(case.message_id as i64)
        .bind(&case.message_content)
        .bind(&keywords)
        .bind(case.risk_level.as_str())
        .bind(case.category.as_str())
        .bind(&created_at)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            // idx_moderation_cases_pending
            Some(db) if db.is_unique_violation() => {
                ModerationError::DuplicatePendingCase(conversation_id)
            }
            _ => storage_error(&e),
        })?;

        Ok(result.last_insert_rowid() as u64)
    }

    async fn save_case(&self, case: &ModerationCase) -> Result<(), ModerationError> {
        let keywords = serde_json::to_string(&case.detected_keywords).map_err(storage_error)?;
        let resolution = case.resolution.as_ref();

        let result = sqlx::query(
            r#"
            UPDATE moderation_cases SET
                message_content = ?,
                detected_keywords = ?,
                risk_level = ?,
                category = ?,
                status = ?,
                updated_at = ?,
                resolved_by = ?,
                resolved_at = ?,
                action_type = ?,
                resolution_reason = ?,
                resolution_notes = ?
            WHERE id = ?
            "#,
        )
        .bind(&case.message_content)
        .bind(&keywords)
        .bind(case.risk_level.as_str())
        .bind(case.category.as_str())
        .bind(case.status.as_str())
        .bind(timestamp(&case.updated_at))
        .bind(resolution.map(|r| r.resolved_by as i64))
        .bind(resolution.map(|r| timestamp(&r.resolved_at)))
        .bind(resolution.and_then(|r| r.action).map(|a| a.as_str()))
        .bind(resolution.map(|r| r.reason.as_str()))
        .bind(resolution.and_then(|r| r.notes.as_deref()))
        .bind(case.id as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(ModerationError::CaseNotFound(case.id));
        }
        Ok(())
    }

    async fn get_case(&self, case_id: CaseId) -> Result<Option<ModerationCase>, ModerationError> {
        let row = sqlx::query("SELECT * FROM moderation_cases WHERE id = ?")
            .bind(case_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(case_from_row).transpose()
    }

    async fn list_cases(
        &self,
        filter: &CaseFilter,
        page: Pagination,
    ) -> Result<Vec<ModerationCase>, ModerationError> {
        let status = filter.status.map(|s| s.as_str());
        let risk = filter.risk_level.map(|r| r.as_str());

        let rows = sqlx::query(
            r#"
            SELECT * FROM moderation_cases
            WHERE (? IS NULL OR status = ?)
              AND (? IS NULL OR risk_level = ?)
            ORDER BY updated_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(status)
        .bind(status)
        .bind(risk)
        .bind(risk)
        .bind(page.limit as i64)
        .bind(page.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter().map(case_from_row).collect()
    }

    async fn count_cases(&self, filter: &CaseFilter) -> Result<u64, ModerationError> {
        let status = filter.status.map(|s| s.as_str());
        let risk = filter.risk_level.map(|r| r.as_str());

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM moderation_cases
            WHERE (? IS NULL OR status = ?)
              AND (? IS NULL OR risk_level = ?)
            "#,
        )
        .bind(status)
        .bind(status)
        .bind(risk)
        .bind(risk)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.get::<i64, _>("n") as u64)
    }

    async fn get_conversation(
        &self,
        conversation_id: u64,
    ) -> Result<Option<Conversation>, ModerationError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(conversation_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.map(|row| Conversation {
            id: row.get::<i64, _>("id") as u64,
            listing_id: row.get::<i64, _>("listing_id") as u64,
            initiator_id: row.get::<i64, _>("initiator_id") as u64,
            counterparty_id: row.get::<i64, _>("counterparty_id") as u64,
            hidden_for_initiator: row.get("hidden_for_initiator"),
            hidden_for_counterparty: row.get("hidden_for_counterparty"),
        }))
    }

    async fn insert_message(&self, message: NewChatMessage) -> Result<u64, ModerationError> {
        let result = sqlx::query(
            r#"
            INSERT INTO chat_messages (conversation_id, author_id, author_kind, body, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.conversation_id as i64)
        .bind(message.author_id as i64)
        .bind(message.author_kind.as_str())
        .bind(&message.body)
        .bind(timestamp(&message.created_at))
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.last_insert_rowid() as u64)
    }

    async fn unhide_conversation(&self, conversation_id: u64) -> Result<(), ModerationError> {
        let result = sqlx::query(
            r#"
            UPDATE conversations SET
                hidden_for_initiator = 0,
                hidden_for_counterparty = 0
            WHERE id = ?
            "#,
        )
        .bind(conversation_id as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(ModerationError::ConversationNotFound(conversation_id));
        }
        Ok(())
    }

    async fn get_listing(&self, listing_id: u64) -> Result<Option<ListingRecord>, ModerationError> {
        let row = sqlx::query("SELECT id, title, image_key FROM listings WHERE id = ?")
            .bind(listing_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.map(|row| ListingRecord {
            id: row.get::<i64, _>("id") as u64,
            title: row.get("title"),
            image_key: row.get("image_key"),
        }))
    }
}
