//! Conversation Store (C5): an append-only log of messages keyed by
//! conversation id, with the five operations spec.md §4.7 names.
//!
//! Atomicity (SPEC_FULL.md §12.1): a turn appends the user row in its own
//! statement, then the assistant row in a second statement once the model
//! call succeeds. If the assistant row fails to write, the user row is left
//! in place — real user input is never silently discarded — and a single
//! retry writes a synthetic assistant row carrying a STORE_ERROR marker. If
//! that retry also fails, the turn is left user-only and logged at `error`
//! for operator follow-up.

use anyhow::Result;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::Message;
use crate::schema::messages;

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = messages)]
struct MessageRow {
    id: Uuid,
    conversation_id: String,
    user_id: Option<String>,
    role: String,
    content: String,
    sources: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            conversation_id: row.conversation_id,
            user_id: row.user_id,
            role: row.role,
            content: row.content,
            sources: row
                .sources
                .and_then(|v| serde_json::from_value(v).ok()),
            created_at: row.created_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = messages)]
struct NewMessageRow<'a> {
    id: Uuid,
    conversation_id: &'a str,
    user_id: Option<&'a str>,
    role: &'a str,
    content: &'a str,
    sources: Option<serde_json::Value>,
}

pub struct ConversationStore {
    conn: Mutex<PgConnection>,
}

impl ConversationStore {
    pub fn new(database_url: &str) -> Result<Self> {
        let conn = PgConnection::establish(database_url)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PgConnection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("conversation store lock poisoned: {e}"))
    }

    /// `append(message)` — writes one row. Returns the persisted row with its
    /// assigned id and timestamp.
    pub fn append(&self, message: &Message) -> Result<Message> {
        let new_row = NewMessageRow {
            id: message.id,
            conversation_id: &message.conversation_id,
            user_id: message.user_id.as_deref(),
            role: &message.role,
            content: &message.content,
            sources: message
                .sources
                .as_ref()
                .map(|s| serde_json::to_value(s))
                .transpose()?,
        };

        let mut conn = self.lock()?;
        let row: MessageRow = diesel::insert_into(messages::table)
            .values(&new_row)
            .returning(MessageRow::as_returning())
            .get_result(&mut *conn)?;

        Ok(row.into())
    }

    /// `tail(conversationId, n)` — the last `n` messages, newest-first.
    /// Ordered by `createdAt` descending, ties broken by `id` descending
    /// (spec.md §3) so messages written within the same timestamp tick still
    /// sort deterministically.
    pub fn tail(&self, conversation_id: &str, n: i64) -> Result<Vec<Message>> {
        let mut conn = self.lock()?;
        let rows: Vec<MessageRow> = messages::table
            .filter(messages::conversation_id.eq(conversation_id))
            .order((messages::created_at.desc(), messages::id.desc()))
            .limit(n)
            .select(MessageRow::as_select())
            .load(&mut *conn)?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// `history(conversationId)` — all messages, oldest-first. Ordered by
    /// `createdAt` ascending, ties broken by `id` ascending (spec.md §3).
    pub fn history(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let mut conn = self.lock()?;
        let rows: Vec<MessageRow> = messages::table
            .filter(messages::conversation_id.eq(conversation_id))
            .order((messages::created_at.asc(), messages::id.asc()))
            .select(MessageRow::as_select())
            .load(&mut *conn)?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// `conversationsFor(userId, prefix)` — distinct conversation ids with at
    /// least one message for that user whose id starts with `prefix`,
    /// ordered by most-recent activity descending.
    pub fn conversations_for(&self, user_id: &str, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.lock()?;
        let like_pattern = format!("{prefix}%");

        let rows: Vec<(String, DateTime<Utc>)> = messages::table
            .filter(messages::user_id.eq(user_id))
            .filter(messages::conversation_id.like(&like_pattern))
            .select((messages::conversation_id, messages::created_at))
            .load(&mut *conn)?;

        let mut latest: std::collections::HashMap<String, DateTime<Utc>> =
            std::collections::HashMap::new();
        for (conversation_id, created_at) in rows {
            latest
                .entry(conversation_id)
                .and_modify(|existing| {
                    if created_at > *existing {
                        *existing = created_at;
                    }
                })
                .or_insert(created_at);
        }

        let mut ids: Vec<(String, DateTime<Utc>)> = latest.into_iter().collect();
        ids.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(ids.into_iter().map(|(id, _)| id).collect())
    }

    /// `delete(conversationId)` — removes all rows with that id.
    pub fn delete(&self, conversation_id: &str) -> Result<usize> {
        let mut conn = self.lock()?;
        let deleted =
            diesel::delete(messages::table.filter(messages::conversation_id.eq(conversation_id)))
                .execute(&mut *conn)?;
        Ok(deleted)
    }

    /// Append the assistant row for a turn, falling back to a STORE_ERROR
    /// marker message once if the first attempt fails. Per SPEC_FULL.md
    /// §12.1 the user row is never rolled back.
    pub fn append_assistant_with_fallback(&self, message: &Message) -> Result<Message> {
        match self.append(message) {
            Ok(stored) => Ok(stored),
            Err(first_error) => {
                tracing::error!(
                    conversation_id = %message.conversation_id,
                    error = %first_error,
                    "failed to persist assistant message, retrying with marker"
                );
                let marker = Message {
                    id: Uuid::new_v4(),
                    conversation_id: message.conversation_id.clone(),
                    user_id: message.user_id.clone(),
                    role: crate::models::Role::Assistant.as_str().to_string(),
                    content: "[message could not be saved due to a store error]".to_string(),
                    sources: None,
                    created_at: Utc::now(),
                };
                self.append(&marker).map_err(|second_error| {
                    tracing::error!(
                        conversation_id = %message.conversation_id,
                        error = %second_error,
                        "retry also failed; conversation left user-only"
                    );
                    second_error
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversations_for_picks_most_recent_activity_first() {
        // conversations_for's sort is plain in-memory logic; exercised here
        // without a database by constructing the intermediate map directly.
        let mut latest: std::collections::HashMap<String, DateTime<Utc>> =
            std::collections::HashMap::new();
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(10);
        latest.insert("agent-a".to_string(), t0);
        latest.insert("agent-b".to_string(), t1);

        let mut ids: Vec<(String, DateTime<Utc>)> = latest.into_iter().collect();
        ids.sort_by(|a, b| b.1.cmp(&a.1));
        let ordered: Vec<String> = ids.into_iter().map(|(id, _)| id).collect();

        assert_eq!(ordered, vec!["agent-b".to_string(), "agent-a".to_string()]);
    }
}
