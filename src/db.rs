use chrono::{NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const DEFAULT_DB_PATH: &str = "emotion_chat.db";
pub const DEFAULT_MOOD_HISTORY_LIMIT: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// A user joined with their stats row.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub streak: i64,
    pub last_session_date: Option<NaiveDate>,
    pub total_sessions: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Conversation {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub role: Role,
    pub content: String,
    pub emotion: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MoodEntry {
    pub id: i64,
    pub user_id: i64,
    pub emotion: String,
    pub created_at: String,
}

/// Handle to the embedded store. Every operation opens its own connection
/// and closes it on return; nothing is pooled or held between calls.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

fn now_timestamp() -> String {
    // Fixed-width UTC so lexical order matches chronological order
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    /// Open the store at `path`, creating the schema if it is missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let db = Self { path: path.into() };
        db.init_database()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T>,
    {
        let mut conn = self.connect()?;
        Ok(f(&mut conn)?)
    }

    fn init_database(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS conversations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (user_id) REFERENCES users(id)
                );

                CREATE TABLE IF NOT EXISTS messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    conversation_id INTEGER NOT NULL,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    emotion TEXT,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (conversation_id) REFERENCES conversations(id)
                );

                CREATE TABLE IF NOT EXISTS mood_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    emotion TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (user_id) REFERENCES users(id)
                );

                CREATE TABLE IF NOT EXISTS user_stats (
                    user_id INTEGER PRIMARY KEY,
                    streak INTEGER NOT NULL DEFAULT 0,
                    last_session_date TEXT,
                    total_sessions INTEGER NOT NULL DEFAULT 0,
                    FOREIGN KEY (user_id) REFERENCES users(id)
                );

                CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, created_at);
                CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at);
                CREATE INDEX IF NOT EXISTS idx_mood_history_user ON mood_history(user_id, created_at);
                ",
            )
        })
    }

    // ============ Users ============

    /// Create a user and their zeroed stats row, returning the new id.
    pub fn create_user(&self, name: &str) -> Result<i64> {
        let now = now_timestamp();
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO users (name, created_at) VALUES (?1, ?2)",
                params![name, now],
            )?;
            let user_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO user_stats (user_id) VALUES (?1)",
                params![user_id],
            )?;
            tx.commit()?;
            Ok(user_id)
        })
    }

    /// Exact-name lookup. Names are not unique; the earliest user wins.
    pub fn get_user(&self, name: &str) -> Result<Option<UserRecord>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT u.id, u.name, u.created_at, us.streak, us.last_session_date, us.total_sessions
                 FROM users u LEFT JOIN user_stats us ON u.id = us.user_id
                 WHERE u.name = ?1
                 ORDER BY u.id ASC
                 LIMIT 1",
                params![name],
                |row| {
                    Ok(UserRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                        streak: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                        last_session_date: row.get(4)?,
                        total_sessions: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
                    })
                },
            )
            .optional()
        })
    }

    /// Unconditional overwrite of the streak counters.
    pub fn update_user_streak(&self, user_id: i64, streak: i64, last_session_date: NaiveDate) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE user_stats SET streak = ?1, last_session_date = ?2 WHERE user_id = ?3",
                params![streak, last_session_date, user_id],
            )?;
            Ok(())
        })
    }

    // ============ Conversations ============

    /// Create a conversation and bump the owner's `total_sessions`.
    pub fn create_conversation(&self, user_id: i64, title: &str) -> Result<i64> {
        let now = now_timestamp();
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO conversations (user_id, title, created_at) VALUES (?1, ?2, ?3)",
                params![user_id, title, now],
            )?;
            let conversation_id = tx.last_insert_rowid();
            tx.execute(
                "UPDATE user_stats SET total_sessions = total_sessions + 1 WHERE user_id = ?1",
                params![user_id],
            )?;
            tx.commit()?;
            Ok(conversation_id)
        })
    }

    pub fn get_conversation(&self, conversation_id: i64) -> Result<Option<Conversation>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT id, user_id, title, created_at FROM conversations WHERE id = ?1",
                params![conversation_id],
                conversation_from_row,
            )
            .optional()
        })
    }

    /// Most recent first.
    pub fn get_user_conversations(&self, user_id: i64) -> Result<Vec<Conversation>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, created_at
                 FROM conversations
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )?;

            let conversations = stmt.query_map(params![user_id], conversation_from_row)?;
            conversations.collect()
        })
    }

    // ============ Messages ============

    pub fn add_message(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
        emotion: Option<&str>,
    ) -> Result<()> {
        let now = now_timestamp();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO messages (conversation_id, role, content, emotion, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![conversation_id, role.as_str(), content, emotion, now],
            )?;
            Ok(())
        })
    }

    /// Oldest first. Rows sharing a timestamp keep insertion order.
    pub fn get_conversation_messages(&self, conversation_id: i64) -> Result<Vec<Message>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, emotion, created_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;

            let messages = stmt.query_map(params![conversation_id], |row| {
                let role: String = row.get(2)?;
                Ok(Message {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    role: Role::from_str(&role).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            2,
                            Type::Text,
                            format!("unknown message role '{}'", role).into(),
                        )
                    })?,
                    content: row.get(3)?,
                    emotion: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?;

            messages.collect()
        })
    }

    // ============ Mood History ============

    pub fn add_mood_entry(&self, user_id: i64, emotion: &str) -> Result<()> {
        let now = now_timestamp();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO mood_history (user_id, emotion, created_at) VALUES (?1, ?2, ?3)",
                params![user_id, emotion, now],
            )?;
            Ok(())
        })
    }

    /// The `limit` most recent entries, most recent first.
    pub fn get_user_mood_history(&self, user_id: i64, limit: usize) -> Result<Vec<MoodEntry>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, emotion, created_at
                 FROM mood_history
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )?;

            let entries = stmt.query_map(params![user_id, limit as i64], |row| {
                Ok(MoodEntry {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    emotion: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?;

            entries.collect()
        })
    }
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_new_user_has_zeroed_stats() {
        let (_dir, db) = test_db();
        let id = db.create_user("Ada").unwrap();

        let user = db.get_user("Ada").unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.name, "Ada");
        assert_eq!(user.streak, 0);
        assert_eq!(user.total_sessions, 0);
        assert_eq!(user.last_session_date, None);
    }

    #[test]
    fn test_get_user_missing_returns_none() {
        let (_dir, db) = test_db();
        db.create_user("Ada").unwrap();
        assert!(db.get_user("ada").unwrap().is_none());
        assert!(db.get_user("Grace").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_names_create_distinct_users() {
        let (_dir, db) = test_db();
        let first = db.create_user("Sam").unwrap();
        let second = db.create_user("Sam").unwrap();
        assert_ne!(first, second);

        let found = db.get_user("Sam").unwrap().unwrap();
        assert_eq!(found.id, first);
    }

    #[test]
    fn test_schema_init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::open(&path).unwrap();
        db.create_user("Ada").unwrap();

        let reopened = Database::open(&path).unwrap();
        assert!(reopened.get_user("Ada").unwrap().is_some());
    }

    #[test]
    fn test_create_conversation_increments_total_sessions() {
        let (_dir, db) = test_db();
        let user_id = db.create_user("Ada").unwrap();

        let conversation_id = db.create_conversation(user_id, "First").unwrap();
        assert_eq!(db.get_user("Ada").unwrap().unwrap().total_sessions, 1);

        db.add_message(conversation_id, Role::User, "hello", Some("Joy")).unwrap();
        assert_eq!(db.get_conversation_messages(conversation_id).unwrap().len(), 1);

        db.create_conversation(user_id, "Second").unwrap();
        assert_eq!(db.get_user("Ada").unwrap().unwrap().total_sessions, 2);
    }

    #[test]
    fn test_messages_returned_in_insertion_order() {
        let (_dir, db) = test_db();
        let user_id = db.create_user("Ada").unwrap();
        let conversation_id = db.create_conversation(user_id, "Chat").unwrap();

        for i in 0..20 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            db.add_message(conversation_id, role, &format!("message {}", i), None).unwrap();
        }

        let messages = db.get_conversation_messages(conversation_id).unwrap();
        assert_eq!(messages.len(), 20);
        for (i, message) in messages.iter().enumerate() {
            assert_eq!(message.content, format!("message {}", i));
        }
        for pair in messages.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[test]
    fn test_messages_are_scoped_to_conversation() {
        let (_dir, db) = test_db();
        let user_id = db.create_user("Ada").unwrap();
        let a = db.create_conversation(user_id, "A").unwrap();
        let b = db.create_conversation(user_id, "B").unwrap();

        db.add_message(a, Role::User, "in a", Some("Fear")).unwrap();
        db.add_message(b, Role::User, "in b", None).unwrap();

        let messages = db.get_conversation_messages(a).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "in a");
        assert_eq!(messages[0].emotion.as_deref(), Some("Fear"));
    }

    #[test]
    fn test_add_message_rejects_unknown_conversation() {
        let (_dir, db) = test_db();
        assert!(db.add_message(999, Role::User, "orphan", None).is_err());
    }

    #[test]
    fn test_user_conversations_most_recent_first() {
        let (_dir, db) = test_db();
        let user_id = db.create_user("Ada").unwrap();
        let other = db.create_user("Grace").unwrap();

        let first = db.create_conversation(user_id, "First").unwrap();
        let second = db.create_conversation(user_id, "Second").unwrap();
        db.create_conversation(other, "Not mine").unwrap();

        let conversations = db.get_user_conversations(user_id).unwrap();
        let ids: Vec<i64> = conversations.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn test_get_conversation() {
        let (_dir, db) = test_db();
        let user_id = db.create_user("Ada").unwrap();
        let id = db.create_conversation(user_id, "Title").unwrap();

        let conversation = db.get_conversation(id).unwrap().unwrap();
        assert_eq!(conversation.user_id, user_id);
        assert_eq!(conversation.title, "Title");
        assert!(db.get_conversation(id + 1).unwrap().is_none());
    }

    #[test]
    fn test_mood_history_limit_and_order() {
        let (_dir, db) = test_db();
        let user_id = db.create_user("Ada").unwrap();

        for emotion in ["Joy", "Sadness", "Anger", "Fear"] {
            db.add_mood_entry(user_id, emotion).unwrap();
        }

        let history = db.get_user_mood_history(user_id, 3).unwrap();
        let emotions: Vec<&str> = history.iter().map(|m| m.emotion.as_str()).collect();
        assert_eq!(emotions, vec!["Fear", "Anger", "Sadness"]);

        let all = db.get_user_mood_history(user_id, DEFAULT_MOOD_HISTORY_LIMIT).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_update_user_streak_overwrites() {
        let (_dir, db) = test_db();
        let user_id = db.create_user("Ada").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();

        db.update_user_streak(user_id, 7, date).unwrap();
        db.update_user_streak(user_id, 7, date).unwrap();

        let user = db.get_user("Ada").unwrap().unwrap();
        assert_eq!(user.streak, 7);
        assert_eq!(user.last_session_date, Some(date));

        let later = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        db.update_user_streak(user_id, 2, later).unwrap();
        let user = db.get_user("Ada").unwrap().unwrap();
        assert_eq!(user.streak, 2);
        assert_eq!(user.last_session_date, Some(later));
    }
}
