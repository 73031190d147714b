//! The [`ChatStore`]: schema and row operations.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, StoreError};

// ─────────────────────────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────────────────────────

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    /// Column representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(StoreError::Corrupt(format!("unknown role '{}'", other))),
        }
    }
}

/// A project: the unit of configuration for conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub system_prompt: Option<String>,
    /// Names of tools enabled for this project.
    pub tools: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A conversation: an ordered sequence of messages with a token counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub project_id: i64,
    /// Null until the first exchange completes; set at most once
    /// automatically.
    pub title: Option<String>,
    /// Running total of estimated tokens; only ever increases.
    pub total_tokens: i64,
    pub created_at: DateTime<Utc>,
}

/// A stored message. Content is set at creation and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub conversation_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub token_count: i64,
    pub created_at: DateTime<Utc>,
}

/// A message to insert.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub token_count: i64,
}

/// A stored document (e.g. archived web-search results).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub project_id: i64,
    pub filename: String,
    pub content: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}

/// A document to insert.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub project_id: i64,
    pub filename: String,
    pub content: String,
    pub content_type: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS projects (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    system_prompt TEXT,
    tools         TEXT NOT NULL DEFAULT '[]',
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversations (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id   INTEGER NOT NULL REFERENCES projects(id),
    title        TEXT,
    total_tokens INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id INTEGER NOT NULL REFERENCES conversations(id),
    role            TEXT NOT NULL,
    content         TEXT NOT NULL,
    token_count     INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);

CREATE TABLE IF NOT EXISTS documents (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id   INTEGER NOT NULL REFERENCES projects(id),
    filename     TEXT NOT NULL,
    content      TEXT NOT NULL,
    content_type TEXT NOT NULL,
    created_at   TEXT NOT NULL
);
";

/// Persistence for projects, conversations, messages, and documents.
///
/// Wraps one connection behind a mutex; every handle that must not share
/// the request path's transactional resources (e.g. the search archiver)
/// opens its own `ChatStore`.
pub struct ChatStore {
    conn: Mutex<Connection>,
}

impl ChatStore {
    /// Open (and create) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory store. Each call creates an independent database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ── Projects ─────────────────────────────────────────────────────

    /// Create a project.
    pub fn create_project(
        &self,
        name: &str,
        system_prompt: Option<&str>,
        tools: &[String],
    ) -> Result<Project> {
        let conn = self.conn.lock();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO projects (name, system_prompt, tools, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                name,
                system_prompt,
                serde_json::to_string(tools)?,
                now.to_rfc3339()
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Project {
            id,
            name: name.to_string(),
            system_prompt: system_prompt.map(String::from),
            tools: tools.to_vec(),
            created_at: now,
        })
    }

    /// Find a project by id.
    pub fn find_project(&self, id: i64) -> Result<Option<Project>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, system_prompt, tools, created_at FROM projects WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?
        .map(|(id, name, system_prompt, tools, created_at)| {
            Ok(Project {
                id,
                name,
                system_prompt,
                tools: serde_json::from_str(&tools)?,
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .transpose()
    }

    // ── Conversations ────────────────────────────────────────────────

    /// Reuse an existing conversation when an id is given and found, else
    /// create a fresh untitled one.
    pub fn get_or_create_conversation(
        &self,
        project_id: i64,
        conversation_id: Option<i64>,
    ) -> Result<Conversation> {
        if let Some(id) = conversation_id {
            if let Some(conversation) = self.find_conversation(id)? {
                return Ok(conversation);
            }
        }

        let conn = self.conn.lock();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO conversations (project_id, created_at) VALUES (?1, ?2)",
            params![project_id, now.to_rfc3339()],
        )?;
        Ok(Conversation {
            id: conn.last_insert_rowid(),
            project_id,
            title: None,
            total_tokens: 0,
            created_at: now,
        })
    }

    /// Find a conversation by id.
    pub fn find_conversation(&self, id: i64) -> Result<Option<Conversation>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, project_id, title, total_tokens, created_at FROM conversations WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?
        .map(|(id, project_id, title, total_tokens, created_at)| {
            Ok(Conversation {
                id,
                project_id,
                title,
                total_tokens,
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .transpose()
    }

    /// Set the title only if it is still unset. Returns whether it was set.
    pub fn set_title_if_unset(&self, conversation_id: i64, title: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE conversations SET title = ?1 WHERE id = ?2 AND title IS NULL",
            params![title, conversation_id],
        )?;
        Ok(changed > 0)
    }

    /// Increase the running token counter.
    pub fn add_tokens(&self, conversation_id: i64, delta: i64) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE conversations SET total_tokens = total_tokens + ?1 WHERE id = ?2",
            params![delta, conversation_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound("conversation"));
        }
        Ok(())
    }

    // ── Messages ─────────────────────────────────────────────────────

    /// Insert a message.
    pub fn insert_message(&self, message: NewMessage) -> Result<MessageRecord> {
        let conn = self.conn.lock();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO messages (conversation_id, role, content, token_count, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.conversation_id,
                message.role.as_str(),
                message.content,
                message.token_count,
                now.to_rfc3339()
            ],
        )?;
        Ok(MessageRecord {
            id: conn.last_insert_rowid(),
            conversation_id: message.conversation_id,
            role: message.role,
            content: message.content,
            token_count: message.token_count,
            created_at: now,
        })
    }

    /// The most recent messages strictly before `before_id`, oldest first.
    ///
    /// This is the history window for a turn: the just-persisted user
    /// message is excluded by passing its id.
    pub fn recent_messages_before(
        &self,
        conversation_id: i64,
        before_id: i64,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, token_count, created_at \
             FROM messages WHERE conversation_id = ?1 AND id < ?2 \
             ORDER BY id DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![conversation_id, before_id, limit as i64],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, conversation_id, role, content, token_count, created_at) = row?;
            messages.push(MessageRecord {
                id,
                conversation_id,
                role: MessageRole::parse(&role)?,
                content,
                token_count,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        messages.reverse();
        Ok(messages)
    }

    // ── Documents ────────────────────────────────────────────────────

    /// Insert a document.
    pub fn insert_document(&self, document: NewDocument) -> Result<DocumentRecord> {
        let conn = self.conn.lock();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO documents (project_id, filename, content, content_type, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                document.project_id,
                document.filename,
                document.content,
                document.content_type,
                now.to_rfc3339()
            ],
        )?;
        Ok(DocumentRecord {
            id: conn.last_insert_rowid(),
            project_id: document.project_id,
            filename: document.filename,
            content: document.content,
            content_type: document.content_type,
            created_at: now,
        })
    }

    /// All documents in a project, newest first.
    pub fn documents_for_project(&self, project_id: i64) -> Result<Vec<DocumentRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, filename, content, content_type, created_at \
             FROM documents WHERE project_id = ?1 ORDER BY id DESC",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, project_id, filename, content, content_type, created_at) = row?;
            documents.push(DocumentRecord {
                id,
                project_id,
                filename,
                content,
                content_type,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(documents)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp '{}': {}", value, e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ChatStore {
        ChatStore::open_in_memory().unwrap()
    }

    fn message(conversation_id: i64, role: MessageRole, content: &str) -> NewMessage {
        NewMessage {
            conversation_id,
            role,
            content: content.to_string(),
            token_count: 10,
        }
    }

    #[test]
    fn test_project_round_trip() {
        let store = store();
        let tools = vec!["web_search".to_string(), "calculator".to_string()];
        let project = store
            .create_project("Biology", Some("Be precise."), &tools)
            .unwrap();

        let found = store.find_project(project.id).unwrap().unwrap();
        assert_eq!(found.name, "Biology");
        assert_eq!(found.system_prompt.as_deref(), Some("Be precise."));
        assert_eq!(found.tools, tools);

        assert!(store.find_project(999).unwrap().is_none());
    }

    #[test]
    fn test_get_or_create_conversation() {
        let store = store();
        let project = store.create_project("P", None, &[]).unwrap();

        let created = store.get_or_create_conversation(project.id, None).unwrap();
        assert!(created.title.is_none());
        assert_eq!(created.total_tokens, 0);

        // Existing id is reused.
        let reused = store
            .get_or_create_conversation(project.id, Some(created.id))
            .unwrap();
        assert_eq!(reused.id, created.id);

        // Unknown id falls back to creating a new conversation.
        let fresh = store
            .get_or_create_conversation(project.id, Some(9999))
            .unwrap();
        assert_ne!(fresh.id, created.id);
    }

    #[test]
    fn test_title_set_at_most_once() {
        let store = store();
        let project = store.create_project("P", None, &[]).unwrap();
        let conversation = store.get_or_create_conversation(project.id, None).unwrap();

        assert!(store.set_title_if_unset(conversation.id, "First title").unwrap());
        assert!(!store.set_title_if_unset(conversation.id, "Second title").unwrap());

        let found = store.find_conversation(conversation.id).unwrap().unwrap();
        assert_eq!(found.title.as_deref(), Some("First title"));
    }

    #[test]
    fn test_token_counter_only_increases() {
        let store = store();
        let project = store.create_project("P", None, &[]).unwrap();
        let conversation = store.get_or_create_conversation(project.id, None).unwrap();

        store.add_tokens(conversation.id, 25).unwrap();
        store.add_tokens(conversation.id, 17).unwrap();

        let found = store.find_conversation(conversation.id).unwrap().unwrap();
        assert_eq!(found.total_tokens, 42);
    }

    #[test]
    fn test_add_tokens_unknown_conversation() {
        let store = store();
        assert!(matches!(
            store.add_tokens(123, 5),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_message_round_trip() {
        let store = store();
        let project = store.create_project("P", None, &[]).unwrap();
        let conversation = store.get_or_create_conversation(project.id, None).unwrap();

        let saved = store
            .insert_message(message(conversation.id, MessageRole::User, "Hello"))
            .unwrap();
        assert_eq!(saved.role, MessageRole::User);
        assert_eq!(saved.content, "Hello");
        assert_eq!(saved.token_count, 10);
    }

    #[test]
    fn test_history_window_excludes_current_and_is_bounded() {
        let store = store();
        let project = store.create_project("P", None, &[]).unwrap();
        let conversation = store.get_or_create_conversation(project.id, None).unwrap();

        for i in 0..6 {
            store
                .insert_message(message(conversation.id, MessageRole::User, &format!("u{}", i)))
                .unwrap();
            store
                .insert_message(message(
                    conversation.id,
                    MessageRole::Assistant,
                    &format!("a{}", i),
                ))
                .unwrap();
        }
        let current = store
            .insert_message(message(conversation.id, MessageRole::User, "current"))
            .unwrap();

        let history = store
            .recent_messages_before(conversation.id, current.id, 4)
            .unwrap();

        assert_eq!(history.len(), 4);
        // Oldest first, current question excluded.
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["u4", "a4", "u5", "a5"]);
    }

    #[test]
    fn test_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sage.db");

        {
            let store = ChatStore::open(&path).unwrap();
            store.create_project("Persistent", None, &[]).unwrap();
        }

        let store = ChatStore::open(&path).unwrap();
        let project = store.find_project(1).unwrap().unwrap();
        assert_eq!(project.name, "Persistent");
    }

    #[test]
    fn test_document_round_trip() {
        let store = store();
        let project = store.create_project("P", None, &[]).unwrap();

        store
            .insert_document(NewDocument {
                project_id: project.id,
                filename: "websearch_results.md".to_string(),
                content: "# Web Search".to_string(),
                content_type: "text/markdown".to_string(),
            })
            .unwrap();

        let documents = store.documents_for_project(project.id).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].filename, "websearch_results.md");
    }
}
