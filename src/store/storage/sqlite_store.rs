//! SQLite-backed conversation store.
//!
//! All statements run on the single connection thread owned by
//! `tokio-rusqlite`, which executes calls in issuance order. Each mutation is
//! one transaction; the notifier fires only after a successful commit.
//!
//! Commit and notification run together on a spawned task, so a caller that
//! drops its future after the first poll cannot leave a committed write
//! unannounced.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::Value;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::store::core::config::StorageConfig;
use crate::store::core::conversation::{Conversation, ConversationMeta};
use crate::store::core::errors::{ChatError, ChatResult};
use crate::store::core::ids::{ConversationId, MessageId};
use crate::store::core::message::Message;
use crate::store::notify::ChangeNotifier;
use crate::store::storage::conversation_store::{ConversationStore, StoreFuture};
use crate::store::transfer::ConversationDocument;

/// Current on-disk schema version (`PRAGMA user_version`).
pub const SCHEMA_VERSION: i64 = 1;

/// Source of "now" in epoch milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

#[derive(Clone, Debug)]
struct Tables {
    conversations: String,
    messages: String,
    tombstones: String,
}

/// Result of a write attempted inside one transaction.
enum Write<T> {
    Done(T),
    MissingConversation,
    MissingMessage,
    DuplicateMessage,
}

impl<T> Write<T> {
    const fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

enum Deletion {
    Deleted,
    AlreadyDeleted,
    Missing,
}

/// Message row prepared outside the connection thread.
type MessageRow = (MessageId, String, String, String);

/// `SQLite` implementation of [`ConversationStore`].
pub struct SqliteConversationStore {
    conn: Arc<Connection>,
    tables: Tables,
    notifier: Arc<ChangeNotifier>,
    clock: Clock,
}

impl SqliteConversationStore {
    /// Open (or create) the database file named in `config`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, the database cannot
    /// be opened, or it was written by a newer schema version.
    pub async fn new(config: &StorageConfig) -> ChatResult<Self> {
        config.validate()?;
        let conn = Connection::open(&config.sqlite_path).await?;
        info!(path = %config.sqlite_path.display(), "Opened conversation database");
        Self::with_connection(conn, config).await
    }

    /// Open a private in-memory database with default table names.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub async fn open_in_memory() -> ChatResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn, &StorageConfig::default()).await
    }

    /// Initialize the schema on an existing connection.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or schema setup fails.
    pub async fn with_connection(conn: Connection, config: &StorageConfig) -> ChatResult<Self> {
        config.validate()?;
        let tables = Tables {
            conversations: config.conversation_table.clone(),
            messages: config.message_table.clone(),
            tombstones: config.tombstone_table.clone(),
        };
        let t = tables.clone();

        let found_version = conn
            .call(move |conn| {
                let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
                if version > SCHEMA_VERSION {
                    return Ok(version);
                }
                conn.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {conv} (
                        id TEXT PRIMARY KEY,
                        name TEXT NOT NULL,
                        last_modified INTEGER NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_{conv}_last_modified
                        ON {conv} (last_modified DESC);
                    CREATE TABLE IF NOT EXISTS {msg} (
                        conversation_id TEXT NOT NULL,
                        id TEXT NOT NULL,
                        seq INTEGER NOT NULL,
                        role TEXT NOT NULL,
                        content TEXT NOT NULL,
                        extra TEXT NOT NULL DEFAULT '{{}}',
                        PRIMARY KEY (conversation_id, id)
                    );
                    CREATE INDEX IF NOT EXISTS idx_{msg}_seq
                        ON {msg} (conversation_id, seq);
                    CREATE TABLE IF NOT EXISTS {tomb} (
                        id TEXT PRIMARY KEY,
                        deleted_at INTEGER NOT NULL
                    );
                    PRAGMA user_version = {SCHEMA_VERSION};",
                    conv = t.conversations,
                    msg = t.messages,
                    tomb = t.tombstones,
                ))?;
                Ok(version)
            })
            .await?;

        if found_version > SCHEMA_VERSION {
            return Err(ChatError::InvalidConfig(format!(
                "database schema version {found_version} is newer than supported version {SCHEMA_VERSION}"
            )));
        }

        Ok(Self {
            conn: Arc::new(conn),
            tables,
            notifier: Arc::new(ChangeNotifier::new()),
            clock: Arc::new(|| Utc::now().timestamp_millis()),
        })
    }

    /// Share an existing notifier instead of the store's own.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<ChangeNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now_ms(&self) -> i64 {
        (self.clock)()
    }

    /// Run `work` in one connection call, then notify if `announce` says the
    /// outcome changed state. Both steps live on a detached task.
    async fn write<R, F>(&self, work: F, announce: fn(&R) -> bool) -> ChatResult<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> tokio_rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let outcome = conn.call(work).await?;
            if announce(&outcome) {
                notifier.notify().await;
            }
            Ok::<R, ChatError>(outcome)
        })
        .await
        .map_err(|err| ChatError::Storage(tokio_rusqlite::Error::Other(Box::new(err))))?
    }
}

impl ConversationStore for SqliteConversationStore {
    fn get_all_conversations(&self) -> StoreFuture<'_, ChatResult<Vec<ConversationMeta>>> {
        Box::pin(async move {
            let t = self.tables.clone();
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT c.id, c.name, c.last_modified,
                            (SELECT COUNT(*) FROM {msg} m WHERE m.conversation_id = c.id)
                         FROM {conv} c
                         ORDER BY c.last_modified DESC, c.rowid DESC",
                        conv = t.conversations,
                        msg = t.messages,
                    ))?;
                    let rows = stmt
                        .query_map([], |row| {
                            let count: i64 = row.get(3)?;
                            Ok(ConversationMeta {
                                id: row.get(0)?,
                                name: row.get(1)?,
                                last_modified: row.get(2)?,
                                message_count: u32::try_from(count).unwrap_or(u32::MAX),
                            })
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;
            debug!(count = rows.len(), "Listed conversations");
            Ok(rows)
        })
    }

    fn get_conversation(&self, id: ConversationId) -> StoreFuture<'_, ChatResult<Conversation>> {
        Box::pin(async move {
            let t = self.tables.clone();
            let conversation = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    let Some((name, last_modified)) = tx
                        .query_row(
                            &format!(
                                "SELECT name, last_modified FROM {} WHERE id = ?1",
                                t.conversations
                            ),
                            rusqlite::params![id],
                            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                        )
                        .optional()?
                    else {
                        return Ok(None);
                    };
                    let messages = load_messages(&tx, &t, id)?;
                    tx.commit()?;
                    Ok(Some(Conversation {
                        id,
                        name,
                        last_modified,
                        messages,
                    }))
                })
                .await?;
            debug!(conversation_id = %id, found = conversation.is_some(), "Loaded conversation");
            conversation.ok_or(ChatError::ConversationNotFound(id))
        })
    }

    fn create_conversation(
        &self,
        initial_name: &str,
    ) -> StoreFuture<'_, ChatResult<Conversation>> {
        let name = initial_name.to_string();
        Box::pin(async move {
            let t = self.tables.clone();
            let now = self.now_ms();
            let conversation = self
                .write(move |conn| {
                    let tx = conn.transaction()?;
                    let id = mint_id(&tx, &t)?;
                    tx.execute(
                        &format!(
                            "INSERT INTO {} (id, name, last_modified) VALUES (?1, ?2, ?3)",
                            t.conversations
                        ),
                        rusqlite::params![id, name, now],
                    )?;
                    tx.commit()?;
                    Ok(Conversation {
                        id,
                        name,
                        last_modified: now,
                        messages: Vec::new(),
                    })
                }, |_| true)
                .await?;
            info!(conversation_id = %conversation.id, "Created conversation");
            Ok(conversation)
        })
    }

    fn update_conversation_name(
        &self,
        id: ConversationId,
        new_name: &str,
    ) -> StoreFuture<'_, ChatResult<()>> {
        let name = new_name.to_string();
        Box::pin(async move {
            if name.trim().is_empty() {
                return Err(ChatError::InvalidArgument(
                    "conversation name must not be blank".to_string(),
                ));
            }
            let t = self.tables.clone();
            let now = self.now_ms();
            let updated = self
                .write(move |conn| {
                    let tx = conn.transaction()?;
                    let changed = tx.execute(
                        &format!(
                            "UPDATE {} SET name = ?2, last_modified = MAX(last_modified, ?3)
                             WHERE id = ?1",
                            t.conversations
                        ),
                        rusqlite::params![id, name, now],
                    )?;
                    tx.commit()?;
                    Ok(changed > 0)
                }, |changed| *changed)
                .await?;
            if !updated {
                return Err(ChatError::ConversationNotFound(id));
            }
            info!(conversation_id = %id, "Renamed conversation");
            Ok(())
        })
    }

    fn append_message(
        &self,
        id: ConversationId,
        message: Message,
    ) -> StoreFuture<'_, ChatResult<Message>> {
        Box::pin(async move {
            let extra = serde_json::to_string(&message.extra)?;
            let t = self.tables.clone();
            let now = self.now_ms();
            let row: MessageRow = (
                message.id.clone(),
                message.role.clone(),
                message.content.clone(),
                extra,
            );
            let outcome = self
                .write(move |conn| {
                    let tx = conn.transaction()?;
                    if !conversation_exists(&tx, &t, id)? {
                        return Ok(Write::MissingConversation);
                    }
                    if message_exists(&tx, &t, id, &row.0)? {
                        return Ok(Write::DuplicateMessage);
                    }
                    let seq: i64 = tx.query_row(
                        &format!(
                            "SELECT COALESCE(MAX(seq), 0) + 1 FROM {} WHERE conversation_id = ?1",
                            t.messages
                        ),
                        rusqlite::params![id],
                        |r| r.get(0),
                    )?;
                    insert_message(&tx, &t, id, seq, &row)?;
                    touch(&tx, &t, id, now)?;
                    tx.commit()?;
                    Ok(Write::Done(()))
                }, Write::is_done)
                .await?;
            resolve(outcome, id, &message.id)?;
            info!(conversation_id = %id, message_id = %message.id, "Appended message");
            Ok(message)
        })
    }

    fn edit_message(
        &self,
        id: ConversationId,
        message_id: &MessageId,
        new_content: &str,
    ) -> StoreFuture<'_, ChatResult<()>> {
        let message_id = message_id.clone();
        let content = new_content.to_string();
        Box::pin(async move {
            let t = self.tables.clone();
            let now = self.now_ms();
            let target = message_id.clone();
            let outcome = self
                .write(move |conn| {
                    let tx = conn.transaction()?;
                    if !conversation_exists(&tx, &t, id)? {
                        return Ok(Write::MissingConversation);
                    }
                    let changed = tx.execute(
                        &format!(
                            "UPDATE {} SET content = ?3 WHERE conversation_id = ?1 AND id = ?2",
                            t.messages
                        ),
                        rusqlite::params![id, target, content],
                    )?;
                    if changed == 0 {
                        return Ok(Write::MissingMessage);
                    }
                    touch(&tx, &t, id, now)?;
                    tx.commit()?;
                    Ok(Write::Done(()))
                }, Write::is_done)
                .await?;
            resolve(outcome, id, &message_id)?;
            info!(conversation_id = %id, message_id = %message_id, "Edited message");
            Ok(())
        })
    }

    fn delete_message(
        &self,
        id: ConversationId,
        message_id: &MessageId,
    ) -> StoreFuture<'_, ChatResult<()>> {
        let message_id = message_id.clone();
        Box::pin(async move {
            let t = self.tables.clone();
            let now = self.now_ms();
            let target = message_id.clone();
            let outcome = self
                .write(move |conn| {
                    let tx = conn.transaction()?;
                    if !conversation_exists(&tx, &t, id)? {
                        return Ok(Write::MissingConversation);
                    }
                    let changed = tx.execute(
                        &format!(
                            "DELETE FROM {} WHERE conversation_id = ?1 AND id = ?2",
                            t.messages
                        ),
                        rusqlite::params![id, target],
                    )?;
                    if changed == 0 {
                        return Ok(Write::MissingMessage);
                    }
                    touch(&tx, &t, id, now)?;
                    tx.commit()?;
                    Ok(Write::Done(()))
                }, Write::is_done)
                .await?;
            resolve(outcome, id, &message_id)?;
            info!(conversation_id = %id, message_id = %message_id, "Deleted message");
            Ok(())
        })
    }

    fn delete_conversation(&self, id: ConversationId) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let t = self.tables.clone();
            let now = self.now_ms();
            let outcome = self
                .write(move |conn| {
                    let tx = conn.transaction()?;
                    let removed = tx.execute(
                        &format!("DELETE FROM {} WHERE id = ?1", t.conversations),
                        rusqlite::params![id],
                    )?;
                    if removed == 0 {
                        let tombstoned: bool = tx.query_row(
                            &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", t.tombstones),
                            rusqlite::params![id],
                            |r| r.get(0),
                        )?;
                        return Ok(if tombstoned {
                            Deletion::AlreadyDeleted
                        } else {
                            Deletion::Missing
                        });
                    }
                    tx.execute(
                        &format!("DELETE FROM {} WHERE conversation_id = ?1", t.messages),
                        rusqlite::params![id],
                    )?;
                    tx.execute(
                        &format!(
                            "INSERT OR IGNORE INTO {} (id, deleted_at) VALUES (?1, ?2)",
                            t.tombstones
                        ),
                        rusqlite::params![id, now],
                    )?;
                    tx.commit()?;
                    Ok(Deletion::Deleted)
                }, |outcome| matches!(outcome, Deletion::Deleted))
                .await?;

            match outcome {
                Deletion::Deleted => {
                    info!(conversation_id = %id, "Deleted conversation");
                    Ok(())
                }
                Deletion::AlreadyDeleted => {
                    debug!(conversation_id = %id, "Conversation already deleted");
                    Ok(())
                }
                Deletion::Missing => Err(ChatError::ConversationNotFound(id)),
            }
        })
    }

    fn export_conversation(
        &self,
        id: ConversationId,
    ) -> StoreFuture<'_, ChatResult<ConversationDocument>> {
        Box::pin(async move {
            let conversation = self.get_conversation(id).await?;
            debug!(conversation_id = %id, messages = conversation.messages.len(), "Exported conversation");
            Ok(ConversationDocument::from_conversation(&conversation))
        })
    }

    fn import_conversation(&self, document: &Value) -> StoreFuture<'_, ChatResult<Conversation>> {
        let parsed = ConversationDocument::from_value(document);
        Box::pin(async move {
            let document = parsed?;
            let rows = document
                .messages
                .iter()
                .map(|m| {
                    Ok((
                        m.id.clone(),
                        m.role.clone(),
                        m.content.clone(),
                        serde_json::to_string(&m.extra)?,
                    ))
                })
                .collect::<ChatResult<Vec<MessageRow>>>()?;
            let t = self.tables.clone();
            let now = self.now_ms();
            let name = document.name.clone();
            let id = self
                .write(move |conn| {
                    let tx = conn.transaction()?;
                    let id = mint_id(&tx, &t)?;
                    tx.execute(
                        &format!(
                            "INSERT INTO {} (id, name, last_modified) VALUES (?1, ?2, ?3)",
                            t.conversations
                        ),
                        rusqlite::params![id, name, now],
                    )?;
                    for (seq, row) in (1_i64..).zip(rows.iter()) {
                        insert_message(&tx, &t, id, seq, row)?;
                    }
                    tx.commit()?;
                    Ok(id)
                }, |_| true)
                .await?;
            info!(
                conversation_id = %id,
                source_id = %document.conversation_id,
                messages = document.messages.len(),
                "Imported conversation"
            );
            Ok(Conversation {
                id,
                name: document.name,
                last_modified: now,
                messages: document.messages,
            })
        })
    }

    fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }
}

fn resolve<T>(outcome: Write<T>, id: ConversationId, message_id: &MessageId) -> ChatResult<T> {
    match outcome {
        Write::Done(value) => Ok(value),
        Write::MissingConversation => Err(ChatError::ConversationNotFound(id)),
        Write::MissingMessage => Err(ChatError::MessageNotFound {
            conversation: id,
            message: message_id.clone(),
        }),
        Write::DuplicateMessage => Err(ChatError::InvalidArgument(format!(
            "message id {message_id} already exists in conversation {id}"
        ))),
    }
}

/// Pick a random id that is neither live nor tombstoned.
fn mint_id(conn: &rusqlite::Connection, t: &Tables) -> rusqlite::Result<ConversationId> {
    loop {
        let candidate = ConversationId::new();
        let taken: bool = conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)
                     OR EXISTS(SELECT 1 FROM {} WHERE id = ?1)",
                t.conversations, t.tombstones
            ),
            rusqlite::params![candidate],
            |r| r.get(0),
        )?;
        if !taken {
            return Ok(candidate);
        }
    }
}

fn conversation_exists(
    conn: &rusqlite::Connection,
    t: &Tables,
    id: ConversationId,
) -> rusqlite::Result<bool> {
    conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", t.conversations),
        rusqlite::params![id],
        |r| r.get(0),
    )
}

fn message_exists(
    conn: &rusqlite::Connection,
    t: &Tables,
    id: ConversationId,
    message_id: &MessageId,
) -> rusqlite::Result<bool> {
    conn.query_row(
        &format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE conversation_id = ?1 AND id = ?2)",
            t.messages
        ),
        rusqlite::params![id, message_id],
        |r| r.get(0),
    )
}

/// Bump `last_modified` without ever moving it backwards.
fn touch(
    conn: &rusqlite::Connection,
    t: &Tables,
    id: ConversationId,
    now: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "UPDATE {} SET last_modified = MAX(last_modified, ?2) WHERE id = ?1",
            t.conversations
        ),
        rusqlite::params![id, now],
    )?;
    Ok(())
}

fn insert_message(
    conn: &rusqlite::Connection,
    t: &Tables,
    id: ConversationId,
    seq: i64,
    row: &MessageRow,
) -> rusqlite::Result<()> {
    let (message_id, role, content, extra) = row;
    conn.execute(
        &format!(
            "INSERT INTO {} (conversation_id, id, seq, role, content, extra)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            t.messages
        ),
        rusqlite::params![id, message_id, seq, role, content, extra],
    )?;
    Ok(())
}

fn load_messages(
    conn: &rusqlite::Connection,
    t: &Tables,
    id: ConversationId,
) -> tokio_rusqlite::Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, role, content, extra FROM {} WHERE conversation_id = ?1 ORDER BY seq",
        t.messages
    ))?;
    let rows = stmt
        .query_map(rusqlite::params![id], |row| {
            Ok((
                row.get::<_, MessageId>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, rusqlite::Error>>()?;

    rows.into_iter()
        .map(|(message_id, role, content, extra)| {
            let extra = serde_json::from_str(&extra)
                .map_err(|err| tokio_rusqlite::Error::Other(Box::new(err)))?;
            Ok(Message {
                id: message_id,
                role,
                content,
                extra,
            })
        })
        .collect()
}
