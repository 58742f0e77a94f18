//! Statement text for the SQLite document layout.
//!
//! Every collection is one table of `(key, doc)` rows, `doc` holding the JSON document.

use super::backend::Keyspace;

/// Trivial query that touches no collection.
pub const PROBE: &str = "SELECT 1";

pub fn create_collection(keyspace: &Keyspace) -> String {
    format!(
        "CREATE TABLE {} (key TEXT PRIMARY KEY NOT NULL, doc TEXT NOT NULL)",
        keyspace.ident()
    )
}

pub fn upsert(keyspace: &Keyspace) -> String {
    format!(
        "INSERT INTO {} (key, doc) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET doc = excluded.doc",
        keyspace.ident()
    )
}

pub fn get(keyspace: &Keyspace) -> String {
    format!("SELECT doc FROM {} WHERE key = ?1", keyspace.ident())
}

pub fn remove(keyspace: &Keyspace) -> String {
    format!("DELETE FROM {} WHERE key = ?1", keyspace.ident())
}

/// Messages of one chat, oldest first. Binds `$chat_id`.
pub fn messages_for_chat(keyspace: &Keyspace) -> String {
    format!(
        "SELECT m.doc FROM {} m
         WHERE json_extract(m.doc, '$.chat_id') = $chat_id
         ORDER BY json_extract(m.doc, '$.created_at') ASC, json_extract(m.doc, '$.id') ASC",
        keyspace.ident()
    )
}

/// Bulk delete of one chat's messages. Binds `$chat_id`.
pub fn delete_messages_for_chat(keyspace: &Keyspace) -> String {
    format!(
        "DELETE FROM {} WHERE json_extract(doc, '$.chat_id') = $chat_id",
        keyspace.ident()
    )
}
