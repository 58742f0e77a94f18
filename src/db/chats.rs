use std::sync::atomic::Ordering;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::error::{Result, StoreError};
use super::{schema, ChatStore};
use crate::models::{now_timestamp, timestamp_from_millis, Chat, Message, Metadata};

impl ChatStore {
    /// Creates a chat and returns its id.
    pub fn create_chat(&self, metadata: Option<Metadata>) -> Result<String> {
        let bound = self.bound()?;

        let chat_id = Uuid::new_v4().to_string();
        let now = now_timestamp();
        let chat = Chat {
            id: chat_id.clone(),
            created_at: now.clone(),
            updated_at: now,
            metadata: metadata.unwrap_or_default(),
        };

        bound
            .backend
            .upsert(&bound.collections.chats, &chat_id, &serde_json::to_value(&chat)?)
            .map_err(|e| {
                error!("Failed to create chat: {}", e);
                e
            })?;
        info!("Created chat session with ID: {}", chat_id);
        Ok(chat_id)
    }

    /// Appends a message to an existing chat and returns `(message_id, created_at)`.
    ///
    /// The message write and the chat's `updated_at` touch are two separate
    /// writes; a failure between them leaves the message without the touch.
    pub fn add_message(
        &self,
        chat_id: &str,
        role: &str,
        content: &str,
        metadata: Option<Metadata>,
    ) -> Result<(i64, String)> {
        let bound = self.bound()?;

        let mut chat = self
            .get_chat(chat_id)?
            .ok_or_else(|| StoreError::ChatNotFound(chat_id.to_string()))?;

        let message_id = self.next_message_id(Utc::now().timestamp_millis());
        let created_at = timestamp_from_millis(message_id);
        let message = Message {
            id: message_id,
            chat_id: chat_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: created_at.clone(),
            metadata: metadata.unwrap_or_default(),
        };

        let mut write = || -> Result<()> {
            bound.backend.upsert(
                &bound.collections.messages,
                &Message::storage_key(chat_id, message_id),
                &serde_json::to_value(&message)?,
            )?;
            chat.updated_at = created_at.clone();
            bound
                .backend
                .upsert(&bound.collections.chats, chat_id, &serde_json::to_value(&chat)?)
        };
        write().map_err(|e| {
            error!("Failed to add message to chat {}: {}", chat_id, e);
            e
        })?;

        info!("Added message with ID {} to chat {}", message_id, chat_id);
        Ok((message_id, created_at))
    }

    /// Strictly increasing millisecond ids, so same-millisecond appends never collide.
    fn next_message_id(&self, now_millis: i64) -> i64 {
        let previous = self
            .last_message_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                Some(now_millis.max(prev + 1))
            })
            .unwrap_or_else(|prev| prev);
        now_millis.max(previous + 1)
    }

    /// Point lookup. Missing and empty documents are both `None`.
    pub fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        let bound = self.bound()?;
        let doc = bound.backend.get(&bound.collections.chats, chat_id)?;
        match doc {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(ref map)) if map.is_empty() => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    /// All messages of a chat, oldest first.
    pub fn get_messages(&self, chat_id: &str) -> Result<Vec<Message>> {
        let bound = self.bound()?;
        self.await_up()?;

        let rows = bound
            .backend
            .query(
                &schema::messages_for_chat(&bound.collections.messages),
                &[("chat_id", Value::from(chat_id))],
            )
            .map_err(|e| {
                error!("Failed to get messages for chat {}: {}", chat_id, e);
                e
            })?;

        let messages = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<Message>, _>>()?;
        debug!("Fetched {} messages for chat {}", messages.len(), chat_id);
        Ok(messages)
    }

    /// Deletes a chat and all its messages. Returns `false` if the chat does not exist.
    ///
    /// Messages go first; a failure before the chat removal leaves an empty chat behind.
    pub fn delete_chat(&self, chat_id: &str) -> Result<bool> {
        let bound = self.bound()?;
        self.await_up()?;

        if self.get_chat(chat_id)?.is_none() {
            return Ok(false);
        }

        let delete = || -> Result<()> {
            bound.backend.query(
                &schema::delete_messages_for_chat(&bound.collections.messages),
                &[("chat_id", Value::from(chat_id))],
            )?;
            info!("Deleted messages for chat {}", chat_id);
            bound.backend.remove(&bound.collections.chats, chat_id)?;
            Ok(())
        };
        delete().map_err(|e| {
            error!("Failed to delete chat {}: {}", chat_id, e);
            e
        })?;

        info!("Deleted chat {}", chat_id);
        Ok(true)
    }
}
