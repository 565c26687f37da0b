//! Messages exchanged between agents

use crate::organization::AgentAddress;
use crate::types::MessageId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A message carried between mailboxes
///
/// Sender and receiver are stamped by the messaging operations when the
/// message is accepted for delivery; callers only choose the content.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    id: MessageId,
    conversation: MessageId,
    in_reply_to: Option<MessageId>,
    content: Value,
    sender: Option<AgentAddress>,
    receiver: Option<AgentAddress>,
    sent_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Create an empty message
    pub fn new() -> Self {
        Self::with_content(Value::Null)
    }

    /// Create a message carrying a JSON payload
    pub fn with_content(content: impl Into<Value>) -> Self {
        let id = MessageId::next();
        Self {
            id,
            conversation: id,
            in_reply_to: None,
            content: content.into(),
            sender: None,
            receiver: None,
            sent_at: None,
        }
    }

    /// Create a message carrying a string
    pub fn text(text: impl Into<String>) -> Self {
        Self::with_content(Value::String(text.into()))
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Conversation this message belongs to; a fresh message starts its own
    pub fn conversation(&self) -> MessageId {
        self.conversation
    }

    pub fn in_reply_to(&self) -> Option<MessageId> {
        self.in_reply_to
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    /// Content as a string slice, if it is a JSON string
    pub fn as_text(&self) -> Option<&str> {
        self.content.as_str()
    }

    pub fn into_content(self) -> Value {
        self.content
    }

    pub fn sender(&self) -> Option<&AgentAddress> {
        self.sender.as_ref()
    }

    pub fn receiver(&self) -> Option<&AgentAddress> {
        self.receiver.as_ref()
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    pub(crate) fn stamp(&mut self, sender: AgentAddress, receiver: AgentAddress) {
        self.sender = Some(sender);
        self.receiver = Some(receiver);
        self.sent_at = Some(Utc::now());
    }

    /// Thread this message as a reply to `original`
    pub(crate) fn reply_to(&mut self, original: &Message) {
        self.conversation = original.conversation;
        self.in_reply_to = Some(original.id);
    }

    /// Copy for broadcast: same conversation and content, fresh id
    pub(crate) fn duplicate(&self) -> Self {
        Self {
            id: MessageId::next(),
            conversation: self.conversation,
            in_reply_to: self.in_reply_to,
            content: self.content.clone(),
            sender: None,
            receiver: None,
            sent_at: None,
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_starts_conversation() {
        let m = Message::text("hello");
        assert_eq!(m.conversation(), m.id());
        assert_eq!(m.as_text(), Some("hello"));
        assert!(m.sender().is_none());
        assert!(m.in_reply_to().is_none());
    }

    #[test]
    fn test_empty_message_is_null() {
        assert!(Message::new().content().is_null());
    }

    #[test]
    fn test_reply_threading() {
        let original = Message::text("ping");
        let mut reply = Message::text("pong");
        reply.reply_to(&original);
        assert_eq!(reply.conversation(), original.conversation());
        assert_eq!(reply.in_reply_to(), Some(original.id()));
        assert_ne!(reply.id(), original.id());
    }

    #[test]
    fn test_duplicate_keeps_conversation() {
        let m = Message::with_content(serde_json::json!({ "n": 1 }));
        let copy = m.duplicate();
        assert_ne!(copy.id(), m.id());
        assert_eq!(copy.conversation(), m.conversation());
        assert_eq!(copy.content(), m.content());
    }
}
