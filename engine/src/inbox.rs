//! Append-only conversation log kept in the client cache.
//!
//! Conversations are never persisted. Starting a conversation with someone
//! returns the existing one if there is one, otherwise the new conversation
//! goes to the top of the list. Messages are only ever appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skillswap_core::types::UserId;
use std::fmt;
use uuid::Uuid;

/// Identifier of a conversation
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wrap an existing id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("conversation-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The other side of a conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// User id
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Avatar URL
    pub avatar: String,
}

/// One chat message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message id
    pub id: String,
    /// Author
    pub sender_id: UserId,
    /// Author's display name
    pub sender_name: String,
    /// Body
    pub text: String,
    /// Send time
    pub sent_at: DateTime<Utc>,
    /// Generated by the marketplace rather than a person
    pub is_system: bool,
}

/// A conversation with one participant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation id
    pub id: ConversationId,
    /// The other side
    pub participant: Participant,
    /// Unread messages from the participant
    pub unread_count: u32,
    /// Messages, oldest first
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Empty conversation with `participant`
    #[must_use]
    pub fn new(participant: Participant) -> Self {
        Self {
            id: ConversationId::generate(),
            participant,
            unread_count: 0,
            messages: Vec::new(),
        }
    }

    /// The newest message
    #[must_use]
    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

/// All conversations of the signed-in user, newest first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inbox {
    conversations: Vec<Conversation>,
}

impl Inbox {
    /// Inbox holding `conversations` in the given order
    #[must_use]
    pub const fn with_conversations(conversations: Vec<Conversation>) -> Self {
        Self { conversations }
    }

    /// Conversations, newest first
    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Conversation by id
    #[must_use]
    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    /// Conversation with `participant`, if any
    #[must_use]
    pub fn with_participant(&self, participant: &UserId) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| &c.participant.id == participant)
    }

    /// Put `conversation` on top unless one with the same participant exists.
    /// Returns the conversation that is now in the inbox.
    pub fn start(&mut self, conversation: Conversation) -> &Conversation {
        let position = self
            .conversations
            .iter()
            .position(|c| c.participant.id == conversation.participant.id);
        let index = if let Some(index) = position {
            index
        } else {
            self.conversations.insert(0, conversation);
            0
        };
        &self.conversations[index]
    }

    /// Append `message`; `false` if the conversation does not exist.
    pub fn append(&mut self, id: &ConversationId, message: ChatMessage) -> bool {
        match self.conversations.iter_mut().find(|c| &c.id == id) {
            Some(conversation) => {
                conversation.unread_count = 0;
                conversation.messages.push(message);
                true
            }
            None => false,
        }
    }

    /// Total unread messages
    #[must_use]
    pub fn unread(&self) -> u32 {
        self.conversations.iter().map(|c| c.unread_count).sum()
    }
}
