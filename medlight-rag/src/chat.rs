//! Chat session entities.
//!
//! A [`Chat`] is an append-only list of [`Message`]s. Assistant messages carry
//! the evidence and query rewrites that produced them so a presentation layer
//! can show provenance; the core never edits a message once it is appended.

use serde::{Deserialize, Serialize};

use crate::source::ScoredSource;

/// The author of a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking questions.
    User,
    /// The answering assistant.
    Assistant,
    /// Instructions to the model.
    System,
}

impl Role {
    /// The wire name used by chat-completion APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One turn of a chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Position of the message in its chat, starting at 1.
    pub id: u64,
    /// Author of the message.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Evidence used to produce an assistant answer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_articles: Vec<ScoredSource>,
    /// Query rewrites issued against the index for this answer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expanded_queries: Vec<String>,
    /// Hypothetical passages issued in place of the rewrites, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hyde_passages: Vec<String>,
}

/// An ordered conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Chat {
    /// Chat identifier.
    pub id: u64,
    messages: Vec<Message>,
}

impl Chat {
    /// Create an empty chat.
    pub fn new(id: u64) -> Self {
        Self { id, messages: Vec::new() }
    }

    /// Messages in the order they were appended.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append a user message and return it.
    pub fn push_user(&mut self, content: impl Into<String>) -> &Message {
        self.push(Message {
            id: self.next_id(),
            role: Role::User,
            content: content.into(),
            related_articles: Vec::new(),
            expanded_queries: Vec::new(),
            hyde_passages: Vec::new(),
        })
    }

    /// Append an assistant answer together with its retrieval provenance.
    pub fn push_assistant(
        &mut self,
        content: impl Into<String>,
        related_articles: Vec<ScoredSource>,
        expanded_queries: Vec<String>,
        hyde_passages: Vec<String>,
    ) -> &Message {
        self.push(Message {
            id: self.next_id(),
            role: Role::Assistant,
            content: content.into(),
            related_articles,
            expanded_queries,
            hyde_passages,
        })
    }

    fn next_id(&self) -> u64 {
        self.messages.len() as u64 + 1
    }

    fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }
}
