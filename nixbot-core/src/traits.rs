// ABOUTME: Transport trait - the outward operations the engine needs from a chat client
// ABOUTME: Message content types shared by the dispatcher, admission gate and handlers

use anyhow::Result;
use async_trait::async_trait;

/// Content that can be sent to a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    /// Plain text message
    Plain(String),
    /// Message with both a plain-text fallback and HTML formatting
    Html { plain: String, html: String },
}

impl MessageContent {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain(text.into())
    }

    pub fn html(plain: impl Into<String>, html: impl Into<String>) -> Self {
        Self::Html {
            plain: plain.into(),
            html: html.into(),
        }
    }

    /// The plain-text form of this content
    pub fn plain_text(&self) -> &str {
        match self {
            Self::Plain(text) => text,
            Self::Html { plain, .. } => plain,
        }
    }
}

/// Chat-protocol client operations consumed by the engine.
///
/// Connection, sync, encryption and persistence live behind this trait; the
/// engine only marks events read, joins rooms and sends messages.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The agent's own user ID on this transport
    fn own_user_id(&self) -> &str;

    /// Send a read receipt for `event_id` in `room_id`
    async fn mark_read(&self, room_id: &str, event_id: &str) -> Result<()>;

    /// Accept an invitation to `room_id`
    async fn join_room(&self, room_id: &str) -> Result<()>;

    /// Send a message to a room by ID
    async fn send(&self, room_id: &str, content: MessageContent) -> Result<()>;

    /// Send a plain-text message
    async fn send_plain(&self, room_id: &str, text: &str) -> Result<()> {
        self.send(room_id, MessageContent::plain(text)).await
    }

    /// Send a rich message with a plain-text fallback
    async fn send_rich(&self, room_id: &str, plain: &str, html: &str) -> Result<()> {
        self.send(room_id, MessageContent::html(plain, html)).await
    }

    /// Check if a user ID is the agent itself
    fn is_self(&self, user_id: &str) -> bool {
        user_id == self.own_user_id()
    }
}
