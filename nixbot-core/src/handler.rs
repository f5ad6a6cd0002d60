// ABOUTME: Handler contract for routed commands and the reply capability handed to them
// ABOUTME: Handlers receive the VariableBag, the raw event and a room-scoped Replier

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::event::InboundEvent;
use crate::render::{
    details_summary, has_code_fence, markdown_to_html, render_code_fences,
};
use crate::traits::{MessageContent, Transport};
use crate::vars::VariableBag;

/// Everything a handler invocation receives
pub struct HandlerContext {
    /// Named arguments captured by the route's matcher
    pub vars: VariableBag,
    /// The event that triggered the route
    pub event: Arc<InboundEvent>,
    /// Capability to reply into the originating room
    pub reply: Replier,
}

impl HandlerContext {
    pub fn sender(&self) -> &str {
        &self.event.sender
    }

    pub fn room_id(&self) -> &str {
        &self.event.room_id
    }
}

/// A routed command.
///
/// Handlers perform their own sends through `cx.reply`; the dispatcher never
/// sends a handler's return value. Returning `Err` is logged and, when the
/// bot is configured to, mirrored into the room.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, cx: HandlerContext) -> Result<()>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn call(&self, cx: HandlerContext) -> Result<()> {
        (self)(cx).await
    }
}

pub type SharedHandler = Arc<dyn Handler>;

/// Room-scoped reply capability
#[derive(Clone)]
pub struct Replier {
    transport: Arc<dyn Transport>,
    room_id: String,
}

impl Replier {
    pub fn new(transport: Arc<dyn Transport>, room_id: impl Into<String>) -> Self {
        Self {
            transport,
            room_id: room_id.into(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub async fn send(&self, content: MessageContent) -> Result<()> {
        self.transport.send(&self.room_id, content).await
    }

    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.transport.send_plain(&self.room_id, text).await
    }

    pub async fn send_html(&self, plain: &str, html: &str) -> Result<()> {
        self.transport.send_rich(&self.room_id, plain, html).await
    }

    /// Send text that may contain fenced code blocks; fences are rendered as
    /// code elements, anything else goes out as plain text
    pub async fn send_formatted(&self, text: &str) -> Result<()> {
        if has_code_fence(text) {
            let html = render_code_fences(text);
            self.send_html(text, &html).await
        } else {
            self.send_text(text).await
        }
    }

    /// Render markdown and send it with the raw markdown as fallback
    pub async fn send_markdown(&self, markdown: &str) -> Result<()> {
        let html = markdown_to_html(markdown);
        self.send_html(markdown, &html).await
    }

    /// Like `send_markdown`, folded under a `<details>` summary line
    pub async fn send_markdown_summary(&self, markdown: &str, summary: &str) -> Result<()> {
        let html = details_summary(summary, &markdown_to_html(markdown));
        self.send_html(markdown, &html).await
    }
}
