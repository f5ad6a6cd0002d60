// ABOUTME: Liveness commands that need no external services

use anyhow::Result;
use nixbot_core::HandlerContext;

pub const PING_PATTERN: &str = "^!ping";
pub const ECHO_PATTERN: &str = "^!echo (?P<text>.+)";

pub async fn ping(cx: HandlerContext) -> Result<()> {
    cx.reply.send_text("pong").await
}

pub async fn echo(cx: HandlerContext) -> Result<()> {
    let text = cx.vars.get_or_empty("text").trim();
    cx.reply.send_text(text).await
}
