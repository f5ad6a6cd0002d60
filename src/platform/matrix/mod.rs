// ABOUTME: Matrix implementation of the engine's Transport plus event conversion
// ABOUTME: SDK event handlers translate room messages and memberships into TransportEvents

use anyhow::{Context, Result};
use async_trait::async_trait;
use matrix_sdk::{
    room::Room,
    ruma::{
        api::client::receipt::create_receipt::v3::ReceiptType,
        events::{
            receipt::ReceiptThread,
            room::{
                member::{StrippedRoomMemberEvent, SyncRoomMemberEvent},
                message::{MessageType, OriginalSyncRoomMessageEvent, RoomMessageEventContent},
            },
        },
        OwnedEventId, OwnedRoomId,
    },
    Client,
};
use nixbot_core::render::{chunk_message, MAX_CHUNK_SIZE};
use nixbot_core::{InboundEvent, Membership, MessageContent, Transport};
use tokio::sync::mpsc;

use super::{TransportEvent, EVENT_CHANNEL_CAPACITY};

/// Transport backed by a logged-in matrix-sdk client
#[derive(Clone)]
pub struct MatrixTransport {
    client: Client,
    /// Cached at construction so `own_user_id` can hand out a borrow
    user_id: String,
}

impl MatrixTransport {
    /// Wrap a client. Fails if the client has not logged in yet.
    pub fn new(client: Client) -> Result<Self> {
        let user_id = client
            .user_id()
            .context("Matrix client is not logged in")?
            .to_string();
        Ok(Self { client, user_id })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn room(&self, room_id: &str) -> Result<Room> {
        let room_id: OwnedRoomId = room_id.parse().context("Invalid room ID")?;
        self.client
            .get_room(&room_id)
            .with_context(|| format!("Room {} not found", room_id))
    }
}

impl std::fmt::Debug for MatrixTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixTransport")
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[async_trait]
impl Transport for MatrixTransport {
    fn own_user_id(&self) -> &str {
        &self.user_id
    }

    async fn mark_read(&self, room_id: &str, event_id: &str) -> Result<()> {
        let room = self.room(room_id)?;
        let event_id: OwnedEventId = event_id.parse().context("Invalid event ID")?;
        room.send_single_receipt(ReceiptType::Read, ReceiptThread::Unthreaded, event_id)
            .await
            .context("Failed to send read receipt")?;
        Ok(())
    }

    async fn join_room(&self, room_id: &str) -> Result<()> {
        let room_id: OwnedRoomId = room_id.parse().context("Invalid room ID")?;
        self.client
            .join_room_by_id(&room_id)
            .await
            .context("Failed to join room")?;
        Ok(())
    }

    async fn send(&self, room_id: &str, content: MessageContent) -> Result<()> {
        let room = self.room(room_id)?;
        let messages = match content {
            MessageContent::Plain(text) => chunk_message(&text, MAX_CHUNK_SIZE)
                .into_iter()
                .map(RoomMessageEventContent::text_plain)
                .collect(),
            MessageContent::Html { plain, html } => {
                vec![RoomMessageEventContent::text_html(plain, html)]
            }
        };

        for message in messages {
            room.send(message)
                .await
                .context("Failed to send message")?;
        }
        Ok(())
    }
}

/// Convert a room message. Only text, notice and emote messages are routed.
pub fn message_event(room_id: &str, ev: &OriginalSyncRoomMessageEvent) -> Option<InboundEvent> {
    let (body, formatted) = match &ev.content.msgtype {
        MessageType::Text(text) => (&text.body, text.formatted.as_ref()),
        MessageType::Notice(notice) => (&notice.body, notice.formatted.as_ref()),
        MessageType::Emote(emote) => (&emote.body, emote.formatted.as_ref()),
        _ => return None,
    };

    let millis: u64 = ev.origin_server_ts.0.into();
    let event = InboundEvent::message(
        ev.sender.as_str(),
        room_id,
        ev.event_id.as_str(),
        (millis / 1000) as i64,
        body.as_str(),
    );

    Some(match formatted {
        Some(formatted) => event.with_formatted_body(formatted.body.as_str()),
        None => event,
    })
}

/// Convert a stripped (invite-state) membership event. These carry no
/// timestamp, so `now` is used.
pub fn stripped_member_event(room_id: &str, ev: &StrippedRoomMemberEvent, now: i64) -> InboundEvent {
    InboundEvent::membership(
        ev.sender.as_str(),
        room_id,
        ev.state_key.as_str(),
        Membership::parse(ev.content.membership.as_str()),
        now,
    )
}

/// Convert a timeline membership event
pub fn member_event(room_id: &str, ev: &SyncRoomMemberEvent) -> InboundEvent {
    let millis: u64 = ev.origin_server_ts().0.into();
    InboundEvent::membership(
        ev.sender().as_str(),
        room_id,
        ev.state_key().as_str(),
        Membership::parse(ev.membership().as_str()),
        (millis / 1000) as i64,
    )
}

/// Register SDK event handlers and return the receiving end of the event
/// channel. Handlers run in sync order and push without reordering.
pub fn setup_event_stream(transport: &MatrixTransport) -> mpsc::Receiver<TransportEvent> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let client = transport.client().clone();
    let own_user_id = transport.own_user_id().to_string();

    let message_tx = tx.clone();
    client.add_event_handler(move |ev: OriginalSyncRoomMessageEvent, room: Room| {
        let tx = message_tx.clone();
        async move {
            let Some(event) = message_event(room.room_id().as_str(), &ev) else {
                return;
            };
            if tx.send(TransportEvent::Message(event)).await.is_err() {
                tracing::warn!("Event stream receiver dropped");
            }
        }
    });

    let invite_tx = tx.clone();
    let invite_user_id = own_user_id.clone();
    client.add_event_handler(move |ev: StrippedRoomMemberEvent, room: Room| {
        let tx = invite_tx.clone();
        let own_user_id = invite_user_id.clone();
        async move {
            if ev.state_key.as_str() != own_user_id {
                return;
            }
            let now = chrono::Utc::now().timestamp();
            let event = stripped_member_event(room.room_id().as_str(), &ev, now);
            if tx.send(TransportEvent::Membership(event)).await.is_err() {
                tracing::warn!("Event stream receiver dropped");
            }
        }
    });

    client.add_event_handler(move |ev: SyncRoomMemberEvent, room: Room| {
        let tx = tx.clone();
        let own_user_id = own_user_id.clone();
        async move {
            if ev.state_key().as_str() != own_user_id {
                return;
            }
            let event = member_event(room.room_id().as_str(), &ev);
            if tx.send(TransportEvent::Membership(event)).await.is_err() {
                tracing::warn!("Event stream receiver dropped");
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(content: serde_json::Value) -> OriginalSyncRoomMessageEvent {
        serde_json::from_value(json!({
            "type": "m.room.message",
            "event_id": "$abc:example.org",
            "sender": "@alice:example.org",
            "origin_server_ts": 1_700_000_000_123u64,
            "content": content,
        }))
        .unwrap()
    }

    #[test]
    fn test_text_message_conversion() {
        let ev = message(json!({"msgtype": "m.text", "body": "!ping"}));
        let event = message_event("!room:example.org", &ev).unwrap();
        assert_eq!(event.sender, "@alice:example.org");
        assert_eq!(event.room_id, "!room:example.org");
        assert_eq!(event.event_id, "$abc:example.org");
        assert_eq!(event.timestamp, 1_700_000_000);
        assert_eq!(event.body, "!ping");
        assert_eq!(event.formatted_body, None);
    }

    #[test]
    fn test_formatted_body_is_kept() {
        let ev = message(json!({
            "msgtype": "m.notice",
            "body": "eval",
            "format": "org.matrix.custom.html",
            "formatted_body": "<b>eval</b>",
        }));
        let event = message_event("!room:example.org", &ev).unwrap();
        assert_eq!(event.formatted_body.as_deref(), Some("<b>eval</b>"));
    }

    #[test]
    fn test_non_text_messages_are_skipped() {
        let ev = message(json!({
            "msgtype": "m.image",
            "body": "cat.png",
            "url": "mxc://example.org/abc",
        }));
        assert!(message_event("!room:example.org", &ev).is_none());
    }

    #[test]
    fn test_stripped_invite_conversion() {
        let ev: StrippedRoomMemberEvent = serde_json::from_value(json!({
            "type": "m.room.member",
            "sender": "@alice:example.org",
            "state_key": "@bot:example.org",
            "content": {"membership": "invite"},
        }))
        .unwrap();
        let event = stripped_member_event("!room:example.org", &ev, 42);
        assert!(event.is_invite_for("@bot:example.org"));
        assert_eq!(event.timestamp, 42);
        assert!(event.event_id.is_empty());
    }

    #[test]
    fn test_transport_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MatrixTransport>();
    }
}
