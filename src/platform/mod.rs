// ABOUTME: Chat platform integration for the bot
// ABOUTME: Platform event handlers feed TransportEvents into one ordered channel

pub mod matrix;

use nixbot_core::InboundEvent;

pub use matrix::{setup_event_stream, MatrixTransport};

/// Capacity of the channel between platform event handlers and the event loop
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// An inbound event as delivered by the platform, in sync order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A room message
    Message(InboundEvent),
    /// A membership change that concerns the bot's own user
    Membership(InboundEvent),
}

impl TransportEvent {
    pub fn event(&self) -> &InboundEvent {
        match self {
            Self::Message(event) | Self::Membership(event) => event,
        }
    }
}
