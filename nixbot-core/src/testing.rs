// ABOUTME: Recording Transport for tests of the dispatcher, admission gate and handlers
// ABOUTME: Captures every outward call and can be told to fail individual operations

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use crate::traits::{MessageContent, Transport};

/// A captured outward call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    MarkRead { room_id: String, event_id: String },
    Join { room_id: String },
    Send { room_id: String, content: MessageContent },
}

/// In-memory transport that records calls instead of talking to a server
#[derive(Debug, Default)]
pub struct MockTransport {
    user_id: String,
    calls: Mutex<Vec<TransportCall>>,
    fail_mark_read: AtomicBool,
    fail_join: AtomicBool,
}

impl MockTransport {
    pub fn new(user_id: &str) -> Arc<Self> {
        Arc::new(Self {
            user_id: user_id.to_string(),
            ..Self::default()
        })
    }

    pub fn fail_mark_read(&self, fail: bool) {
        self.fail_mark_read.store(fail, Ordering::SeqCst);
    }

    pub fn fail_join(&self, fail: bool) {
        self.fail_join.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().clone()
    }

    pub fn joins(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Join { room_id } => Some(room_id),
                _ => None,
            })
            .collect()
    }

    pub fn read_receipts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::MarkRead { event_id, .. } => Some(event_id),
                _ => None,
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<(String, MessageContent)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Send { room_id, content } => Some((room_id, content)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: TransportCall) {
        self.lock().push(call);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TransportCall>> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn own_user_id(&self) -> &str {
        &self.user_id
    }

    async fn mark_read(&self, room_id: &str, event_id: &str) -> Result<()> {
        self.record(TransportCall::MarkRead {
            room_id: room_id.to_string(),
            event_id: event_id.to_string(),
        });
        if self.fail_mark_read.load(Ordering::SeqCst) {
            anyhow::bail!("mark_read failed");
        }
        Ok(())
    }

    async fn join_room(&self, room_id: &str) -> Result<()> {
        self.record(TransportCall::Join {
            room_id: room_id.to_string(),
        });
        if self.fail_join.load(Ordering::SeqCst) {
            anyhow::bail!("join failed");
        }
        Ok(())
    }

    async fn send(&self, room_id: &str, content: MessageContent) -> Result<()> {
        self.record(TransportCall::Send {
            room_id: room_id.to_string(),
            content,
        });
        Ok(())
    }
}
