// ABOUTME: Event loop connecting the platform's event channel to the dispatcher and admission gate
// ABOUTME: Consumes events one at a time; invite evaluation runs off-loop so it never delays dispatch

use std::sync::Arc;

use nixbot_core::{AdmissionGate, Dispatcher, Membership, MembershipChange, TaskSupervisor};
use tokio::sync::mpsc;

use crate::platform::TransportEvent;

/// The engine pieces that consume platform events
pub struct Bot {
    pub dispatcher: Arc<Dispatcher>,
    pub gate: Arc<AdmissionGate>,
    invites: TaskSupervisor,
    own_user_id: String,
}

impl Bot {
    pub fn new(dispatcher: Arc<Dispatcher>, gate: Arc<AdmissionGate>) -> Self {
        let own_user_id = dispatcher.config().own_user_id.clone();
        Self {
            dispatcher,
            gate,
            invites: TaskSupervisor::new(),
            own_user_id,
        }
    }

    /// Invite evaluations that may still be running
    pub fn invites(&self) -> &TaskSupervisor {
        &self.invites
    }

    /// Handle one platform event
    pub async fn handle(&self, event: TransportEvent) {
        match event {
            TransportEvent::Message(event) => {
                self.dispatcher.handle_event(event).await;
            }
            TransportEvent::Membership(event) => {
                if event.is_invite_for(&self.own_user_id) {
                    // Policies may run scripts; the gate's Evaluating state
                    // already stops a second evaluation of the same room
                    let gate = Arc::clone(&self.gate);
                    self.invites.spawn(async move {
                        gate.handle_invite(&event).await;
                    });
                    return;
                }

                // Leaving or being banned ends the room's admission state so a
                // later invite is evaluated again
                if let Some(MembershipChange {
                    state_key,
                    membership: Membership::Leave | Membership::Ban,
                }) = &event.membership
                {
                    if *state_key == self.own_user_id {
                        tracing::info!(room_id = %event.room_id, "Left room, forgetting invite state");
                        self.gate.forget(&event.room_id);
                    }
                }
            }
        }
    }

    /// Drain `events` until the channel closes
    pub async fn run(&self, mut events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        tracing::info!("Event stream closed");
    }
}
