// ABOUTME: Admission gate - decides whether to join rooms the agent is invited to
// ABOUTME: Per-room state machine NotMember -> Evaluating -> Joined | Ignored, driven by a policy

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use crate::event::InboundEvent;
use crate::metrics;
use crate::traits::Transport;

/// Outcome of evaluating one invite
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Accept { reason: Option<String> },
    Reject { reason: Option<String> },
}

impl AdmissionDecision {
    pub fn accept() -> Self {
        Self::Accept { reason: None }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self::Reject {
            reason: Some(reason.into()),
        }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Accept { reason } | Self::Reject { reason } => reason.as_deref(),
        }
    }
}

/// The invitation under evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    pub sender: String,
    pub room_id: String,
}

/// Injectable invite admission policy.
///
/// Returning `Err` is treated as a rejection with the error text as reason.
#[async_trait]
pub trait InvitePolicy: Send + Sync {
    async fn evaluate(&self, invite: &Invite) -> Result<AdmissionDecision>;
}

/// Accepts every invite
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl InvitePolicy for AcceptAll {
    async fn evaluate(&self, _invite: &Invite) -> Result<AdmissionDecision> {
        Ok(AdmissionDecision::accept())
    }
}

/// Accepts invites only from listed user IDs
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    users: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl InvitePolicy for AllowList {
    async fn evaluate(&self, invite: &Invite) -> Result<AdmissionDecision> {
        if self.users.contains(&invite.sender) {
            Ok(AdmissionDecision::accept())
        } else {
            Ok(AdmissionDecision::reject(format!(
                "{} is not an allowed inviter",
                invite.sender
            )))
        }
    }
}

/// Per-room admission state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteState {
    NotMember,
    Evaluating,
    Joined,
    Ignored,
}

/// Result of handing an event to the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Not an invitation addressed to the agent
    NotForUs,
    /// The room's invite was already handled; nothing was done
    AlreadyResolved(InviteState),
    /// The invite was evaluated just now
    Resolved {
        decision: AdmissionDecision,
        state: InviteState,
    },
}

/// Invite admission state machine
pub struct AdmissionGate {
    own_user_id: String,
    transport: Arc<dyn Transport>,
    policy: Arc<dyn InvitePolicy>,
    rooms: Mutex<HashMap<String, InviteState>>,
}

impl AdmissionGate {
    /// Create a gate with the default accept-all policy
    pub fn new(own_user_id: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            own_user_id: own_user_id.into(),
            transport,
            policy: Arc::new(AcceptAll),
            rooms: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_invite_policy(&mut self, policy: Arc<dyn InvitePolicy>) {
        self.policy = policy;
    }

    pub fn with_policy(mut self, policy: Arc<dyn InvitePolicy>) -> Self {
        self.set_invite_policy(policy);
        self
    }

    /// Current state for `room_id`
    pub fn state(&self, room_id: &str) -> InviteState {
        self.lock()
            .get(room_id)
            .copied()
            .unwrap_or(InviteState::NotMember)
    }

    /// Drop the recorded state for a room so a future invite is evaluated again
    pub fn forget(&self, room_id: &str) {
        self.lock().remove(room_id);
    }

    /// Evaluate an inbound membership event
    pub async fn handle_invite(&self, event: &InboundEvent) -> AdmissionOutcome {
        metrics::record_event_received("membership");
        if !event.is_invite_for(&self.own_user_id) {
            return AdmissionOutcome::NotForUs;
        }

        {
            let mut rooms = self.lock();
            let state = rooms
                .get(&event.room_id)
                .copied()
                .unwrap_or(InviteState::NotMember);
            if state != InviteState::NotMember {
                tracing::debug!(
                    room_id = %event.room_id,
                    state = ?state,
                    "Invite already resolved, skipping"
                );
                return AdmissionOutcome::AlreadyResolved(state);
            }
            rooms.insert(event.room_id.clone(), InviteState::Evaluating);
        }

        let invite = Invite {
            sender: event.sender.clone(),
            room_id: event.room_id.clone(),
        };

        let decision = match self.policy.evaluate(&invite).await {
            Ok(decision) => decision,
            Err(e) => AdmissionDecision::reject(format!("policy error: {}", e)),
        };

        let state = if decision.is_accept() {
            metrics::record_invite("accept");
            tracing::info!(
                room_id = %invite.room_id,
                inviter = %invite.sender,
                "Accepting room invite"
            );
            if let Err(e) = self.transport.join_room(&invite.room_id).await {
                tracing::error!(
                    error = %e,
                    room_id = %invite.room_id,
                    inviter = %invite.sender,
                    "Failed to join room after invite"
                );
            }
            InviteState::Joined
        } else {
            metrics::record_invite("reject");
            tracing::warn!(
                room_id = %invite.room_id,
                inviter = %invite.sender,
                reason = decision.reason().unwrap_or("none"),
                "Ignoring room invite"
            );
            InviteState::Ignored
        };

        self.lock().insert(invite.room_id.clone(), state);
        AdmissionOutcome::Resolved { decision, state }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, InviteState>> {
        self.rooms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
