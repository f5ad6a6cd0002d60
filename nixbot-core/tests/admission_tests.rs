// ABOUTME: Integration tests for the admission gate and its invite policies
// ABOUTME: Verifies join side effects, recorded reasons and per-room deduplication

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use nixbot_core::testing::MockTransport;
use nixbot_core::{
    AdmissionDecision, AdmissionGate, AdmissionOutcome, AllowList, InboundEvent, Invite,
    InvitePolicy, InviteState, Membership,
};

const BOT: &str = "@bot:example.org";
const ROOM: &str = "!room:example.org";

fn invite_from(sender: &str) -> InboundEvent {
    InboundEvent::membership(sender, ROOM, BOT, Membership::Invite, 1_700_000_000)
}

/// Counts evaluations and accepts everything
#[derive(Default)]
struct CountingPolicy {
    calls: AtomicUsize,
}

#[async_trait]
impl InvitePolicy for CountingPolicy {
    async fn evaluate(&self, _invite: &Invite) -> anyhow::Result<AdmissionDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AdmissionDecision::accept())
    }
}

struct FailingPolicy;

#[async_trait]
impl InvitePolicy for FailingPolicy {
    async fn evaluate(&self, _invite: &Invite) -> anyhow::Result<AdmissionDecision> {
        anyhow::bail!("script exited with status 2")
    }
}

#[tokio::test]
async fn test_allowed_inviter_is_joined_once() {
    let transport = MockTransport::new(BOT);
    let gate = AdmissionGate::new(BOT, transport.clone())
        .with_policy(Arc::new(AllowList::new(["@admin:example.org"])));

    let outcome = gate.handle_invite(&invite_from("@admin:example.org")).await;
    assert_eq!(
        outcome,
        AdmissionOutcome::Resolved {
            decision: AdmissionDecision::accept(),
            state: InviteState::Joined,
        }
    );
    assert_eq!(transport.joins(), vec![ROOM.to_string()]);
    assert_eq!(gate.state(ROOM), InviteState::Joined);
}

#[tokio::test]
async fn test_unlisted_inviter_is_ignored_with_reason() {
    let transport = MockTransport::new(BOT);
    let gate = AdmissionGate::new(BOT, transport.clone())
        .with_policy(Arc::new(AllowList::new(["@admin:example.org"])));

    let outcome = gate.handle_invite(&invite_from("@mallory:example.org")).await;
    let AdmissionOutcome::Resolved { decision, state } = outcome else {
        panic!("expected a resolved invite, got {:?}", outcome);
    };
    assert!(!decision.is_accept());
    assert_eq!(
        decision.reason(),
        Some("@mallory:example.org is not an allowed inviter")
    );
    assert_eq!(state, InviteState::Ignored);
    assert!(transport.joins().is_empty());
}

#[tokio::test]
async fn test_default_policy_accepts_everyone() {
    let transport = MockTransport::new(BOT);
    let gate = AdmissionGate::new(BOT, transport.clone());

    gate.handle_invite(&invite_from("@anyone:example.org")).await;
    assert_eq!(transport.joins(), vec![ROOM.to_string()]);
}

#[tokio::test]
async fn test_policy_error_becomes_rejection() {
    let transport = MockTransport::new(BOT);
    let gate = AdmissionGate::new(BOT, transport.clone()).with_policy(Arc::new(FailingPolicy));

    let outcome = gate.handle_invite(&invite_from("@alice:example.org")).await;
    assert_eq!(
        outcome,
        AdmissionOutcome::Resolved {
            decision: AdmissionDecision::reject("policy error: script exited with status 2"),
            state: InviteState::Ignored,
        }
    );
    assert!(transport.joins().is_empty());
}

#[tokio::test]
async fn test_join_failure_still_resolves_room() {
    let transport = MockTransport::new(BOT);
    transport.fail_join(true);
    let gate = AdmissionGate::new(BOT, transport.clone());

    gate.handle_invite(&invite_from("@alice:example.org")).await;
    assert_eq!(transport.joins().len(), 1);
    assert_eq!(gate.state(ROOM), InviteState::Joined);
}

#[tokio::test]
async fn test_non_invite_events_are_not_for_us() {
    let transport = MockTransport::new(BOT);
    let gate = AdmissionGate::new(BOT, transport.clone());

    let someone_else = InboundEvent::membership(
        "@alice:example.org",
        ROOM,
        "@carol:example.org",
        Membership::Invite,
        0,
    );
    let join = InboundEvent::membership("@alice:example.org", ROOM, BOT, Membership::Join, 0);
    let message = InboundEvent::message("@alice:example.org", ROOM, "$m", 0, "!ping");

    for event in [someone_else, join, message] {
        assert_eq!(gate.handle_invite(&event).await, AdmissionOutcome::NotForUs);
    }
    assert!(transport.calls().is_empty());
    assert_eq!(gate.state(ROOM), InviteState::NotMember);
}

#[tokio::test]
async fn test_repeated_invite_is_not_reevaluated() {
    let transport = MockTransport::new(BOT);
    let policy = Arc::new(CountingPolicy::default());
    let gate = AdmissionGate::new(BOT, transport.clone()).with_policy(policy.clone());

    gate.handle_invite(&invite_from("@alice:example.org")).await;
    let second = gate.handle_invite(&invite_from("@alice:example.org")).await;

    assert_eq!(second, AdmissionOutcome::AlreadyResolved(InviteState::Joined));
    assert_eq!(policy.calls.load(Ordering::SeqCst), 1);
    assert_eq!(transport.joins().len(), 1);
}

#[tokio::test]
async fn test_forget_allows_reevaluation() {
    let transport = MockTransport::new(BOT);
    let policy = Arc::new(CountingPolicy::default());
    let gate = AdmissionGate::new(BOT, transport.clone()).with_policy(policy.clone());

    gate.handle_invite(&invite_from("@alice:example.org")).await;
    gate.forget(ROOM);
    assert_eq!(gate.state(ROOM), InviteState::NotMember);

    gate.handle_invite(&invite_from("@alice:example.org")).await;
    assert_eq!(policy.calls.load(Ordering::SeqCst), 2);
    assert_eq!(transport.joins().len(), 2);
}
