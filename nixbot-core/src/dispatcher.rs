// ABOUTME: Dispatcher - filters inbound message events and launches the matching route's handler
// ABOUTME: Matching is synchronous and in delivery order; handlers run as supervised tasks

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::event::InboundEvent;
use crate::handler::{HandlerContext, Replier};
use crate::metrics;
use crate::registry::RouteTable;
use crate::supervisor::TaskSupervisor;
use crate::traits::Transport;

/// Default staleness threshold for inbound events
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(60);

/// When read receipts are sent for inbound messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadReceiptPolicy {
    /// Only events that matched a route
    #[default]
    OnMatch,
    /// Every event that passed the self and staleness filters
    Always,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// The agent's own user ID; its messages are never routed
    pub own_user_id: String,
    /// Events older than this are dropped before matching
    pub staleness: Duration,
    /// Mirror handler errors back into the room as plain text
    pub surface_handler_errors: bool,
    pub read_receipts: ReadReceiptPolicy,
}

impl DispatchConfig {
    pub fn new(own_user_id: impl Into<String>) -> Self {
        Self {
            own_user_id: own_user_id.into(),
            staleness: DEFAULT_STALENESS,
            surface_handler_errors: false,
            read_receipts: ReadReceiptPolicy::default(),
        }
    }
}

/// What the dispatcher did with one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Sent by the agent itself
    OwnMessage,
    /// Older than the staleness threshold
    Stale { age_secs: i64 },
    /// No route matched
    NoMatch,
    /// A handler task was launched for the route with this pattern
    Dispatched { pattern: String },
}

/// Routes message events to handlers
pub struct Dispatcher {
    routes: RouteTable,
    transport: Arc<dyn Transport>,
    config: DispatchConfig,
    supervisor: Arc<TaskSupervisor>,
}

impl Dispatcher {
    pub fn new(routes: RouteTable, transport: Arc<dyn Transport>, config: DispatchConfig) -> Self {
        Self {
            routes,
            transport,
            config,
            supervisor: Arc::new(TaskSupervisor::new()),
        }
    }

    /// The supervisor holding this dispatcher's handler tasks
    pub fn supervisor(&self) -> Arc<TaskSupervisor> {
        Arc::clone(&self.supervisor)
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Handle one inbound message event using the wall clock
    pub async fn handle_event(&self, event: InboundEvent) -> DispatchOutcome {
        self.handle_event_at(event, chrono::Utc::now().timestamp())
            .await
    }

    /// Handle one inbound message event as if the current time were `now`
    /// (unix seconds).
    ///
    /// Returns once the handler task is launched, not when it completes.
    pub async fn handle_event_at(&self, event: InboundEvent, now: i64) -> DispatchOutcome {
        metrics::record_event_received("message");

        if event.sender == self.config.own_user_id {
            metrics::record_event_filtered("own");
            return DispatchOutcome::OwnMessage;
        }

        let age_secs = now - event.timestamp;
        if age_secs > self.config.staleness.as_secs() as i64 {
            tracing::debug!(
                event_id = %event.event_id,
                room_id = %event.room_id,
                age_secs,
                "Dropping stale event"
            );
            metrics::record_event_filtered("stale");
            return DispatchOutcome::Stale { age_secs };
        }

        if self.config.read_receipts == ReadReceiptPolicy::Always {
            self.mark_read(&event).await;
        }

        let Some(route) = self.routes.find(&event) else {
            metrics::record_event_filtered("no_match");
            return DispatchOutcome::NoMatch;
        };

        let pattern = route.pattern().to_string();
        let vars = route
            .matcher()
            .extract(event.match_target(route.matches_formatted()));
        let handler = route.handler();

        tracing::info!(
            sender = %event.sender,
            room_id = %event.room_id,
            event_id = %event.event_id,
            pattern = %pattern,
            vars = vars.len(),
            "Dispatching event to route"
        );

        if self.config.read_receipts == ReadReceiptPolicy::OnMatch {
            self.mark_read(&event).await;
        }

        let event = Arc::new(event);
        let transport = Arc::clone(&self.transport);
        let surface_errors = self.config.surface_handler_errors;
        let task_pattern = pattern.clone();

        self.supervisor.spawn(async move {
            let room_id = event.room_id.clone();
            let sender = event.sender.clone();
            let cx = HandlerContext {
                vars,
                event,
                reply: Replier::new(Arc::clone(&transport), room_id.clone()),
            };

            match handler.call(cx).await {
                Ok(()) => metrics::record_handler_run("ok"),
                Err(e) => {
                    metrics::record_handler_run("error");
                    tracing::error!(
                        error = %e,
                        pattern = %task_pattern,
                        room_id = %room_id,
                        sender = %sender,
                        "Command handler failed"
                    );

                    if surface_errors {
                        let text = format!("Error: {}", e);
                        if let Err(send_err) = transport.send_plain(&room_id, &text).await {
                            tracing::error!(
                                error = %send_err,
                                room_id = %room_id,
                                "Failed to send handler error to room"
                            );
                        }
                    }
                }
            }
        });

        DispatchOutcome::Dispatched { pattern }
    }

    /// Best-effort read receipt; failures are logged and never stop dispatch
    async fn mark_read(&self, event: &InboundEvent) {
        if event.event_id.is_empty() {
            return;
        }
        if let Err(e) = self
            .transport
            .mark_read(&event.room_id, &event.event_id)
            .await
        {
            tracing::warn!(
                error = %e,
                room_id = %event.room_id,
                event_id = %event.event_id,
                "Failed to mark message as read"
            );
        }
    }
}
