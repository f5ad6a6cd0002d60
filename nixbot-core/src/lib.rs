// ABOUTME: Platform-agnostic event dispatch and admission engine for chat bots
// ABOUTME: Routes messages to regex-matched handlers and gates room invites behind a policy

pub mod admission;
pub mod config;
pub mod dispatcher;
pub mod event;
pub mod handler;
pub mod matcher;
pub mod metrics;
pub mod paths;
pub mod registry;
pub mod render;
pub mod store;
pub mod supervisor;
pub mod testing;
pub mod traits;
pub mod vars;

pub use admission::{
    AcceptAll, AdmissionDecision, AdmissionGate, AdmissionOutcome, AllowList, Invite,
    InvitePolicy, InviteState,
};
pub use dispatcher::{DispatchConfig, DispatchOutcome, Dispatcher, ReadReceiptPolicy};
pub use event::{InboundEvent, Membership, MembershipChange};
pub use handler::{Handler, HandlerContext, Replier, SharedHandler};
pub use matcher::{Matcher, RegexMatcher};
pub use registry::{Route, RouteError, RouteRegistry, RouteTable};
pub use store::KvStore;
pub use supervisor::TaskSupervisor;
pub use traits::{MessageContent, Transport};
pub use vars::VariableBag;
