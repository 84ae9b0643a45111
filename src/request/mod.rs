//! Request lifecycle: persisted model and state machine

pub mod machine;
pub mod types;

pub use machine::{allowed_targets, amend, begin_retry, can_transition, record_attempt, transition};
pub use types::{
    Attempt, AttemptOutcome, Autonomy, EventKind, LedgerEvent, Project, Request, RequestStatus,
    SpecRevision, branch_for, SCHEMA_VERSION,
};
