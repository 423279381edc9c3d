//! Candidate onboarding workflow: form validation, the timed review pipeline, the
//! contract and payment confirmation steps, and the simulated chat assistant.
//!
//! [`OnboardingSession`] is the clock-free core. [`SessionDriver`] runs it on tokio timers and
//! [`session_router`] exposes it to an HTTP presenter.

pub mod chat;
pub mod domain;
pub mod driver;
pub mod identifiers;
pub mod machine;
pub mod router;
pub mod session;
pub(crate) mod timeline;
pub mod validation;

pub use chat::{
    CannedReplies, ChatConfig, ChatError, ChatSimulator, CyclingReplySelector,
    RandomReplySelector, ReplySelector,
};
pub use domain::{
    CandidateField, CandidateRecord, ChatMessage, MessageId, ProcessId, Progress, Sender, Stage,
    StageTransition, TrackingCode, TransitionTrigger,
};
pub use driver::{Clock, MonotonicClock, SessionDriver};
pub use machine::{Intent, StageMachine, StageTimings, TimingsError, WorkflowError};
pub use router::session_router;
pub use session::{
    OnboardingSession, SessionContext, SessionEvents, SessionSettings, SessionSnapshot,
};
pub use validation::{format_national_id, validate, FieldError, ValidationErrors};
