pub mod engine;
pub mod states;

pub use engine::{LifecycleTransitionError, QuoteRequestLifecycle};
pub use states::{AssignmentTally, LifecycleContext, RequestEvent, SubmissionGate, TransitionOutcome};
