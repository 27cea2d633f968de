//! pygmalion-flow: the participant-facing state machines.
//!
//! Two controllers share one submission contract:
//!
//! - [`SingleScenarioFlow`] -- one scenario addressed by id;
//!   `ready -> submitting -> success | error`, with `error -> submitting` on retry
//! - [`MultiScenarioFlow`] -- every catalog scenario in order, advancing after
//!   each successful append and finishing in `complete`
//!
//! Submission is split in two halves so a caller that shares a flow between
//! requests can release its lock while the sink call is in flight:
//! [`begin_submit`](SingleScenarioFlow::begin_submit) moves the flow to
//! `submitting` and hands out the [`ResponseRecord`], and
//! [`finish_submit`](SingleScenarioFlow::finish_submit) applies the sink's
//! answer. `submit` chains both for callers that own the flow outright.

mod error;
mod multi;
mod single;

pub use error::FlowError;
pub use multi::{MultiPhase, MultiScenarioFlow};
pub use single::{SinglePhase, SingleScenarioEntry, SingleScenarioFlow};

use pygmalion_storage::ResponseRecord;

/// What `begin_submit` decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// No rating is selected. The warning flag is now set and nothing is sent.
    MissingRating,
    /// The flow is `submitting`; append this record and report back.
    Send(ResponseRecord),
}

/// Result of one participant-initiated submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blocked locally; the sink was not called.
    MissingRating,
    /// Appended; the flow moved on to the next scenario.
    Saved,
    /// Appended; nothing is left to rate.
    Completed,
    /// The sink rejected the append. The participant may retry.
    Failed,
}
