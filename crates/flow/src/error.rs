/// Input a flow refuses in its current state.
///
/// None of these change the flow; they report that the request was ignored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("rating {rating} is outside the scale {min}..={max}")]
    RatingOutOfRange { rating: i32, min: i32, max: i32 },

    /// A submission is in flight; input is disabled until it resolves.
    #[error("a submission is already in progress")]
    Busy,

    /// The flow reached a terminal state.
    #[error("the flow has already finished")]
    Finished,

    /// After a failed single-scenario submit only a retry is accepted.
    #[error("the last submission failed; only a retry is possible")]
    RetryOnly,

    /// `finish_submit` was called without a matching `begin_submit`.
    #[error("no submission is in progress")]
    NotSubmitting,
}
