/// All errors a [`ResponseSink`](crate::ResponseSink) can return.
///
/// Flow controllers do not look inside: any `Err` means "submission failed".
/// The variants exist for logs and for startup diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// A credential required to build the sink is not configured.
    #[error("missing sink credentials: {variable} is not set")]
    MissingCredentials { variable: String },

    /// The backend answered with a non-success HTTP status.
    #[error("sink rejected record with HTTP status {status}")]
    Rejected { status: u16 },

    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[error("sink transport error: {0}")]
    Transport(String),

    /// Any other backend-specific failure.
    #[error("sink backend error: {0}")]
    Backend(String),
}
