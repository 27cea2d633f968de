use async_trait::async_trait;

use crate::error::SinkError;
use crate::record::ResponseRecord;

/// An append-only destination for response records.
///
/// `append` is all-or-nothing: on `Err` no part of the record may have been
/// stored. Implementations decide nothing about retries; callers issue one
/// attempt per participant action.
///
/// Implementations must be `Send + Sync + 'static` so a single sink can sit
/// in axum application state and be shared by every flow.
#[async_trait]
pub trait ResponseSink: Send + Sync + 'static {
    /// Persist one record.
    async fn append(&self, record: &ResponseRecord) -> Result<(), SinkError>;

    /// Short backend name for logs (e.g. `"supabase"`).
    fn sink_id(&self) -> &str;
}
