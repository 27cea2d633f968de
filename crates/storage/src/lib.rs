//! pygmalion-storage: where submitted ratings go.
//!
//! The survey is write-only: every successful submission appends exactly one
//! [`ResponseRecord`] to a [`ResponseSink`] and nothing is ever read back.
//!
//! Backends:
//! - [`SupabaseSink`] -- inserts rows into a hosted Supabase (PostgREST) table
//! - [`MemorySink`] -- keeps records in process, for local runs and tests

mod error;
mod memory;
mod record;
mod supabase;
mod traits;

pub use error::SinkError;
pub use memory::MemorySink;
pub use record::ResponseRecord;
pub use supabase::{SupabaseConfig, SupabaseSink, DEFAULT_RESPONSES_TABLE};
pub use traits::ResponseSink;
