//! In-process sink.
//!
//! Used by `pygmalion serve --memory-sink` for rehearsals without a hosted
//! database, and by tests. Failures can be injected with [`MemorySink::fail_next`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::SinkError;
use crate::record::ResponseRecord;
use crate::traits::ResponseSink;

#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<ResponseRecord>>,
    /// Number of upcoming appends that will fail.
    pending_failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    /// Make the next `count` appends fail with [`SinkError::Backend`].
    pub fn fail_next(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Snapshot of every record appended so far, in append order.
    pub fn records(&self) -> Vec<ResponseRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of `append` calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ResponseRecord>> {
        // A panic while holding the lock cannot leave a half-written Vec behind.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ResponseSink for MemorySink {
    async fn append(&self, record: &ResponseRecord) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.take_failure() {
            return Err(SinkError::Backend("injected failure".to_string()));
        }

        let mut records = self.lock();
        records.push(record.clone());
        tracing::info!(
            session = %record.session_id,
            scenario = %record.scenario,
            condition = %record.condition,
            rating = record.rating,
            total = records.len(),
            "recorded response in memory"
        );
        Ok(())
    }

    fn sink_id(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pygmalion_core::{Condition, ScenarioId, SessionId};

    fn record(rating: i32) -> ResponseRecord {
        ResponseRecord {
            session_id: SessionId::default(),
            scenario: ScenarioId::Produkt,
            condition: Condition::Low,
            rating,
        }
    }

    #[tokio::test]
    async fn appends_in_order() {
        let sink = MemorySink::new();
        sink.append(&record(1)).await.unwrap();
        sink.append(&record(2)).await.unwrap();

        let ratings: Vec<i32> = sink.records().iter().map(|r| r.rating).collect();
        assert_eq!(ratings, vec![1, 2]);
        assert_eq!(sink.attempts(), 2);
    }

    #[tokio::test]
    async fn injected_failures_store_nothing() {
        let sink = MemorySink::new();
        sink.fail_next(2);

        assert!(matches!(sink.append(&record(1)).await, Err(SinkError::Backend(_))));
        assert!(sink.append(&record(2)).await.is_err());
        assert!(sink.is_empty());

        sink.append(&record(3)).await.unwrap();
        assert_eq!(sink.records(), vec![record(3)]);
        assert_eq!(sink.attempts(), 3);
    }

    #[test]
    fn sink_id_is_memory() {
        assert_eq!(MemorySink::new().sink_id(), "memory");
    }
}
