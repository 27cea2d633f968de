//! Live participant flows, keyed by an unguessable id.
//!
//! Each flow sits behind its own mutex. The mutex is held only while a flow
//! changes state, never across a sink call: a submit locks once to enter
//! `submitting`, appends unlocked, then locks again to apply the result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pygmalion_core::{Catalog, Condition, ConditionAssigner, ScenarioDefinition, SessionId};
use pygmalion_flow::{
    Attempt, FlowError, MultiPhase, MultiScenarioFlow, SinglePhase, SingleScenarioEntry,
    SingleScenarioFlow, SubmitOutcome,
};
use pygmalion_storage::{ResponseRecord, ResponseSink, SinkError};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

// ──────────────────────────────────────────────
// Flow
// ──────────────────────────────────────────────

/// Either kind of participant flow.
#[derive(Debug)]
pub(crate) enum Flow {
    Single(SingleScenarioFlow),
    Multi(MultiScenarioFlow),
}

impl Flow {
    pub(crate) fn set_rating(&mut self, rating: i32) -> Result<(), FlowError> {
        match self {
            Flow::Single(f) => f.set_rating(rating),
            Flow::Multi(f) => f.set_rating(rating),
        }
    }

    pub(crate) fn clear_rating(&mut self) -> Result<(), FlowError> {
        match self {
            Flow::Single(f) => f.clear_rating(),
            Flow::Multi(f) => f.clear_rating(),
        }
    }

    pub(crate) fn begin_submit(&mut self) -> Result<Attempt, FlowError> {
        match self {
            Flow::Single(f) => f.begin_submit(),
            Flow::Multi(f) => f.begin_submit(),
        }
    }

    pub(crate) fn finish_submit(
        &mut self,
        result: Result<(), SinkError>,
    ) -> Result<SubmitOutcome, FlowError> {
        match self {
            Flow::Single(f) => f.finish_submit(result),
            Flow::Multi(f) => f.finish_submit(result),
        }
    }

    /// A failed single-scenario submit only accepts a retry.
    pub(crate) fn awaiting_retry(&self) -> bool {
        matches!(self, Flow::Single(f) if f.phase() == SinglePhase::Error)
    }

    /// Snapshot for rendering. Consumes a pending multi-flow failure notice.
    pub(crate) fn view(&mut self, id: &str) -> FlowView {
        match self {
            Flow::Single(f) => {
                let state = match f.phase() {
                    SinglePhase::Ready => FlowState::Ready,
                    SinglePhase::Submitting => FlowState::Submitting,
                    SinglePhase::Success => FlowState::Success,
                    SinglePhase::Error => FlowState::Error,
                };
                FlowView {
                    id: id.to_string(),
                    mode: FlowMode::Single,
                    session: f.session().clone(),
                    state,
                    position: 1,
                    total: 1,
                    scenario: Some(ScenarioView::new(f.scenario(), f.condition())),
                    rating: f.rating(),
                    show_warning: f.show_warning(),
                    failure_notice: false,
                    is_last: true,
                }
            }
            Flow::Multi(f) => {
                let failure_notice = f.take_failure_notice();
                let state = match f.phase() {
                    MultiPhase::Accepting => FlowState::Ready,
                    MultiPhase::Submitting => FlowState::Submitting,
                    MultiPhase::Complete => FlowState::Complete,
                };
                let scenario = f
                    .current()
                    .zip(f.condition())
                    .map(|(s, c)| ScenarioView::new(s, c));
                FlowView {
                    id: id.to_string(),
                    mode: FlowMode::Multi,
                    session: f.session().clone(),
                    state,
                    position: f.current_index() + 1,
                    total: f.len(),
                    scenario,
                    rating: f.rating(),
                    show_warning: f.show_warning(),
                    failure_notice,
                    is_last: f.is_last(),
                }
            }
        }
    }
}

// ──────────────────────────────────────────────
// Views
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum FlowMode {
    Single,
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum FlowState {
    Ready,
    Submitting,
    Success,
    Error,
    Complete,
}

/// What the participant sees of the current scenario: only the framing
/// text for their condition, never the other one.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ScenarioView {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) question: String,
    pub(crate) label: String,
    pub(crate) condition: Condition,
    pub(crate) min_value: i32,
    pub(crate) max_value: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) image_url: Option<String>,
}

impl ScenarioView {
    fn new(scenario: &ScenarioDefinition, condition: Condition) -> Self {
        ScenarioView {
            id: scenario.id.to_string(),
            title: scenario.title.clone(),
            question: scenario.question.clone(),
            label: scenario.label_for(condition).to_string(),
            condition,
            min_value: scenario.min_value,
            max_value: scenario.max_value,
            image_url: scenario.image_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct FlowView {
    pub(crate) id: String,
    pub(crate) mode: FlowMode,
    pub(crate) session: SessionId,
    pub(crate) state: FlowState,
    /// 1-based position of the current scenario.
    pub(crate) position: usize,
    pub(crate) total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) scenario: Option<ScenarioView>,
    pub(crate) rating: Option<i32>,
    pub(crate) show_warning: bool,
    pub(crate) failure_notice: bool,
    pub(crate) is_last: bool,
}

// ──────────────────────────────────────────────
// Registry
// ──────────────────────────────────────────────

pub(crate) struct FlowSlot {
    pub(crate) flow: Flow,
    touched: Instant,
}

impl FlowSlot {
    fn new(flow: Flow) -> Self {
        FlowSlot {
            flow,
            touched: Instant::now(),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.touched = Instant::now();
    }
}

pub(crate) type SharedSlot = Arc<Mutex<FlowSlot>>;

/// Outcome of asking the registry for a single-scenario flow.
pub(crate) enum Started {
    Created(String),
    NotFound { requested: String },
}

pub(crate) struct FlowRegistry {
    flows: RwLock<HashMap<String, SharedSlot>>,
    ttl: Duration,
}

impl FlowRegistry {
    pub(crate) fn new(ttl: Duration) -> Self {
        FlowRegistry {
            flows: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub(crate) async fn start_multi(
        &self,
        catalog: &Catalog,
        session: SessionId,
        assigner: &dyn ConditionAssigner,
    ) -> String {
        let flow = MultiScenarioFlow::start(catalog, session, assigner);
        tracing::info!(
            session = %flow.session(),
            conditions = ?flow.conditions(),
            "started multi-scenario flow"
        );
        self.insert(Flow::Multi(flow)).await
    }

    pub(crate) async fn start_single(
        &self,
        catalog: &Catalog,
        requested: &str,
        session: SessionId,
        assigner: &dyn ConditionAssigner,
    ) -> Started {
        match SingleScenarioFlow::load(catalog, requested, session, assigner) {
            SingleScenarioEntry::NotFound { requested } => {
                tracing::info!(%requested, "requested scenario not in catalog");
                Started::NotFound { requested }
            }
            SingleScenarioEntry::Found(flow) => {
                tracing::info!(
                    session = %flow.session(),
                    scenario = %flow.scenario().id,
                    condition = %flow.condition(),
                    "started single-scenario flow"
                );
                Started::Created(self.insert(Flow::Single(flow)).await)
            }
        }
    }

    pub(crate) async fn get(&self, id: &str) -> Option<SharedSlot> {
        self.flows.read().await.get(id).cloned()
    }

    pub(crate) async fn len(&self) -> usize {
        self.flows.read().await.len()
    }

    async fn insert(&self, flow: Flow) -> String {
        let id = new_flow_id();
        let mut flows = self.flows.write().await;
        prune(&mut flows, self.ttl);
        flows.insert(id.clone(), Arc::new(Mutex::new(FlowSlot::new(flow))));
        id
    }
}

/// Drop flows idle for longer than `ttl`. Flows locked right now are in use.
fn prune(flows: &mut HashMap<String, SharedSlot>, ttl: Duration) {
    let before = flows.len();
    flows.retain(|_, slot| match slot.try_lock() {
        Ok(guard) => guard.touched.elapsed() < ttl,
        Err(_) => true,
    });
    let evicted = before - flows.len();
    if evicted > 0 {
        tracing::debug!(evicted, remaining = flows.len(), "evicted idle flows");
    }
}

/// 128 random bits, hex encoded.
fn new_flow_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Run one participant submit against `slot`, releasing the lock while the
/// sink call is in flight.
///
/// The append and its resolution run on a spawned task, so the flow leaves
/// `submitting` even when the calling request is dropped mid-append.
pub(crate) async fn submit(
    slot: &SharedSlot,
    sink: Arc<dyn ResponseSink>,
) -> Result<SubmitOutcome, FlowError> {
    let attempt = {
        let mut guard = slot.lock().await;
        guard.touch();
        guard.flow.begin_submit()?
    };

    let record = match attempt {
        Attempt::MissingRating => return Ok(SubmitOutcome::MissingRating),
        Attempt::Send(record) => record,
    };

    let task = tokio::spawn(resolve(slot.clone(), sink, record));
    match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "submission task aborted");
            let mut guard = slot.lock().await;
            guard.touch();
            guard
                .flow
                .finish_submit(Err(SinkError::Backend(format!("submission task aborted: {}", e))))
        }
    }
}

/// Append `record` and apply the result to the flow in `slot`.
async fn resolve(
    slot: SharedSlot,
    sink: Arc<dyn ResponseSink>,
    record: ResponseRecord,
) -> Result<SubmitOutcome, FlowError> {
    let result = sink.append(&record).await;
    if let Err(e) = &result {
        tracing::error!(sink = sink.sink_id(), error = %e, "append failed");
    }

    let mut guard = slot.lock().await;
    guard.touch();
    let outcome = guard.flow.finish_submit(result)?;
    tracing::info!(
        session = %record.session_id,
        scenario = %record.scenario,
        condition = %record.condition,
        rating = record.rating,
        sink = sink.sink_id(),
        ?outcome,
        "submission resolved"
    );
    Ok(outcome)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
