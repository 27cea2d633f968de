//! Single-scenario flow: one scenario, addressed directly by id.

use pygmalion_core::{Catalog, Condition, ConditionAssigner, ScenarioDefinition, SessionId};
use pygmalion_storage::{ResponseRecord, ResponseSink, SinkError};

use crate::error::FlowError;
use crate::{Attempt, SubmitOutcome};

/// Where a loaded single-scenario flow stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinglePhase {
    /// Accepting rating changes and submit.
    Ready,
    /// Waiting for the sink. Input is disabled.
    Submitting,
    /// Terminal. The response is stored.
    Success,
    /// The last append failed. Only a retry is accepted.
    Error,
}

/// Result of loading a scenario by id.
#[derive(Debug)]
pub enum SingleScenarioEntry {
    /// The id is not in the catalog. Terminal; nothing will be written.
    NotFound { requested: String },
    Found(SingleScenarioFlow),
}

#[derive(Debug)]
pub struct SingleScenarioFlow {
    session: SessionId,
    scenario: ScenarioDefinition,
    condition: Condition,
    rating: Option<i32>,
    show_warning: bool,
    phase: SinglePhase,
}

impl SingleScenarioFlow {
    /// Resolve `requested` against the catalog and, if found, draw the
    /// condition and preset the rating to the scale midpoint.
    pub fn load(
        catalog: &Catalog,
        requested: &str,
        session: SessionId,
        assigner: &dyn ConditionAssigner,
    ) -> SingleScenarioEntry {
        let Some(scenario) = catalog.resolve(requested) else {
            return SingleScenarioEntry::NotFound {
                requested: requested.to_string(),
            };
        };

        SingleScenarioEntry::Found(SingleScenarioFlow {
            session,
            condition: assigner.assign(),
            rating: Some(scenario.default_rating()),
            scenario: scenario.clone(),
            show_warning: false,
            phase: SinglePhase::Ready,
        })
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn scenario(&self) -> &ScenarioDefinition {
        &self.scenario
    }

    pub fn condition(&self) -> Condition {
        self.condition
    }

    /// The framing text this participant sees.
    pub fn label(&self) -> &str {
        self.scenario.label_for(self.condition)
    }

    pub fn rating(&self) -> Option<i32> {
        self.rating
    }

    pub fn show_warning(&self) -> bool {
        self.show_warning
    }

    pub fn phase(&self) -> SinglePhase {
        self.phase
    }

    /// Move the slider. Only allowed while `ready`.
    pub fn set_rating(&mut self, rating: i32) -> Result<(), FlowError> {
        self.ensure_ready()?;
        if !self.scenario.accepts(rating) {
            return Err(FlowError::RatingOutOfRange {
                rating,
                min: self.scenario.min_value,
                max: self.scenario.max_value,
            });
        }
        self.rating = Some(rating);
        self.show_warning = false;
        Ok(())
    }

    /// Reset the slider to "nothing selected".
    pub fn clear_rating(&mut self) -> Result<(), FlowError> {
        self.ensure_ready()?;
        self.rating = None;
        Ok(())
    }

    /// First half of a submit: validate locally and enter `submitting`.
    ///
    /// From `error` this is the retry path and re-sends the same record.
    pub fn begin_submit(&mut self) -> Result<Attempt, FlowError> {
        match self.phase {
            SinglePhase::Ready | SinglePhase::Error => {}
            SinglePhase::Submitting => return Err(FlowError::Busy),
            SinglePhase::Success => return Err(FlowError::Finished),
        }

        let Some(rating) = self.rating else {
            self.show_warning = true;
            return Ok(Attempt::MissingRating);
        };

        self.phase = SinglePhase::Submitting;
        self.show_warning = false;
        Ok(Attempt::Send(ResponseRecord {
            session_id: self.session.clone(),
            scenario: self.scenario.id,
            condition: self.condition,
            rating,
        }))
    }

    /// Second half of a submit: apply the sink's answer.
    pub fn finish_submit(
        &mut self,
        result: Result<(), SinkError>,
    ) -> Result<SubmitOutcome, FlowError> {
        if self.phase != SinglePhase::Submitting {
            return Err(FlowError::NotSubmitting);
        }

        match result {
            Ok(()) => {
                self.phase = SinglePhase::Success;
                Ok(SubmitOutcome::Completed)
            }
            Err(e) => {
                tracing::warn!(
                    session = %self.session,
                    scenario = %self.scenario.id,
                    error = %e,
                    "submission failed"
                );
                self.phase = SinglePhase::Error;
                Ok(SubmitOutcome::Failed)
            }
        }
    }

    /// Validate, append through `sink` and apply the result.
    pub async fn submit(&mut self, sink: &dyn ResponseSink) -> Result<SubmitOutcome, FlowError> {
        match self.begin_submit()? {
            Attempt::MissingRating => Ok(SubmitOutcome::MissingRating),
            Attempt::Send(record) => {
                let result = sink.append(&record).await;
                self.finish_submit(result)
            }
        }
    }

    fn ensure_ready(&self) -> Result<(), FlowError> {
        match self.phase {
            SinglePhase::Ready => Ok(()),
            SinglePhase::Submitting => Err(FlowError::Busy),
            SinglePhase::Success => Err(FlowError::Finished),
            SinglePhase::Error => Err(FlowError::RetryOnly),
        }
    }
}
