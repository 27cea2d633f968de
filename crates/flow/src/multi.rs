//! Multi-scenario flow: the whole catalog, in catalog order.

use pygmalion_core::{Catalog, Condition, ConditionAssigner, ScenarioDefinition, SessionId};
use pygmalion_storage::{ResponseRecord, ResponseSink, SinkError};

use crate::error::FlowError;
use crate::{Attempt, SubmitOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiPhase {
    /// Accepting input for the scenario at `current_index`.
    Accepting,
    /// Waiting for the sink. Input is disabled.
    Submitting,
    /// Terminal. Every scenario has a stored response.
    Complete,
}

/// Drives one participant through every scenario.
///
/// Conditions for all positions are drawn when the flow starts and never
/// change afterwards. A failed append does not leave an error state behind:
/// the flow raises a one-shot notice and keeps accepting input at the same
/// position with the current rating untouched.
#[derive(Debug)]
pub struct MultiScenarioFlow {
    session: SessionId,
    scenarios: Vec<ScenarioDefinition>,
    conditions: Vec<Condition>,
    current_index: usize,
    rating: Option<i32>,
    show_warning: bool,
    failure_notice: bool,
    phase: MultiPhase,
}

impl MultiScenarioFlow {
    pub fn start(catalog: &Catalog, session: SessionId, assigner: &dyn ConditionAssigner) -> Self {
        let scenarios = catalog.scenarios().to_vec();
        let conditions = assigner.assign_many(scenarios.len());
        let rating = scenarios.first().map(ScenarioDefinition::default_rating);

        MultiScenarioFlow {
            session,
            scenarios,
            conditions,
            current_index: 0,
            rating,
            show_warning: false,
            failure_notice: false,
            phase: MultiPhase::Accepting,
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Number of scenarios in this run.
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// 0-based position of the scenario being rated.
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// The scenario being rated; `None` once the flow is complete.
    pub fn current(&self) -> Option<&ScenarioDefinition> {
        if self.phase == MultiPhase::Complete {
            return None;
        }
        self.scenarios.get(self.current_index)
    }

    /// The condition drawn for the current position.
    pub fn condition(&self) -> Option<Condition> {
        self.current().map(|_| self.conditions[self.current_index])
    }

    /// Every condition drawn at start, by position.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// The framing text for the current scenario.
    pub fn label(&self) -> Option<&str> {
        let scenario = self.current()?;
        Some(scenario.label_for(self.conditions[self.current_index]))
    }

    pub fn rating(&self) -> Option<i32> {
        self.rating
    }

    pub fn show_warning(&self) -> bool {
        self.show_warning
    }

    pub fn phase(&self) -> MultiPhase {
        self.phase
    }

    pub fn is_last(&self) -> bool {
        self.current_index + 1 >= self.scenarios.len()
    }

    /// Whether a failure notice is pending, without consuming it.
    pub fn has_failure_notice(&self) -> bool {
        self.failure_notice
    }

    /// Consume the failure notice. Returns `true` at most once per failure.
    pub fn take_failure_notice(&mut self) -> bool {
        std::mem::take(&mut self.failure_notice)
    }

    pub fn set_rating(&mut self, rating: i32) -> Result<(), FlowError> {
        let scenario = self.accepting_scenario()?;
        if !scenario.accepts(rating) {
            return Err(FlowError::RatingOutOfRange {
                rating,
                min: scenario.min_value,
                max: scenario.max_value,
            });
        }
        self.rating = Some(rating);
        self.show_warning = false;
        Ok(())
    }

    pub fn clear_rating(&mut self) -> Result<(), FlowError> {
        self.accepting_scenario()?;
        self.rating = None;
        Ok(())
    }

    /// First half of a submit: validate locally and enter `submitting`.
    pub fn begin_submit(&mut self) -> Result<Attempt, FlowError> {
        let scenario_id = self.accepting_scenario()?.id;

        let Some(rating) = self.rating else {
            self.show_warning = true;
            return Ok(Attempt::MissingRating);
        };

        self.phase = MultiPhase::Submitting;
        self.show_warning = false;
        self.failure_notice = false;
        Ok(Attempt::Send(ResponseRecord {
            session_id: self.session.clone(),
            scenario: scenario_id,
            condition: self.conditions[self.current_index],
            rating,
        }))
    }

    /// Second half of a submit: advance on success, raise the notice on failure.
    pub fn finish_submit(
        &mut self,
        result: Result<(), SinkError>,
    ) -> Result<SubmitOutcome, FlowError> {
        if self.phase != MultiPhase::Submitting {
            return Err(FlowError::NotSubmitting);
        }

        if let Err(e) = result {
            tracing::warn!(
                session = %self.session,
                position = self.current_index,
                error = %e,
                "submission failed"
            );
            self.failure_notice = true;
            self.phase = MultiPhase::Accepting;
            return Ok(SubmitOutcome::Failed);
        }

        if self.is_last() {
            self.phase = MultiPhase::Complete;
            return Ok(SubmitOutcome::Completed);
        }

        self.current_index += 1;
        self.rating = Some(self.scenarios[self.current_index].default_rating());
        self.show_warning = false;
        self.phase = MultiPhase::Accepting;
        Ok(SubmitOutcome::Saved)
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

    fn accepting_scenario(&self) -> Result<&ScenarioDefinition, FlowError> {
        match self.phase {
            MultiPhase::Accepting => self
                .scenarios
                .get(self.current_index)
                .ok_or(FlowError::Finished),
            MultiPhase::Submitting => Err(FlowError::Busy),
            MultiPhase::Complete => Err(FlowError::Finished),
        }
    }
}
