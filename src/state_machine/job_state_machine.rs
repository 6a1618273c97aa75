use chrono::Utc;

use super::{
    errors::{StateMachineError, StateMachineResult},
    events::JobEvent,
    states::JobState,
};
use crate::models::PublishJob;

/// A state change that was applied to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: JobState,
    pub to: JobState,
}

/// Transition table for publish jobs
pub struct JobStateMachine;

impl JobStateMachine {
    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: JobState,
        event: &JobEvent,
    ) -> StateMachineResult<JobState> {
        let target = match (current_state, event) {
            (JobState::Queued, JobEvent::BeginSubmit) => JobState::Submitting,
            (JobState::Submitting, JobEvent::Submitted { .. }) => JobState::Running,
            (JobState::Running, JobEvent::Succeed { .. }) => JobState::Succeeded,

            (JobState::Submitting | JobState::Running, JobEvent::Fail { .. }) => JobState::Failed,
            (JobState::Queued | JobState::Submitting | JobState::Running, JobEvent::Cancel) => {
                JobState::Canceled
            }

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Apply an event to a job record.
    ///
    /// On error the record is left untouched.
    pub fn apply(job: &mut PublishJob, event: JobEvent) -> StateMachineResult<Transition> {
        let from = job.state;
        let to = Self::determine_target_state(from, &event)?;

        match event {
            JobEvent::Submitted { external_handle } => {
                job.external_handle = Some(external_handle);
            }
            JobEvent::Succeed { result_url } => {
                job.result_url = Some(result_url);
                job.error = None;
            }
            JobEvent::Fail { error } => {
                job.error = Some(error);
            }
            JobEvent::BeginSubmit | JobEvent::Cancel => {}
        }

        job.state = to;
        job.updated_at = Utc::now();

        Ok(Transition { from, to })
    }
}
