use serde::{Deserialize, Serialize};

/// Events that can trigger publish job state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum JobEvent {
    /// Orchestrator is calling the builder's submit
    BeginSubmit,
    /// Builder accepted the job
    Submitted { external_handle: String },
    /// Builder finished and published an artifact
    Succeed { result_url: String },
    /// Submit failed, builder reported failure, or the job timed out
    Fail { error: String },
    /// Caller canceled the job
    Cancel,
}

impl JobEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BeginSubmit => "begin_submit",
            Self::Submitted { .. } => "submitted",
            Self::Succeed { .. } => "succeed",
            Self::Fail { .. } => "fail",
            Self::Cancel => "cancel",
        }
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl ToString) -> Self {
        Self::Fail {
            error: error.to_string(),
        }
    }
}
