// State machine module for publish job lifecycles
//
// The transition table is pure: it decides the target state for an event and
// applies the accompanying field changes to a job record. Locking and
// persistence belong to the job registry.

pub mod errors;
pub mod events;
pub mod job_state_machine;
pub mod states;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::JobEvent;
pub use job_state_machine::{JobStateMachine, Transition};
pub use states::JobState;
