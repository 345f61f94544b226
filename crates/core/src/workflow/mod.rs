pub mod engine;
pub mod permits;
pub mod states;
pub mod table;

pub use engine::{TransitionTable, WorkflowError};
pub use permits::{PermitAssessment, PriorPersonalPermit};
pub use states::{AvailableAction, InitialHints, TransitionOutcome, WorkflowAction};
pub use table::TransitionRule;
