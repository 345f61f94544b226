pub mod audit;
pub mod config;
pub mod documents;
pub mod domain;
pub mod envelope;
pub mod errors;
pub mod workflow;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use documents::{DocumentError, DocumentFolder, DocumentRef, DocumentUpload};
pub use domain::request::{Request, RequestId, RequestKind, RequestStatus, TransitionRecord};
pub use domain::role::{Actor, Role};
pub use envelope::{decode_rows, EnvelopeError};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use workflow::{TransitionTable, WorkflowAction, WorkflowError};
