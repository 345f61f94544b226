use thiserror::Error;

use crate::{documents::DocumentError, workflow::WorkflowError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("missing or invalid credentials: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("document storage failure: {0}")]
    Storage(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<WorkflowError> for ApplicationError {
    fn from(value: WorkflowError) -> Self {
        Self::Domain(DomainError::Workflow(value))
    }
}

impl From<DocumentError> for ApplicationError {
    fn from(value: DocumentError) -> Self {
        Self::Domain(DomainError::Document(value))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("payload too large: {message}")]
    PayloadTooLarge { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unauthorized { .. } => "Valid credentials are required for this request.",
            Self::Forbidden { .. } => "Your role is not allowed to perform this action.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The request changed or is not in a state that allows this action. Reload and retry."
            }
            Self::PayloadTooLarge { .. } => "The attached document exceeds the upload limit.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    /// Stable machine-readable class used in error bodies and CLI outcome lines.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "validation",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::ServiceUnavailable { .. } => "unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn message(&self) -> &str {
        self.parts().0
    }

    pub fn correlation_id(&self) -> &str {
        self.parts().1
    }

    /// Whether the detailed message is safe to hand back to the caller.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::ServiceUnavailable { .. } | Self::Internal { .. })
    }

    fn parts(&self) -> (&str, &str) {
        match self {
            Self::BadRequest { message, correlation_id }
            | Self::Unauthorized { message, correlation_id }
            | Self::Forbidden { message, correlation_id }
            | Self::NotFound { message, correlation_id }
            | Self::Conflict { message, correlation_id }
            | Self::PayloadTooLarge { message, correlation_id }
            | Self::ServiceUnavailable { message, correlation_id }
            | Self::Internal { message, correlation_id } => (message, correlation_id),
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::PayloadTooLarge { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        let message = value.to_string();
        match value {
            ApplicationError::Domain(DomainError::Workflow(WorkflowError::Forbidden { .. }))
            | ApplicationError::Forbidden(_) => Self::Forbidden { message, correlation_id },
            ApplicationError::Domain(DomainError::Workflow(
                WorkflowError::InvalidTransition { .. },
            ))
            | ApplicationError::Conflict(_) => Self::Conflict { message, correlation_id },
            ApplicationError::Domain(DomainError::Workflow(WorkflowError::UnknownStatus {
                ..
            }))
            | ApplicationError::Domain(DomainError::InvariantViolation(_)) => {
                Self::Internal { message, correlation_id }
            }
            ApplicationError::Domain(DomainError::Document(DocumentError::TooLarge { .. })) => {
                Self::PayloadTooLarge { message, correlation_id }
            }
            ApplicationError::Domain(DomainError::Validation(_))
            | ApplicationError::Domain(DomainError::Document(_))
            | ApplicationError::Domain(DomainError::Workflow(
                WorkflowError::MissingDocument { .. },
            )) => Self::BadRequest { message, correlation_id },
            ApplicationError::Unauthorized(_) => Self::Unauthorized { message, correlation_id },
            ApplicationError::NotFound(_) => Self::NotFound { message, correlation_id },
            ApplicationError::Persistence(_) | ApplicationError::Storage(_) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(_) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::documents::DocumentError;
    use crate::domain::request::{RequestKind, RequestStatus};
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::workflow::{WorkflowAction, WorkflowError};

    #[test]
    fn validation_error_maps_to_bad_request_interface_error() {
        let interface =
            ApplicationError::from(DomainError::Validation("ruc_cedula is required".to_owned()))
                .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(interface.error_class(), "validation");
        assert!(interface.message().contains("ruc_cedula"));
    }

    #[test]
    fn bad_request_has_user_safe_message() {
        let interface =
            ApplicationError::from(DomainError::Validation("missing field".to_owned()))
                .into_interface("req-2");

        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn workflow_errors_map_to_forbidden_and_conflict() {
        let forbidden = ApplicationError::from(WorkflowError::Forbidden {
            role: crate::domain::role::Role::Comercial,
            action: WorkflowAction::SendOffer,
            status: RequestStatus::PendingCommercial,
            allowed: "backoffice_comercial".to_owned(),
        })
        .into_interface("req-3");
        assert!(matches!(forbidden, InterfaceError::Forbidden { .. }));

        let conflict = ApplicationError::from(WorkflowError::InvalidTransition {
            kind: RequestKind::EquipmentPurchase,
            status: RequestStatus::NoStock,
            action: WorkflowAction::UploadProforma,
        })
        .into_interface("req-3");
        assert!(matches!(conflict, InterfaceError::Conflict { .. }));
        assert_eq!(conflict.correlation_id(), "req-3");
    }

    #[test]
    fn oversize_document_maps_to_payload_too_large() {
        let interface =
            ApplicationError::from(DocumentError::TooLarge { size: 11, limit: 10 })
                .into_interface("req-4");
        assert!(matches!(interface, InterfaceError::PayloadTooLarge { .. }));
        assert!(interface.is_client_error());
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert!(!interface.is_client_error());
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("invalid api token".to_owned()).into_interface("req-6");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
