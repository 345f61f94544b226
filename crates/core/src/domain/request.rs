use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::documents::DocumentRef;
use crate::domain::role::Actor;
use crate::errors::DomainError;
use crate::workflow::WorkflowAction;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    PrivatePurchase,
    EquipmentPurchase,
    ClientRequest,
    Permit,
}

impl RequestKind {
    pub const ALL: [RequestKind; 4] = [
        RequestKind::PrivatePurchase,
        RequestKind::EquipmentPurchase,
        RequestKind::ClientRequest,
        RequestKind::Permit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::PrivatePurchase => "private_purchase",
            RequestKind::EquipmentPurchase => "equipment_purchase",
            RequestKind::ClientRequest => "client_request",
            RequestKind::Permit => "permit",
        }
    }

    /// Statuses a record of this kind may hold.
    pub fn statuses(&self) -> &'static [RequestStatus] {
        use RequestStatus::*;
        match self {
            RequestKind::PrivatePurchase => &[
                PendingCommercial,
                PendingBackoffice,
                OfferSent,
                PendingManagerSignature,
                PendingClientSignature,
                OfferSigned,
                ClientRegistered,
                SentToAcp,
                Rejected,
            ],
            RequestKind::EquipmentPurchase => &[
                PendingProviderAssignment,
                WaitingProviderResponse,
                NoStock,
                WaitingProforma,
                ProformaReceived,
                WaitingSignedProforma,
                PendingContract,
                Completed,
            ],
            RequestKind::ClientRequest => &[PendingConsent, PendingApproval, Approved, Rejected],
            RequestKind::Permit => {
                &[Pending, PartiallyApproved, PendingFinal, Approved, Rejected]
            }
        }
    }

    pub fn admits(&self, status: RequestStatus) -> bool {
        self.statuses().contains(&status)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "private_purchase" | "private_purchases" => Ok(Self::PrivatePurchase),
            "equipment_purchase" | "equipment_purchases" => Ok(Self::EquipmentPurchase),
            "client_request" | "client_requests" => Ok(Self::ClientRequest),
            "permit" | "permits" | "permisos" => Ok(Self::Permit),
            other => Err(DomainError::Validation(format!("unknown request kind `{other}`"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    PendingCommercial,
    PendingBackoffice,
    OfferSent,
    PendingManagerSignature,
    PendingClientSignature,
    OfferSigned,
    ClientRegistered,
    SentToAcp,
    PendingProviderAssignment,
    WaitingProviderResponse,
    NoStock,
    WaitingProforma,
    ProformaReceived,
    WaitingSignedProforma,
    PendingContract,
    Completed,
    PendingConsent,
    PendingApproval,
    Pending,
    PartiallyApproved,
    PendingFinal,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 23] = [
        RequestStatus::PendingCommercial,
        RequestStatus::PendingBackoffice,
        RequestStatus::OfferSent,
        RequestStatus::PendingManagerSignature,
        RequestStatus::PendingClientSignature,
        RequestStatus::OfferSigned,
        RequestStatus::ClientRegistered,
        RequestStatus::SentToAcp,
        RequestStatus::PendingProviderAssignment,
        RequestStatus::WaitingProviderResponse,
        RequestStatus::NoStock,
        RequestStatus::WaitingProforma,
        RequestStatus::ProformaReceived,
        RequestStatus::WaitingSignedProforma,
        RequestStatus::PendingContract,
        RequestStatus::Completed,
        RequestStatus::PendingConsent,
        RequestStatus::PendingApproval,
        RequestStatus::Pending,
        RequestStatus::PartiallyApproved,
        RequestStatus::PendingFinal,
        RequestStatus::Approved,
        RequestStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::PendingCommercial => "pending_commercial",
            RequestStatus::PendingBackoffice => "pending_backoffice",
            RequestStatus::OfferSent => "offer_sent",
            RequestStatus::PendingManagerSignature => "pending_manager_signature",
            RequestStatus::PendingClientSignature => "pending_client_signature",
            RequestStatus::OfferSigned => "offer_signed",
            RequestStatus::ClientRegistered => "client_registered",
            RequestStatus::SentToAcp => "sent_to_acp",
            RequestStatus::PendingProviderAssignment => "pending_provider_assignment",
            RequestStatus::WaitingProviderResponse => "waiting_provider_response",
            RequestStatus::NoStock => "no_stock",
            RequestStatus::WaitingProforma => "waiting_proforma",
            RequestStatus::ProformaReceived => "proforma_received",
            RequestStatus::WaitingSignedProforma => "waiting_signed_proforma",
            RequestStatus::PendingContract => "pending_contract",
            RequestStatus::Completed => "completed",
            RequestStatus::PendingConsent => "pending_consent",
            RequestStatus::PendingApproval => "pending_approval",
            RequestStatus::Pending => "pending",
            RequestStatus::PartiallyApproved => "partially_approved",
            RequestStatus::PendingFinal => "pending_final",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = value.trim().to_ascii_lowercase();
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == key)
            .ok_or_else(|| DomainError::Validation(format!("unknown request status `{value}`")))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub kind: RequestKind,
    pub status: RequestStatus,
    pub version: i64,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
    #[serde(default)]
    pub linked_request_id: Option<RequestId>,
}

impl Request {
    pub fn new(
        kind: RequestKind,
        status: RequestStatus,
        created_by: Actor,
        payload: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RequestId::generate(),
            kind,
            status,
            version: 1,
            created_by,
            created_at: now,
            updated_at: now,
            payload,
            documents: Vec::new(),
            linked_request_id: None,
        }
    }

    /// Moves the record to `next`, bumping its version. Callers authorize first.
    pub fn advance(&mut self, next: RequestStatus) -> Result<(), DomainError> {
        if !self.kind.admits(next) {
            return Err(DomainError::InvariantViolation(format!(
                "status `{next}` does not belong to `{}` requests",
                self.kind
            )));
        }
        self.status = next;
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn attach(&mut self, document: DocumentRef) {
        self.documents.push(document);
    }
}

/// One applied status change, kept as history alongside the record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub request_id: RequestId,
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub action: WorkflowAction,
    pub actor: Actor,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
