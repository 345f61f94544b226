use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::request::{RequestKind, RequestStatus};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    SendOffer,
    RequestManagerSignature,
    RequestClientSignature,
    ApproveAndSign,
    RegisterClient,
    ForwardToAcp,
    RequestAvailability,
    RecordNoStock,
    RecordStockAvailable,
    UploadProforma,
    ReserveEquipment,
    UploadSignedProforma,
    UploadContract,
    GrantConsent,
    Approve,
    PartialApprove,
    SubmitJustification,
    FinalApprove,
    Reject,
}

impl WorkflowAction {
    pub const ALL: [WorkflowAction; 19] = [
        WorkflowAction::SendOffer,
        WorkflowAction::RequestManagerSignature,
        WorkflowAction::RequestClientSignature,
        WorkflowAction::ApproveAndSign,
        WorkflowAction::RegisterClient,
        WorkflowAction::ForwardToAcp,
        WorkflowAction::RequestAvailability,
        WorkflowAction::RecordNoStock,
        WorkflowAction::RecordStockAvailable,
        WorkflowAction::UploadProforma,
        WorkflowAction::ReserveEquipment,
        WorkflowAction::UploadSignedProforma,
        WorkflowAction::UploadContract,
        WorkflowAction::GrantConsent,
        WorkflowAction::Approve,
        WorkflowAction::PartialApprove,
        WorkflowAction::SubmitJustification,
        WorkflowAction::FinalApprove,
        WorkflowAction::Reject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowAction::SendOffer => "send_offer",
            WorkflowAction::RequestManagerSignature => "request_manager_signature",
            WorkflowAction::RequestClientSignature => "request_client_signature",
            WorkflowAction::ApproveAndSign => "approve_and_sign",
            WorkflowAction::RegisterClient => "register_client",
            WorkflowAction::ForwardToAcp => "forward_to_acp",
            WorkflowAction::RequestAvailability => "request_availability",
            WorkflowAction::RecordNoStock => "record_no_stock",
            WorkflowAction::RecordStockAvailable => "record_stock_available",
            WorkflowAction::UploadProforma => "upload_proforma",
            WorkflowAction::ReserveEquipment => "reserve_equipment",
            WorkflowAction::UploadSignedProforma => "upload_signed_proforma",
            WorkflowAction::UploadContract => "upload_contract",
            WorkflowAction::GrantConsent => "grant_consent",
            WorkflowAction::Approve => "approve",
            WorkflowAction::PartialApprove => "partial_approve",
            WorkflowAction::SubmitJustification => "submit_justification",
            WorkflowAction::FinalApprove => "final_approve",
            WorkflowAction::Reject => "reject",
        }
    }

    /// Human label shown next to the action in list views.
    pub fn label(&self) -> &'static str {
        match self {
            WorkflowAction::SendOffer => "Send offer",
            WorkflowAction::RequestManagerSignature => "Request manager signature",
            WorkflowAction::RequestClientSignature => "Request client signature",
            WorkflowAction::ApproveAndSign => "Approve and sign",
            WorkflowAction::RegisterClient => "Register client",
            WorkflowAction::ForwardToAcp => "Forward to ACP",
            WorkflowAction::RequestAvailability => "Request provider availability",
            WorkflowAction::RecordNoStock => "Record provider response: no stock",
            WorkflowAction::RecordStockAvailable => "Record provider response: available",
            WorkflowAction::UploadProforma => "Upload proforma",
            WorkflowAction::ReserveEquipment => "Reserve equipment",
            WorkflowAction::UploadSignedProforma => "Upload signed proforma",
            WorkflowAction::UploadContract => "Upload contract",
            WorkflowAction::GrantConsent => "Grant data-processing consent",
            WorkflowAction::Approve => "Approve",
            WorkflowAction::PartialApprove => "Approve (supervisor)",
            WorkflowAction::SubmitJustification => "Submit justification",
            WorkflowAction::FinalApprove => "Approve (final)",
            WorkflowAction::Reject => "Reject",
        }
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowAction {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = value.trim().to_ascii_lowercase().replace('-', "_");
        WorkflowAction::ALL
            .into_iter()
            .find(|action| action.as_str() == key)
            .ok_or_else(|| DomainError::Validation(format!("unknown workflow action `{value}`")))
    }
}

/// Facts known at creation time that pick the first status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InitialHints {
    pub provider_assigned: bool,
    pub consent_captured: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub kind: RequestKind,
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub action: WorkflowAction,
    pub requires_document: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableAction {
    pub action: WorkflowAction,
    pub label: String,
    pub to: RequestStatus,
    pub requires_document: bool,
}
