use crate::domain::request::{RequestKind, RequestStatus};
use crate::domain::role::{Role, RoleSet};
use crate::workflow::states::{InitialHints, WorkflowAction};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionRule {
    pub kind: RequestKind,
    pub from: &'static [RequestStatus],
    pub actors: RoleSet,
    pub action: WorkflowAction,
    pub to: RequestStatus,
    pub requires_document: bool,
}

const BACKOFFICE: RoleSet = RoleSet::Only(&[Role::BackofficeComercial]);
const COMMERCIAL_DESK: RoleSet = RoleSet::Only(&[Role::Comercial, Role::BackofficeComercial]);
const COMMERCIAL: RoleSet = RoleSet::Only(&[Role::Comercial]);
const COMMERCIAL_MANAGERS: RoleSet = RoleSet::Only(&[Role::JefeComercial, Role::Gerencia]);
const ACP: RoleSet = RoleSet::Only(&[Role::AcpComercial]);
const PURCHASING: RoleSet =
    RoleSet::Only(&[Role::AcpComercial, Role::JefeComercial, Role::Gerencia]);
const CONSENTING_CLIENT: RoleSet = RoleSet::Only(&[Role::Client]);
const LINE_MANAGERS: RoleSet =
    RoleSet::Only(&[Role::JefeComercial, Role::JefeServicioTecnico, Role::Gerencia]);
const PEOPLE_OFFICE: RoleSet = RoleSet::Only(&[Role::TalentoHumano, Role::Gerencia]);

const fn rule(
    kind: RequestKind,
    from: &'static [RequestStatus],
    actors: RoleSet,
    action: WorkflowAction,
    to: RequestStatus,
    requires_document: bool,
) -> TransitionRule {
    TransitionRule { kind, from, actors, action, to, requires_document }
}

use RequestKind::{ClientRequest, EquipmentPurchase, Permit, PrivatePurchase};
use RequestStatus::*;
use WorkflowAction as A;

const SIGNATURE_STAGE: &[RequestStatus] =
    &[PendingManagerSignature, PendingClientSignature, OfferSent];

pub static STANDARD_RULES: &[TransitionRule] = &[
    // private purchases
    rule(
        PrivatePurchase,
        &[PendingCommercial, PendingBackoffice, Rejected],
        BACKOFFICE,
        A::SendOffer,
        OfferSent,
        true,
    ),
    rule(
        PrivatePurchase,
        &[OfferSent],
        COMMERCIAL_DESK,
        A::RequestManagerSignature,
        PendingManagerSignature,
        false,
    ),
    rule(
        PrivatePurchase,
        &[OfferSent],
        COMMERCIAL_DESK,
        A::RequestClientSignature,
        PendingClientSignature,
        false,
    ),
    rule(PrivatePurchase, SIGNATURE_STAGE, COMMERCIAL_MANAGERS, A::ApproveAndSign, OfferSigned, true),
    rule(PrivatePurchase, SIGNATURE_STAGE, COMMERCIAL_MANAGERS, A::Reject, Rejected, false),
    rule(PrivatePurchase, &[OfferSigned], COMMERCIAL, A::RegisterClient, ClientRegistered, false),
    rule(PrivatePurchase, &[ClientRegistered], BACKOFFICE, A::ForwardToAcp, SentToAcp, false),
    // equipment purchases
    rule(
        EquipmentPurchase,
        &[PendingProviderAssignment],
        ACP,
        A::RequestAvailability,
        WaitingProviderResponse,
        false,
    ),
    rule(EquipmentPurchase, &[WaitingProviderResponse], PURCHASING, A::RecordNoStock, NoStock, false),
    rule(
        EquipmentPurchase,
        &[WaitingProviderResponse],
        PURCHASING,
        A::RecordStockAvailable,
        WaitingProforma,
        false,
    ),
    rule(EquipmentPurchase, &[WaitingProforma], PURCHASING, A::UploadProforma, ProformaReceived, true),
    rule(
        EquipmentPurchase,
        &[ProformaReceived],
        PURCHASING,
        A::ReserveEquipment,
        WaitingSignedProforma,
        false,
    ),
    rule(
        EquipmentPurchase,
        &[WaitingSignedProforma],
        PURCHASING,
        A::UploadSignedProforma,
        PendingContract,
        true,
    ),
    rule(EquipmentPurchase, &[PendingContract], PURCHASING, A::UploadContract, Completed, true),
    // client requests
    rule(ClientRequest, &[PendingConsent], CONSENTING_CLIENT, A::GrantConsent, PendingApproval, false),
    rule(ClientRequest, &[PendingApproval], BACKOFFICE, A::Approve, Approved, false),
    rule(ClientRequest, &[PendingConsent, PendingApproval], BACKOFFICE, A::Reject, Rejected, false),
    // permits
    rule(Permit, &[Pending], LINE_MANAGERS, A::PartialApprove, PartiallyApproved, false),
    rule(Permit, &[PartiallyApproved], RoleSet::Any, A::SubmitJustification, PendingFinal, true),
    rule(Permit, &[PendingFinal], PEOPLE_OFFICE, A::FinalApprove, Approved, false),
    rule(Permit, &[Pending], LINE_MANAGERS, A::Reject, Rejected, false),
    rule(Permit, &[PendingFinal], PEOPLE_OFFICE, A::Reject, Rejected, false),
];

pub fn initial_status(kind: RequestKind, hints: InitialHints) -> RequestStatus {
    match kind {
        PrivatePurchase => PendingCommercial,
        EquipmentPurchase if hints.provider_assigned => WaitingProviderResponse,
        EquipmentPurchase => PendingProviderAssignment,
        ClientRequest if hints.consent_captured => PendingApproval,
        ClientRequest => PendingConsent,
        Permit => Pending,
    }
}

/// Roles allowed to open a new request of `kind`.
pub fn creators(kind: RequestKind) -> RoleSet {
    match kind {
        PrivatePurchase => RoleSet::Only(&[
            Role::Comercial,
            Role::AcpComercial,
            Role::BackofficeComercial,
        ]),
        EquipmentPurchase => PURCHASING,
        ClientRequest => RoleSet::Only(&[Role::Comercial, Role::JefeComercial]),
        Permit => RoleSet::Only(&[
            Role::Comercial,
            Role::JefeComercial,
            Role::BackofficeComercial,
            Role::AcpComercial,
            Role::Gerencia,
            Role::TalentoHumano,
            Role::JefeServicioTecnico,
            Role::Tecnico,
            Role::Employee,
        ]),
    }
}

/// Roles that may browse every request of `kind`, not only their own.
pub fn reviewers(kind: RequestKind) -> RoleSet {
    match kind {
        PrivatePurchase => RoleSet::Only(&[
            Role::BackofficeComercial,
            Role::Gerencia,
            Role::JefeComercial,
        ]),
        EquipmentPurchase => PURCHASING,
        ClientRequest => RoleSet::Only(&[
            Role::BackofficeComercial,
            Role::Gerencia,
            Role::JefeComercial,
        ]),
        Permit => RoleSet::Only(&[
            Role::TalentoHumano,
            Role::Gerencia,
            Role::JefeComercial,
            Role::JefeServicioTecnico,
        ]),
    }
}
