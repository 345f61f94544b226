use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::request::{RequestKind, RequestStatus};
use crate::domain::role::Role;
use crate::workflow::states::{AvailableAction, InitialHints, TransitionOutcome, WorkflowAction};
use crate::workflow::table::{self, TransitionRule, STANDARD_RULES};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("status `{status}` is not valid for `{kind}` requests")]
    UnknownStatus { kind: RequestKind, status: RequestStatus },
    #[error("`{action}` is not allowed on a `{kind}` request in status `{status}`")]
    InvalidTransition { kind: RequestKind, status: RequestStatus, action: WorkflowAction },
    #[error("role `{role}` may not `{action}` from `{status}` (allowed: {allowed})")]
    Forbidden { role: Role, action: WorkflowAction, status: RequestStatus, allowed: String },
    #[error("`{action}` requires an attached document")]
    MissingDocument { action: WorkflowAction },
}

/// The single authority on which status changes each role may perform.
#[derive(Clone, Copy, Debug)]
pub struct TransitionTable {
    rules: &'static [TransitionRule],
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self { rules: STANDARD_RULES }
    }
}

impl TransitionTable {
    pub fn new(rules: &'static [TransitionRule]) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &'static [TransitionRule] {
        self.rules
    }

    pub fn initial_status(&self, kind: RequestKind, hints: InitialHints) -> RequestStatus {
        table::initial_status(kind, hints)
    }

    pub fn is_terminal(&self, kind: RequestKind, status: RequestStatus) -> bool {
        self.outgoing(kind, status).next().is_none()
    }

    pub fn authorize(
        &self,
        kind: RequestKind,
        current: RequestStatus,
        role: Role,
        action: WorkflowAction,
    ) -> Result<TransitionOutcome, WorkflowError> {
        if !kind.admits(current) {
            return Err(WorkflowError::UnknownStatus { kind, status: current });
        }

        let Some(rule) = self.outgoing(kind, current).find(|rule| rule.action == action) else {
            return Err(WorkflowError::InvalidTransition { kind, status: current, action });
        };

        if !rule.actors.admits(role) {
            return Err(WorkflowError::Forbidden {
                role,
                action,
                status: current,
                allowed: rule.actors.describe(),
            });
        }

        Ok(TransitionOutcome {
            kind,
            from: current,
            to: rule.to,
            action,
            requires_document: rule.requires_document,
        })
    }

    pub fn available_actions(
        &self,
        kind: RequestKind,
        current: RequestStatus,
        role: Role,
    ) -> Vec<AvailableAction> {
        self.outgoing(kind, current)
            .filter(|rule| rule.actors.admits(role))
            .map(|rule| AvailableAction {
                action: rule.action,
                label: rule.action.label().to_string(),
                to: rule.to,
                requires_document: rule.requires_document,
            })
            .collect()
    }

    /// Authorizes and records a `workflow.transition_rejected` event on
    /// refusal. Success is not audited here: the caller records
    /// [`TransitionTable::record_applied`] once the change is persisted.
    pub fn authorize_with_audit<S>(
        &self,
        kind: RequestKind,
        current: RequestStatus,
        role: Role,
        action: WorkflowAction,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, WorkflowError>
    where
        S: AuditSink + ?Sized,
    {
        self.authorize(kind, current, role, action).map_err(|error| {
            self.record_rejected(kind, role, action, &error.to_string(), sink, audit);
            error
        })
    }

    pub fn record_applied<S>(&self, outcome: &TransitionOutcome, sink: &S, audit: &AuditContext)
    where
        S: AuditSink + ?Sized,
    {
        sink.emit(
            AuditEvent::new(
                audit.request_id.clone(),
                audit.correlation_id.clone(),
                "workflow.transition_applied",
                AuditCategory::Workflow,
                audit.actor.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("kind", outcome.kind.as_str())
            .with_metadata("from", outcome.from.as_str())
            .with_metadata("to", outcome.to.as_str())
            .with_metadata("action", outcome.action.as_str()),
        );
    }

    pub fn record_rejected<S>(
        &self,
        kind: RequestKind,
        role: Role,
        action: WorkflowAction,
        reason: &str,
        sink: &S,
        audit: &AuditContext,
    ) where
        S: AuditSink + ?Sized,
    {
        sink.emit(
            AuditEvent::new(
                audit.request_id.clone(),
                audit.correlation_id.clone(),
                "workflow.transition_rejected",
                AuditCategory::Workflow,
                audit.actor.clone(),
                AuditOutcome::Rejected,
            )
            .with_metadata("kind", kind.as_str())
            .with_metadata("role", role.as_str())
            .with_metadata("action", action.as_str())
            .with_metadata("error", reason),
        );
    }

    fn outgoing(
        &self,
        kind: RequestKind,
        status: RequestStatus,
    ) -> impl Iterator<Item = &'static TransitionRule> {
        let rules: &'static [TransitionRule] = self.rules;
        rules.iter().filter(move |rule| rule.kind == kind && rule.from.contains(&status))
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::request::{RequestId, RequestKind, RequestStatus};
    use crate::domain::role::Role;
    use crate::workflow::engine::{TransitionTable, WorkflowError};
    use crate::workflow::states::{InitialHints, WorkflowAction};

    fn terminal_statuses(kind: RequestKind) -> &'static [RequestStatus] {
        match kind {
            RequestKind::PrivatePurchase => &[RequestStatus::SentToAcp],
            RequestKind::EquipmentPurchase => &[RequestStatus::Completed, RequestStatus::NoStock],
            RequestKind::ClientRequest => &[RequestStatus::Approved, RequestStatus::Rejected],
            RequestKind::Permit => &[RequestStatus::Approved, RequestStatus::Rejected],
        }
    }

    #[test]
    fn private_purchase_rejection_is_recoverable() {
        let table = TransitionTable::default();
        let kind = RequestKind::PrivatePurchase;
        let mut status = table.initial_status(kind, InitialHints::default());
        assert_eq!(status, RequestStatus::PendingCommercial);

        status = table
            .authorize(kind, status, Role::BackofficeComercial, WorkflowAction::SendOffer)
            .expect("backoffice sends offer")
            .to;
        assert_eq!(status, RequestStatus::OfferSent);

        status = table
            .authorize(kind, status, Role::JefeComercial, WorkflowAction::Reject)
            .expect("manager rejects")
            .to;
        assert_eq!(status, RequestStatus::Rejected);

        let resent = table
            .authorize(kind, status, Role::BackofficeComercial, WorkflowAction::SendOffer)
            .expect("offer can be re-sent after rejection");
        assert_eq!(resent.to, RequestStatus::OfferSent);
        assert!(resent.requires_document);
    }

    #[test]
    fn private_purchase_runs_to_acp() {
        let table = TransitionTable::default();
        let kind = RequestKind::PrivatePurchase;
        let steps = [
            (Role::BackofficeComercial, WorkflowAction::SendOffer, RequestStatus::OfferSent),
            (
                Role::Comercial,
                WorkflowAction::RequestManagerSignature,
                RequestStatus::PendingManagerSignature,
            ),
            (Role::Gerencia, WorkflowAction::ApproveAndSign, RequestStatus::OfferSigned),
            (Role::Comercial, WorkflowAction::RegisterClient, RequestStatus::ClientRegistered),
            (Role::BackofficeComercial, WorkflowAction::ForwardToAcp, RequestStatus::SentToAcp),
        ];

        let mut status = RequestStatus::PendingCommercial;
        for (role, action, expected) in steps {
            status = table.authorize(kind, status, role, action).expect("listed step").to;
            assert_eq!(status, expected);
        }
        assert!(table.is_terminal(kind, status));
    }

    #[test]
    fn equipment_purchase_no_stock_is_a_dead_end() {
        let table = TransitionTable::default();
        let kind = RequestKind::EquipmentPurchase;
        let start =
            table.initial_status(kind, InitialHints { provider_assigned: true, ..Default::default() });
        assert_eq!(start, RequestStatus::WaitingProviderResponse);

        let outcome = table
            .authorize(kind, start, Role::AcpComercial, WorkflowAction::RecordNoStock)
            .expect("provider answered without stock");
        assert_eq!(outcome.to, RequestStatus::NoStock);

        for role in Role::ALL {
            assert!(table.available_actions(kind, RequestStatus::NoStock, role).is_empty());
        }
        assert!(table.is_terminal(kind, RequestStatus::NoStock));
    }

    #[test]
    fn wrong_role_is_forbidden_and_unknown_action_is_invalid() {
        let table = TransitionTable::default();

        let error = table
            .authorize(
                RequestKind::PrivatePurchase,
                RequestStatus::PendingCommercial,
                Role::Comercial,
                WorkflowAction::SendOffer,
            )
            .expect_err("only backoffice sends offers");
        assert!(matches!(error, WorkflowError::Forbidden { role: Role::Comercial, .. }));

        let error = table
            .authorize(
                RequestKind::PrivatePurchase,
                RequestStatus::PendingCommercial,
                Role::BackofficeComercial,
                WorkflowAction::ForwardToAcp,
            )
            .expect_err("cannot forward before registration");
        assert!(matches!(error, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn status_from_another_kind_is_unknown() {
        let error = TransitionTable::default()
            .authorize(
                RequestKind::Permit,
                RequestStatus::OfferSent,
                Role::Admin,
                WorkflowAction::Reject,
            )
            .expect_err("offer_sent is not a permit status");
        assert!(matches!(error, WorkflowError::UnknownStatus { .. }));
    }

    #[test]
    fn every_unlisted_combination_fails() {
        let table = TransitionTable::default();
        for kind in RequestKind::ALL {
            for &status in kind.statuses() {
                for role in Role::ALL {
                    for action in WorkflowAction::ALL {
                        let listed = table.rules().iter().any(|rule| {
                            rule.kind == kind
                                && rule.from.contains(&status)
                                && rule.action == action
                                && rule.actors.admits(role)
                        });
                        let result = table.authorize(kind, status, role, action);
                        match result {
                            Ok(_) => assert!(listed, "{kind}/{status}/{role}/{action} leaked"),
                            Err(WorkflowError::InvalidTransition { .. })
                            | Err(WorkflowError::Forbidden { .. }) => assert!(!listed),
                            Err(other) => panic!("unexpected error {other}"),
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_transition() {
        let table = TransitionTable::default();
        for kind in RequestKind::ALL {
            for &status in terminal_statuses(kind) {
                assert!(table.is_terminal(kind, status), "{kind}/{status} should be terminal");
                for role in Role::ALL {
                    for action in WorkflowAction::ALL {
                        assert!(table.authorize(kind, status, role, action).is_err());
                    }
                }
            }
        }
    }

    #[test]
    fn client_request_rejection_is_terminal() {
        let table = TransitionTable::default();
        assert!(table.is_terminal(RequestKind::ClientRequest, RequestStatus::Rejected));
        assert!(!table.is_terminal(RequestKind::PrivatePurchase, RequestStatus::Rejected));
    }

    #[test]
    fn permit_flow_requires_justification_document() {
        let table = TransitionTable::default();
        let kind = RequestKind::Permit;
        let partial = table
            .authorize(kind, RequestStatus::Pending, Role::JefeComercial, WorkflowAction::PartialApprove)
            .expect("supervisor approves");
        let submitted = table
            .authorize(kind, partial.to, Role::Employee, WorkflowAction::SubmitJustification)
            .expect("requester submits evidence");
        assert!(submitted.requires_document);
        let approved = table
            .authorize(kind, submitted.to, Role::TalentoHumano, WorkflowAction::FinalApprove)
            .expect("people office approves");
        assert_eq!(approved.to, RequestStatus::Approved);
    }

    #[test]
    fn available_actions_follow_role() {
        let table = TransitionTable::default();
        let actions: Vec<_> = table
            .available_actions(RequestKind::PrivatePurchase, RequestStatus::OfferSent, Role::Gerencia)
            .into_iter()
            .map(|available| available.action)
            .collect();
        assert_eq!(actions, vec![WorkflowAction::ApproveAndSign, WorkflowAction::Reject]);

        let admin_actions = table.available_actions(
            RequestKind::PrivatePurchase,
            RequestStatus::OfferSent,
            Role::Admin,
        );
        assert_eq!(admin_actions.len(), 4);
    }

    #[test]
    fn authorization_audits_refusals_and_leaves_success_to_the_caller() {
        let table = TransitionTable::default();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(Some(RequestId("req-1".to_string())), "corr-7", "ana@example.com");

        let outcome = table
            .authorize_with_audit(
                RequestKind::ClientRequest,
                RequestStatus::PendingApproval,
                Role::BackofficeComercial,
                WorkflowAction::Approve,
                &sink,
                &audit,
            )
            .expect("backoffice approves");
        assert!(sink.events().is_empty());

        let _ = table.authorize_with_audit(
            RequestKind::ClientRequest,
            RequestStatus::Approved,
            Role::BackofficeComercial,
            WorkflowAction::Reject,
            &sink,
            &audit,
        );
        table.record_applied(&outcome, &sink, &audit);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "workflow.transition_rejected");
        assert_eq!(events[0].correlation_id, "corr-7");
        assert_eq!(events[1].event_type, "workflow.transition_applied");
        assert_eq!(events[1].metadata.get("to").map(String::as_str), Some("approved"));
    }
}
