//! Request lifecycle operations. Every mutation is authorized against the
//! transition table before anything is written.

use std::sync::Arc;

use backoffice_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use backoffice_core::documents::{sha256_hex, DocumentFolder, DocumentRef, DocumentUpload};
use backoffice_core::domain::payload::{
    self, ClientRequestPayload, EquipmentPurchasePayload, PermitPayload, PermitType,
    PrivatePurchasePayload,
};
use backoffice_core::domain::request::{
    Request, RequestId, RequestKind, RequestStatus, TransitionRecord,
};
use backoffice_core::domain::role::{Actor, Role};
use backoffice_core::errors::{ApplicationError, DomainError};
use backoffice_core::workflow::{
    permits, table, AvailableAction, InitialHints, PermitAssessment, PriorPersonalPermit,
    TransitionOutcome, TransitionTable, WorkflowAction, WorkflowError,
};
use backoffice_db::repositories::MAX_PAGE_SIZE;
use backoffice_db::{
    DocumentStore, RepositoryError, RequestFilter, RequestPage, RequestRepository, StorageError,
    TransitionWrite,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

/// Actor recorded on transitions applied through a consent link.
const CONSENT_LINK_ACTOR_ID: &str = "consent-link";

pub struct WorkflowService {
    repository: Arc<dyn RequestRepository>,
    documents: Arc<dyn DocumentStore>,
    audit: Arc<dyn AuditSink>,
    table: TransitionTable,
    max_upload_bytes: usize,
    consent_token_ttl: Duration,
}

#[derive(Clone, Debug)]
pub struct CreateCommand {
    pub kind: RequestKind,
    pub payload: Value,
    pub document: Option<DocumentUpload>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Created {
    pub request: Request,
    /// Only returned once; the store keeps a hash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permit_assessment: Option<PermitAssessment>,
}

#[derive(Clone, Debug)]
pub struct TransitionCommand {
    pub action: WorkflowAction,
    pub expected_version: Option<i64>,
    pub note: Option<String>,
    pub document: Option<DocumentUpload>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Transitioned {
    pub request: Request,
    pub transition: TransitionRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawned: Option<Request>,
}

#[derive(Clone, Debug, Default)]
pub struct ListQuery {
    pub kind: Option<RequestKind>,
    pub status: Option<RequestStatus>,
    pub mine: bool,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActionsView {
    pub request_id: RequestId,
    pub status: RequestStatus,
    pub version: i64,
    pub terminal: bool,
    pub actions: Vec<AvailableAction>,
}

#[derive(Clone, Debug)]
pub struct DocumentContent {
    pub document: DocumentRef,
    pub bytes: Vec<u8>,
}

impl WorkflowService {
    pub fn new(
        repository: Arc<dyn RequestRepository>,
        documents: Arc<dyn DocumentStore>,
        audit: Arc<dyn AuditSink>,
        max_upload_bytes: usize,
        consent_token_ttl_hours: u32,
    ) -> Self {
        Self {
            repository,
            documents,
            audit,
            table: TransitionTable::default(),
            max_upload_bytes,
            consent_token_ttl: Duration::hours(i64::from(consent_token_ttl_hours)),
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub async fn create(
        &self,
        actor: &Actor,
        command: CreateCommand,
        correlation_id: &str,
    ) -> Result<Created, ApplicationError> {
        let kind = command.kind;
        if !table::creators(kind).admits(actor.role) {
            self.emit_rejected(None, correlation_id, actor, "request.create_rejected", kind);
            return Err(ApplicationError::Forbidden(format!(
                "role `{}` may not open `{kind}` requests",
                actor.role
            )));
        }
        if !command.payload.is_object() {
            return Err(DomainError::Validation("payload must be a JSON object".to_string()).into());
        }

        let mut hints = InitialHints::default();
        let mut permit_assessment = None;
        match kind {
            RequestKind::PrivatePurchase => {
                payload::view::<PrivatePurchasePayload>(&command.payload)?;
            }
            RequestKind::EquipmentPurchase => {
                let view = payload::view::<EquipmentPurchasePayload>(&command.payload)?;
                view.validate()?;
                hints.provider_assigned = view.has_provider();
            }
            RequestKind::ClientRequest => {
                let view = payload::view::<ClientRequestPayload>(&command.payload)?;
                view.validate()?;
                hints.consent_captured = view.consent_captured;
            }
            RequestKind::Permit => {
                let view = payload::view::<PermitPayload>(&command.payload)?;
                let prior = self.prior_personal_permits(actor).await?;
                permit_assessment = Some(permits::assess(&view, &prior)?);
            }
        }

        let status = self.table.initial_status(kind, hints);
        let mut request = Request::new(kind, status, actor.clone(), command.payload);

        if let Some(upload) = command.document {
            let folder = DocumentFolder::for_request(&request, None).path();
            let document = self.store_document(&upload, folder, actor).await?;
            request.attach(document);
        }

        self.repository.insert(request.clone()).await.map_err(repository_error)?;

        let consent_token = if kind == RequestKind::ClientRequest
            && status == RequestStatus::PendingConsent
        {
            Some(self.issue_consent_token(&request.id).await?)
        } else {
            None
        };

        self.audit.emit(
            AuditEvent::new(
                Some(request.id.clone()),
                correlation_id,
                "request.created",
                AuditCategory::Ingress,
                actor.email.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("kind", kind.as_str())
            .with_metadata("status", status.as_str()),
        );
        info!(
            event_name = "request.created",
            correlation_id = %correlation_id,
            request_id = %request.id,
            actor_role = %actor.role,
            kind = %kind,
            status = %status,
            "request created"
        );

        Ok(Created { request, consent_token, permit_assessment })
    }

    pub async fn get(&self, actor: &Actor, id: &RequestId) -> Result<Request, ApplicationError> {
        let request = self.load(id).await?;
        ensure_visible(actor, &request)?;
        Ok(request)
    }

    /// Reviewers of a kind see every request of it; everyone else sees only
    /// their own.
    pub async fn list(&self, actor: &Actor, query: ListQuery) -> Result<RequestPage, ApplicationError> {
        let may_review = match query.kind {
            Some(kind) => table::reviewers(kind).admits(actor.role),
            None => actor.role.is_super(),
        };
        let created_by = (query.mine || !may_review).then(|| actor.id.clone());

        let defaults = RequestFilter::default();
        let filter = RequestFilter {
            kind: query.kind,
            status: query.status,
            created_by,
            page: query.page.unwrap_or(defaults.page),
            page_size: query.page_size.unwrap_or(defaults.page_size),
        }
        .normalized();

        self.repository.list(filter).await.map_err(repository_error)
    }

    /// Applies a workflow action on behalf of an authenticated actor.
    /// `grant_consent` is only reachable through [`WorkflowService::grant_consent`].
    pub async fn transition(
        &self,
        actor: &Actor,
        id: &RequestId,
        command: TransitionCommand,
        correlation_id: &str,
    ) -> Result<Transitioned, ApplicationError> {
        if command.action == WorkflowAction::GrantConsent {
            let request = self.load(id).await?;
            let reason = "consent is granted only through the client's consent link";
            let audit =
                AuditContext::new(Some(request.id.clone()), correlation_id, actor.email.clone());
            self.table.record_rejected(
                request.kind,
                actor.role,
                command.action,
                reason,
                self.audit.as_ref(),
                &audit,
            );
            return Err(ApplicationError::Forbidden(reason.to_string()));
        }
        self.apply(actor, id, command, None, correlation_id).await
    }

    /// Applies `grant_consent` on behalf of the client holding `token`. The
    /// token is spent by the same write that moves the request.
    pub async fn grant_consent(
        &self,
        token: &str,
        correlation_id: &str,
    ) -> Result<Transitioned, ApplicationError> {
        let hash = sha256_hex(token.trim().as_bytes());
        let request_id = self
            .repository
            .resolve_consent_token(&hash, Utc::now())
            .await
            .map_err(repository_error)?
            .ok_or_else(|| {
                ApplicationError::NotFound("consent link is invalid or has expired".to_string())
            })?;

        let request = self.load(&request_id).await?;
        let client_email = payload::view::<ClientRequestPayload>(&request.payload)
            .ok()
            .and_then(|view| view.client_email)
            .unwrap_or_default();
        let client = Actor::new(CONSENT_LINK_ACTOR_ID, client_email, Role::Client);

        self.apply(
            &client,
            &request_id,
            TransitionCommand {
                action: WorkflowAction::GrantConsent,
                expected_version: Some(request.version),
                note: None,
                document: None,
            },
            Some(hash),
            correlation_id,
        )
        .await
    }

    async fn apply(
        &self,
        actor: &Actor,
        id: &RequestId,
        command: TransitionCommand,
        consent_token_hash: Option<String>,
        correlation_id: &str,
    ) -> Result<Transitioned, ApplicationError> {
        let request = self.load(id).await?;
        let audit = AuditContext::new(Some(request.id.clone()), correlation_id, actor.email.clone());
        let (kind, action) = (request.kind, command.action);
        let outcome = self.table.authorize_with_audit(
            kind,
            request.status,
            actor.role,
            action,
            self.audit.as_ref(),
            &audit,
        )?;

        match self.persist(actor, request, command, &outcome, consent_token_hash).await {
            Ok(transitioned) => {
                self.table.record_applied(&outcome, self.audit.as_ref(), &audit);
                info!(
                    event_name = "workflow.transition.persisted",
                    correlation_id = %correlation_id,
                    request_id = %transitioned.request.id,
                    actor_role = %actor.role,
                    action = %action,
                    from = %outcome.from,
                    to = %outcome.to,
                    version = transitioned.request.version,
                    "request transition persisted"
                );
                Ok(transitioned)
            }
            Err(error) => {
                self.table.record_rejected(
                    kind,
                    actor.role,
                    action,
                    &error.to_string(),
                    self.audit.as_ref(),
                    &audit,
                );
                Err(error)
            }
        }
    }

    /// Checks that depend on the request and the caller, then the
    /// version-checked write.
    async fn persist(
        &self,
        actor: &Actor,
        mut request: Request,
        command: TransitionCommand,
        outcome: &TransitionOutcome,
        consent_token_hash: Option<String>,
    ) -> Result<Transitioned, ApplicationError> {
        if let Some(expected) = command.expected_version {
            if expected != request.version {
                return Err(ApplicationError::Conflict(format!(
                    "request `{}` is at version {}, not {expected}",
                    request.id, request.version
                )));
            }
        }
        if command.action == WorkflowAction::SubmitJustification
            && !actor.role.is_super()
            && !request.created_by.same_person(actor)
        {
            return Err(ApplicationError::Forbidden(
                "only the requester may submit the justification".to_string(),
            ));
        }
        if outcome.requires_document && command.document.is_none() {
            return Err(WorkflowError::MissingDocument { action: command.action }.into());
        }

        let spawned = if command.action == WorkflowAction::ForwardToAcp {
            let spawned = spawn_equipment_purchase(&request, actor)?;
            request.linked_request_id = Some(spawned.id.clone());
            Some(spawned)
        } else {
            None
        };

        let document = match &command.document {
            Some(upload) => {
                let folder = DocumentFolder::for_request(&request, Some(command.action)).path();
                Some(self.store_document(upload, folder, actor).await?)
            }
            None => None,
        };

        let expected_version = request.version;
        request.advance(outcome.to)?;
        if let Some(document) = &document {
            request.attach(document.clone());
        }

        let record = TransitionRecord {
            request_id: request.id.clone(),
            from: outcome.from,
            to: outcome.to,
            action: command.action,
            actor: actor.clone(),
            note: command.note.filter(|note| !note.trim().is_empty()),
            occurred_at: request.updated_at,
        };

        self.repository
            .apply_transition(TransitionWrite {
                request: request.clone(),
                expected_version,
                record: record.clone(),
                document,
                spawned: spawned.clone(),
                consent_token_hash,
            })
            .await
            .map_err(repository_error)?;

        Ok(Transitioned { request, transition: record, spawned })
    }

    pub async fn available_actions(
        &self,
        actor: &Actor,
        id: &RequestId,
    ) -> Result<ActionsView, ApplicationError> {
        let request = self.get(actor, id).await?;
        Ok(ActionsView {
            terminal: self.table.is_terminal(request.kind, request.status),
            actions: self
                .table
                .available_actions(request.kind, request.status, actor.role)
                .into_iter()
                .filter(|available| available.action != WorkflowAction::GrantConsent)
                .collect(),
            request_id: request.id,
            status: request.status,
            version: request.version,
        })
    }

    pub async fn history(
        &self,
        actor: &Actor,
        id: &RequestId,
    ) -> Result<Vec<TransitionRecord>, ApplicationError> {
        self.get(actor, id).await?;
        self.repository.list_transitions(id).await.map_err(repository_error)
    }

    pub async fn document(
        &self,
        actor: &Actor,
        document_id: &str,
    ) -> Result<DocumentContent, ApplicationError> {
        let (request_id, document) = self
            .repository
            .find_document(document_id)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| ApplicationError::NotFound(format!("document `{document_id}`")))?;
        self.get(actor, &request_id).await?;

        let bytes = self.documents.get(&document.location()).await.map_err(storage_error)?;
        Ok(DocumentContent { document, bytes })
    }

    async fn load(&self, id: &RequestId) -> Result<Request, ApplicationError> {
        self.repository
            .find_by_id(id)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| ApplicationError::NotFound(format!("request `{id}`")))
    }

    async fn store_document(
        &self,
        upload: &DocumentUpload,
        folder_path: String,
        actor: &Actor,
    ) -> Result<DocumentRef, ApplicationError> {
        let decoded = upload.decode(self.max_upload_bytes).map_err(DomainError::from)?;
        let document = DocumentRef::new(&decoded, folder_path, actor.email.clone());
        self.documents
            .put(&document.folder_path, &document.stored_name(), &decoded.bytes)
            .await
            .map_err(storage_error)?;
        Ok(document)
    }

    async fn issue_consent_token(&self, request_id: &RequestId) -> Result<String, ApplicationError> {
        let token = Uuid::new_v4().simple().to_string();
        let expires_at = Utc::now() + self.consent_token_ttl;
        self.repository
            .save_consent_token(&sha256_hex(token.as_bytes()), request_id, expires_at)
            .await
            .map_err(repository_error)?;
        Ok(token)
    }

    /// Personal permits the actor already holds and that were not rejected.
    async fn prior_personal_permits(
        &self,
        actor: &Actor,
    ) -> Result<Vec<PriorPersonalPermit>, ApplicationError> {
        let mut prior = Vec::new();
        let mut page = 1;
        loop {
            let result = self
                .repository
                .list(RequestFilter {
                    kind: Some(RequestKind::Permit),
                    status: None,
                    created_by: Some(actor.id.clone()),
                    page,
                    page_size: MAX_PAGE_SIZE,
                })
                .await
                .map_err(repository_error)?;

            let fetched = result.rows.len();
            prior.extend(
                result
                    .rows
                    .iter()
                    .filter(|request| request.status != RequestStatus::Rejected)
                    .filter_map(|request| payload::view::<PermitPayload>(&request.payload).ok())
                    .filter(|view| view.permit_type == Some(PermitType::Personal))
                    .filter_map(|view| {
                        Some(PriorPersonalPermit {
                            start_date: view.start_date?,
                            duration_hours: view.duration_hours.unwrap_or_default(),
                        })
                    }),
            );

            let seen = u64::from(page) * u64::from(MAX_PAGE_SIZE);
            if fetched == 0 || seen >= result.total {
                break;
            }
            page += 1;
        }
        Ok(prior)
    }

    fn emit_rejected(
        &self,
        request_id: Option<RequestId>,
        correlation_id: &str,
        actor: &Actor,
        event_type: &str,
        kind: RequestKind,
    ) {
        self.audit.emit(
            AuditEvent::new(
                request_id,
                correlation_id,
                event_type,
                AuditCategory::Ingress,
                actor.email.clone(),
                AuditOutcome::Rejected,
            )
            .with_metadata("kind", kind.as_str())
            .with_metadata("role", actor.role.as_str()),
        );
    }
}

/// Visible to reviewers of the kind and to the requester.
fn ensure_visible(actor: &Actor, request: &Request) -> Result<(), ApplicationError> {
    if table::reviewers(request.kind).admits(actor.role) || request.created_by.same_person(actor) {
        return Ok(());
    }
    Err(ApplicationError::Forbidden(format!(
        "role `{}` may not view request `{}`",
        actor.role, request.id
    )))
}

/// Opens the ACP equipment purchase that continues a registered private sale.
fn spawn_equipment_purchase(source: &Request, actor: &Actor) -> Result<Request, ApplicationError> {
    let view = payload::view::<PrivatePurchasePayload>(&source.payload)?;
    let Some(client_name) = view.client_name().map(str::to_owned) else {
        return Err(DomainError::Validation(
            "client commercial name is required before forwarding to ACP".to_string(),
        )
        .into());
    };

    let mut spawned = Request::new(
        RequestKind::EquipmentPurchase,
        RequestStatus::PendingProviderAssignment,
        actor.clone(),
        json!({
            "client_name": client_name,
            "client_email": view.client_snapshot.client_email,
            "equipment": view.equipment,
            "notes": view.notes,
            "source_request_id": source.id.0,
        }),
    );
    spawned.linked_request_id = Some(source.id.clone());
    Ok(spawned)
}

fn repository_error(error: RepositoryError) -> ApplicationError {
    match error {
        RepositoryError::NotFound(id) => ApplicationError::NotFound(format!("request `{id}`")),
        RepositoryError::VersionConflict { .. } => ApplicationError::Conflict(error.to_string()),
        RepositoryError::ConsentTokenSpent => {
            ApplicationError::NotFound("consent link is invalid or has expired".to_string())
        }
        RepositoryError::Decode(_) | RepositoryError::Database(_) => {
            ApplicationError::Persistence(error.to_string())
        }
    }
}

fn storage_error(error: StorageError) -> ApplicationError {
    match error {
        StorageError::NotFound(location) => {
            ApplicationError::NotFound(format!("stored document `{location}`"))
        }
        other => ApplicationError::Storage(other.to_string()),
    }
}
