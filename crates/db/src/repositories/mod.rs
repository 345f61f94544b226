use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use backoffice_core::documents::DocumentRef;
use backoffice_core::domain::request::{
    Request, RequestId, RequestKind, RequestStatus, TransitionRecord,
};

pub mod memory;
pub mod request;

pub use memory::InMemoryRequestRepository;
pub use request::SqlRequestRepository;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("request `{0}` was not found")]
    NotFound(String),
    #[error("request `{request_id}` changed since version {expected}")]
    VersionConflict { request_id: String, expected: i64 },
    #[error("consent token is unknown, expired or already used")]
    ConsentTokenSpent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestFilter {
    pub kind: Option<RequestKind>,
    pub status: Option<RequestStatus>,
    /// Actor id of the requester.
    pub created_by: Option<String>,
    pub page: u32,
    pub page_size: u32,
}

impl Default for RequestFilter {
    fn default() -> Self {
        Self { kind: None, status: None, created_by: None, page: 1, page_size: DEFAULT_PAGE_SIZE }
    }
}

impl RequestFilter {
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RequestPage {
    pub rows: Vec<Request>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Everything one applied transition writes, committed together.
#[derive(Clone, Debug)]
pub struct TransitionWrite {
    /// The record after `advance`, carrying the new status and version.
    pub request: Request,
    pub expected_version: i64,
    pub record: TransitionRecord,
    pub document: Option<DocumentRef>,
    /// A request opened as a side effect, such as the equipment purchase
    /// created when a private purchase is forwarded to ACP.
    pub spawned: Option<Request>,
    /// Hash of the consent token this transition redeems. It is consumed in
    /// the same write, so a failed transition leaves the link usable.
    pub consent_token_hash: Option<String>,
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn insert(&self, request: Request) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError>;

    async fn list(&self, filter: RequestFilter) -> Result<RequestPage, RepositoryError>;

    /// Fails with `VersionConflict` unless the stored version equals
    /// `write.expected_version`; nothing is written in that case.
    async fn apply_transition(&self, write: TransitionWrite) -> Result<(), RepositoryError>;

    async fn list_transitions(
        &self,
        id: &RequestId,
    ) -> Result<Vec<TransitionRecord>, RepositoryError>;

    async fn find_document(
        &self,
        document_id: &str,
    ) -> Result<Option<(RequestId, DocumentRef)>, RepositoryError>;

    async fn save_consent_token(
        &self,
        token_hash: &str,
        request_id: &RequestId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Looks up an unexpired, unused token without consuming it.
    async fn resolve_consent_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RequestId>, RepositoryError>;
}

/// Fixed-width UTC timestamps so stored values sort lexicographically.
pub(crate) fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {error}")))
}
