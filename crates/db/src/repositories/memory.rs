use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use backoffice_core::documents::DocumentRef;
use backoffice_core::domain::request::{Request, RequestId, TransitionRecord};

use super::{RepositoryError, RequestFilter, RequestPage, RequestRepository, TransitionWrite};

struct ConsentTokenEntry {
    request_id: RequestId,
    expires_at: DateTime<Utc>,
    consumed: bool,
}

#[derive(Default)]
struct State {
    requests: HashMap<String, Request>,
    /// Insertion order, used to break ties between equal timestamps.
    order: Vec<String>,
    transitions: Vec<TransitionRecord>,
    consent_tokens: HashMap<String, ConsentTokenEntry>,
}

#[derive(Default)]
pub struct InMemoryRequestRepository {
    state: RwLock<State>,
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn insert(&self, request: Request) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if state.requests.contains_key(&request.id.0) {
            return Err(RepositoryError::Decode(format!("request `{}` already exists", request.id)));
        }
        state.order.push(request.id.0.clone());
        state.requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.requests.get(&id.0).cloned())
    }

    async fn list(&self, filter: RequestFilter) -> Result<RequestPage, RepositoryError> {
        let filter = filter.normalized();
        let state = self.state.read().await;

        let mut matching: Vec<(usize, &Request)> = state
            .order
            .iter()
            .enumerate()
            .filter_map(|(position, id)| state.requests.get(id).map(|request| (position, request)))
            .filter(|(_, request)| {
                filter.kind.map_or(true, |kind| request.kind == kind)
                    && filter.status.map_or(true, |status| request.status == status)
                    && filter
                        .created_by
                        .as_deref()
                        .map_or(true, |actor_id| request.created_by.id == actor_id)
            })
            .collect();
        matching.sort_by(|(left_pos, left), (right_pos, right)| {
            right.created_at.cmp(&left.created_at).then(right_pos.cmp(left_pos))
        });

        let total = matching.len() as u64;
        let offset = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
        let rows = matching
            .into_iter()
            .skip(offset)
            .take(filter.page_size as usize)
            .map(|(_, request)| request.clone())
            .collect();

        Ok(RequestPage { rows, total, page: filter.page, page_size: filter.page_size })
    }

    async fn apply_transition(&self, write: TransitionWrite) -> Result<(), RepositoryError> {
        let TransitionWrite {
            mut request,
            expected_version,
            record,
            document,
            spawned,
            consent_token_hash,
        } = write;
        let mut state = self.state.write().await;

        let Some(stored) = state.requests.get(&request.id.0) else {
            return Err(RepositoryError::NotFound(request.id.0.clone()));
        };
        if stored.version != expected_version {
            return Err(RepositoryError::VersionConflict {
                request_id: request.id.0.clone(),
                expected: expected_version,
            });
        }

        // Only the workflow-owned fields change; documents are append-only.
        let mut documents = stored.documents.clone();
        if let Some(document) = document {
            documents.push(document);
        }
        request.documents = documents;
        request.payload = stored.payload.clone();

        if let Some(token_hash) = consent_token_hash {
            match state.consent_tokens.get_mut(&token_hash) {
                Some(entry)
                    if !entry.consumed
                        && entry.request_id == request.id
                        && entry.expires_at > record.occurred_at =>
                {
                    entry.consumed = true;
                }
                _ => return Err(RepositoryError::ConsentTokenSpent),
            }
        }

        if let Some(spawned) = spawned {
            state.order.push(spawned.id.0.clone());
            state.requests.insert(spawned.id.0.clone(), spawned);
        }
        state.requests.insert(request.id.0.clone(), request);
        state.transitions.push(record);
        Ok(())
    }

    async fn list_transitions(
        &self,
        id: &RequestId,
    ) -> Result<Vec<TransitionRecord>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.transitions.iter().filter(|record| &record.request_id == id).cloned().collect())
    }

    async fn find_document(
        &self,
        document_id: &str,
    ) -> Result<Option<(RequestId, DocumentRef)>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.requests.values().find_map(|request| {
            request
                .documents
                .iter()
                .find(|document| document.id == document_id)
                .map(|document| (request.id.clone(), document.clone()))
        }))
    }

    async fn save_consent_token(
        &self,
        token_hash: &str,
        request_id: &RequestId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.consent_tokens.insert(
            token_hash.to_owned(),
            ConsentTokenEntry { request_id: request_id.clone(), expires_at, consumed: false },
        );
        Ok(())
    }

    async fn resolve_consent_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RequestId>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .consent_tokens
            .get(token_hash)
            .filter(|entry| !entry.consumed && entry.expires_at > now)
            .map(|entry| entry.request_id.clone()))
    }
}
