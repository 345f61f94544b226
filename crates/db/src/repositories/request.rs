use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use backoffice_core::documents::DocumentRef;
use backoffice_core::domain::request::{
    Request, RequestId, RequestKind, RequestStatus, TransitionRecord,
};
use backoffice_core::domain::role::{Actor, Role};
use backoffice_core::workflow::WorkflowAction;

use super::{
    parse_timestamp, timestamp, RepositoryError, RequestFilter, RequestPage, RequestRepository,
    TransitionWrite,
};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id, kind, status, version, created_by_id, created_by_email, \
     created_by_role, payload_json, linked_request_id, created_at, updated_at";

const DOCUMENT_COLUMNS: &str = "id, request_id, file_name, mime_type, folder_path, link, sha256, \
     size_bytes, uploaded_by, uploaded_at";

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_documents(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<DocumentRef>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM request_document
             WHERE request_id = ? ORDER BY uploaded_at ASC, rowid ASC"
        ))
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_document).collect()
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<Request, RepositoryError> {
        let mut request = row_to_request(row)?;
        request.documents = self.load_documents(&request.id).await?;
        Ok(request)
    }
}

fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|error| RepositoryError::Decode(error.to_string()))
}

fn row_to_request(row: &SqliteRow) -> Result<Request, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let kind: String = decode(row.try_get("kind"))?;
    let status: String = decode(row.try_get("status"))?;
    let version: i64 = decode(row.try_get("version"))?;
    let created_by_id: String = decode(row.try_get("created_by_id"))?;
    let created_by_email: String = decode(row.try_get("created_by_email"))?;
    let created_by_role: String = decode(row.try_get("created_by_role"))?;
    let payload_json: String = decode(row.try_get("payload_json"))?;
    let linked_request_id: Option<String> = decode(row.try_get("linked_request_id"))?;
    let created_at: String = decode(row.try_get("created_at"))?;
    let updated_at: String = decode(row.try_get("updated_at"))?;

    let kind = kind
        .parse::<RequestKind>()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let status = status
        .parse::<RequestStatus>()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let role =
        Role::parse(&created_by_role).map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let payload = serde_json::from_str(&payload_json)
        .map_err(|error| RepositoryError::Decode(format!("payload of `{id}`: {error}")))?;

    Ok(Request {
        id: RequestId(id),
        kind,
        status,
        version,
        created_by: Actor::new(created_by_id, created_by_email, role),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        payload,
        documents: Vec::new(),
        linked_request_id: linked_request_id.map(RequestId),
    })
}

fn row_to_document(row: &SqliteRow) -> Result<DocumentRef, RepositoryError> {
    let uploaded_at: String = decode(row.try_get("uploaded_at"))?;
    Ok(DocumentRef {
        id: decode(row.try_get("id"))?,
        file_name: decode(row.try_get("file_name"))?,
        mime_type: decode(row.try_get("mime_type"))?,
        folder_path: decode(row.try_get("folder_path"))?,
        link: decode(row.try_get("link"))?,
        sha256: decode(row.try_get("sha256"))?,
        size_bytes: decode(row.try_get("size_bytes"))?,
        uploaded_by: decode(row.try_get("uploaded_by"))?,
        uploaded_at: parse_timestamp(&uploaded_at)?,
    })
}

fn row_to_transition(row: &SqliteRow) -> Result<TransitionRecord, RepositoryError> {
    let request_id: String = decode(row.try_get("request_id"))?;
    let from: String = decode(row.try_get("from_status"))?;
    let to: String = decode(row.try_get("to_status"))?;
    let action: String = decode(row.try_get("action"))?;
    let actor_id: String = decode(row.try_get("actor_id"))?;
    let actor_email: String = decode(row.try_get("actor_email"))?;
    let actor_role: String = decode(row.try_get("actor_role"))?;
    let note: Option<String> = decode(row.try_get("note"))?;
    let occurred_at: String = decode(row.try_get("occurred_at"))?;

    let invalid = |error: backoffice_core::DomainError| RepositoryError::Decode(error.to_string());
    Ok(TransitionRecord {
        request_id: RequestId(request_id),
        from: from.parse::<RequestStatus>().map_err(invalid)?,
        to: to.parse::<RequestStatus>().map_err(invalid)?,
        action: action.parse::<WorkflowAction>().map_err(invalid)?,
        actor: Actor::new(actor_id, actor_email, Role::parse(&actor_role).map_err(invalid)?),
        note,
        occurred_at: parse_timestamp(&occurred_at)?,
    })
}

async fn insert_request_row(
    conn: &mut SqliteConnection,
    request: &Request,
) -> Result<(), RepositoryError> {
    let payload_json = serde_json::to_string(&request.payload)
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    sqlx::query(&format!(
        "INSERT INTO request ({REQUEST_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&request.id.0)
    .bind(request.kind.as_str())
    .bind(request.status.as_str())
    .bind(request.version)
    .bind(&request.created_by.id)
    .bind(&request.created_by.email)
    .bind(request.created_by.role.as_str())
    .bind(payload_json)
    .bind(request.linked_request_id.as_ref().map(|id| id.0.as_str()))
    .bind(timestamp(&request.created_at))
    .bind(timestamp(&request.updated_at))
    .execute(&mut *conn)
    .await?;

    for document in &request.documents {
        insert_document_row(&mut *conn, &request.id, document).await?;
    }
    Ok(())
}

async fn insert_document_row(
    conn: &mut SqliteConnection,
    request_id: &RequestId,
    document: &DocumentRef,
) -> Result<(), RepositoryError> {
    sqlx::query(&format!(
        "INSERT INTO request_document ({DOCUMENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&document.id)
    .bind(&request_id.0)
    .bind(&document.file_name)
    .bind(&document.mime_type)
    .bind(&document.folder_path)
    .bind(&document.link)
    .bind(&document.sha256)
    .bind(document.size_bytes)
    .bind(&document.uploaded_by)
    .bind(timestamp(&document.uploaded_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &RequestFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(kind) = filter.kind {
        builder.push(" AND kind = ").push_bind(kind.as_str());
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(created_by) = &filter.created_by {
        builder.push(" AND created_by_id = ").push_bind(created_by.clone());
    }
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn insert(&self, request: Request) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_request_row(&mut *tx, &request).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM request WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: RequestFilter) -> Result<RequestPage, RepositoryError> {
        let filter = filter.normalized();

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM request");
        push_filters(&mut count, &filter);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {REQUEST_COLUMNS} FROM request"));
        push_filters(&mut select, &filter);
        select
            .push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(i64::from(filter.page_size))
            .push(" OFFSET ")
            .push_bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX));
        let rows = select.build().fetch_all(&self.pool).await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in &rows {
            requests.push(self.hydrate(row).await?);
        }

        Ok(RequestPage {
            rows: requests,
            total: u64::try_from(total).unwrap_or_default(),
            page: filter.page,
            page_size: filter.page_size,
        })
    }

    async fn apply_transition(&self, write: TransitionWrite) -> Result<(), RepositoryError> {
        let TransitionWrite { request, expected_version, record, document, spawned, consent_token_hash } =
            write;
        let mut tx = self.pool.begin().await?;

        if let Some(spawned) = &spawned {
            insert_request_row(&mut *tx, spawned).await?;
        }

        let updated = sqlx::query(
            "UPDATE request
             SET status = ?, version = ?, updated_at = ?, linked_request_id = ?
             WHERE id = ? AND version = ?",
        )
        .bind(request.status.as_str())
        .bind(request.version)
        .bind(timestamp(&request.updated_at))
        .bind(request.linked_request_id.as_ref().map(|id| id.0.as_str()))
        .bind(&request.id.0)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT version FROM request WHERE id = ?")
                    .bind(&request.id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match exists {
                Some(_) => RepositoryError::VersionConflict {
                    request_id: request.id.0.clone(),
                    expected: expected_version,
                },
                None => RepositoryError::NotFound(request.id.0.clone()),
            });
        }

        if let Some(token_hash) = &consent_token_hash {
            let consumed = sqlx::query(
                "UPDATE consent_token SET consumed_at = ?1
                 WHERE token_hash = ?2 AND request_id = ?3
                   AND consumed_at IS NULL AND expires_at > ?1",
            )
            .bind(timestamp(&record.occurred_at))
            .bind(token_hash)
            .bind(&request.id.0)
            .execute(&mut *tx)
            .await?;
            if consumed.rows_affected() == 0 {
                return Err(RepositoryError::ConsentTokenSpent);
            }
        }

        sqlx::query(
            "INSERT INTO request_transition
                 (request_id, from_status, to_status, action, actor_id, actor_email, actor_role,
                  note, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.request_id.0)
        .bind(record.from.as_str())
        .bind(record.to.as_str())
        .bind(record.action.as_str())
        .bind(&record.actor.id)
        .bind(&record.actor.email)
        .bind(record.actor.role.as_str())
        .bind(record.note.as_deref())
        .bind(timestamp(&record.occurred_at))
        .execute(&mut *tx)
        .await?;

        if let Some(document) = &document {
            insert_document_row(&mut *tx, &request.id, document).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_transitions(
        &self,
        id: &RequestId,
    ) -> Result<Vec<TransitionRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT request_id, from_status, to_status, action, actor_id, actor_email, actor_role,
                    note, occurred_at
             FROM request_transition WHERE request_id = ? ORDER BY id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_transition).collect()
    }

    async fn find_document(
        &self,
        document_id: &str,
    ) -> Result<Option<(RequestId, DocumentRef)>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM request_document WHERE id = ?"
        ))
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => {
                let request_id: String = decode(row.try_get("request_id"))?;
                Ok(Some((RequestId(request_id), row_to_document(row)?)))
            }
            None => Ok(None),
        }
    }

    async fn save_consent_token(
        &self,
        token_hash: &str,
        request_id: &RequestId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO consent_token (token_hash, request_id, expires_at, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(token_hash)
        .bind(&request_id.0)
        .bind(timestamp(&expires_at))
        .bind(timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn resolve_consent_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RequestId>, RepositoryError> {
        let request_id: Option<String> = sqlx::query_scalar(
            "SELECT request_id FROM consent_token
             WHERE token_hash = ? AND consumed_at IS NULL AND expires_at > ?",
        )
        .bind(token_hash)
        .bind(timestamp(&now))
        .fetch_optional(&self.pool)
        .await?;

        Ok(request_id.map(RequestId))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use serde_json::json;

    use backoffice_core::documents::{DocumentRef, DocumentUpload};
    use backoffice_core::domain::request::{Request, RequestKind, RequestStatus, TransitionRecord};
    use backoffice_core::domain::role::{Actor, Role};
    use backoffice_core::workflow::WorkflowAction;

    use super::SqlRequestRepository;
    use crate::repositories::{RepositoryError, RequestFilter, RequestRepository, TransitionWrite};
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlRequestRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlRequestRepository::new(pool)
    }

    fn backoffice() -> Actor {
        Actor::new("u-bo", "backoffice@example.com", Role::BackofficeComercial)
    }

    fn private_purchase() -> Request {
        Request::new(
            RequestKind::PrivatePurchase,
            RequestStatus::PendingCommercial,
            Actor::new("u-rep", "rep@example.com", Role::Comercial),
            json!({
                "client_snapshot": {"commercial_name": "Clinica Norte"},
                "equipment": [{"sku": "AN-200", "quantity": 2}],
                "notes": "precio especial ñ",
            }),
        )
    }

    fn offer_document() -> DocumentRef {
        let decoded = DocumentUpload {
            file_name: "oferta.pdf".to_owned(),
            mime_type: None,
            content_base64: "aGVsbG8=".to_owned(),
        }
        .decode(1024)
        .expect("decode");
        DocumentRef::new(&decoded, "/Ofertas Sin Firmar/rep@example.com/Clinica Norte", "u-bo")
    }

    fn send_offer(request: &Request) -> TransitionWrite {
        let mut next = request.clone();
        next.advance(RequestStatus::OfferSent).expect("advance");
        let document = offer_document();
        next.attach(document.clone());
        TransitionWrite {
            expected_version: request.version,
            record: TransitionRecord {
                request_id: request.id.clone(),
                from: request.status,
                to: next.status,
                action: WorkflowAction::SendOffer,
                actor: backoffice(),
                note: Some("primera oferta".to_owned()),
                occurred_at: Utc::now(),
            },
            request: next,
            document: Some(document),
            spawned: None,
            consent_token_hash: None,
        }
    }

    #[tokio::test]
    async fn insert_then_find_returns_payload_verbatim() {
        let repo = repository().await;
        let request = private_purchase();

        repo.insert(request.clone()).await.expect("insert");
        let found = repo.find_by_id(&request.id).await.expect("find").expect("present");

        assert_eq!(found.payload, request.payload);
        assert_eq!(found.status, RequestStatus::PendingCommercial);
        assert_eq!(found.created_by, request.created_by);
        assert_eq!(found.version, 1);
    }

    #[tokio::test]
    async fn apply_transition_persists_status_history_and_document() {
        let repo = repository().await;
        let request = private_purchase();
        repo.insert(request.clone()).await.expect("insert");

        let write = send_offer(&request);
        let document_id = write.document.as_ref().map(|doc| doc.id.clone()).expect("doc");
        repo.apply_transition(write).await.expect("apply");

        let found = repo.find_by_id(&request.id).await.expect("find").expect("present");
        assert_eq!(found.status, RequestStatus::OfferSent);
        assert_eq!(found.version, 2);
        assert_eq!(found.documents.len(), 1);

        let history = repo.list_transitions(&request.id).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, WorkflowAction::SendOffer);
        assert_eq!(history[0].note.as_deref(), Some("primera oferta"));

        let (owner, document) =
            repo.find_document(&document_id).await.expect("find doc").expect("doc present");
        assert_eq!(owner, request.id);
        assert_eq!(document.size_bytes, 5);
    }

    #[tokio::test]
    async fn stale_version_is_rejected_without_side_effects() {
        let repo = repository().await;
        let request = private_purchase();
        repo.insert(request.clone()).await.expect("insert");
        repo.apply_transition(send_offer(&request)).await.expect("first writer");

        let error = repo.apply_transition(send_offer(&request)).await.expect_err("second writer");
        assert!(matches!(error, RepositoryError::VersionConflict { expected: 1, .. }));

        let history = repo.list_transitions(&request.id).await.expect("history");
        assert_eq!(history.len(), 1);
        let found = repo.find_by_id(&request.id).await.expect("find").expect("present");
        assert_eq!(found.documents.len(), 1);
    }

    #[tokio::test]
    async fn racing_writers_on_same_version_have_exactly_one_winner() {
        let repo = Arc::new(repository().await);
        let request = private_purchase();
        repo.insert(request.clone()).await.expect("insert");

        let first = {
            let repo = Arc::clone(&repo);
            let write = send_offer(&request);
            tokio::spawn(async move { repo.apply_transition(write).await })
        };
        let second = {
            let repo = Arc::clone(&repo);
            let write = send_offer(&request);
            tokio::spawn(async move { repo.apply_transition(write).await })
        };

        let results = [first.await.expect("join"), second.await.expect("join")];
        let winners = results.iter().filter(|result| result.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|result| matches!(result, Err(RepositoryError::VersionConflict { .. })))
            .count();
        assert_eq!((winners, conflicts), (1, 1));
    }

    #[tokio::test]
    async fn list_filters_and_pages_newest_first() {
        let repo = repository().await;
        let mut ids = Vec::new();
        for offset in 0..3 {
            let mut request = private_purchase();
            request.created_at = Utc::now() - Duration::minutes(10 - offset);
            ids.push(request.id.clone());
            repo.insert(request).await.expect("insert");
        }
        let permit = Request::new(
            RequestKind::Permit,
            RequestStatus::Pending,
            Actor::new("u-emp", "emp@example.com", Role::Employee),
            json!({"permit_type": "salud", "duration_days": 1}),
        );
        repo.insert(permit).await.expect("insert permit");

        let page = repo
            .list(RequestFilter {
                kind: Some(RequestKind::PrivatePurchase),
                page: 1,
                page_size: 2,
                ..RequestFilter::default()
            })
            .await
            .expect("list");
        assert_eq!(page.total, 3);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0].id, ids[2]);
        assert_eq!(page.rows[1].id, ids[1]);

        let mine = repo
            .list(RequestFilter { created_by: Some("u-emp".to_owned()), ..RequestFilter::default() })
            .await
            .expect("list mine");
        assert_eq!(mine.total, 1);
        assert_eq!(mine.rows[0].kind, RequestKind::Permit);
    }

    #[tokio::test]
    async fn forwarding_links_spawned_request_atomically() {
        let repo = repository().await;
        let mut request = private_purchase();
        request.status = RequestStatus::ClientRegistered;
        repo.insert(request.clone()).await.expect("insert");

        let spawned = Request::new(
            RequestKind::EquipmentPurchase,
            RequestStatus::PendingProviderAssignment,
            backoffice(),
            json!({"client_name": "Clinica Norte", "equipment": [{"sku": "AN-200"}]}),
        );
        let mut next = request.clone();
        next.advance(RequestStatus::SentToAcp).expect("advance");
        next.linked_request_id = Some(spawned.id.clone());

        repo.apply_transition(TransitionWrite {
            expected_version: 1,
            record: TransitionRecord {
                request_id: request.id.clone(),
                from: RequestStatus::ClientRegistered,
                to: RequestStatus::SentToAcp,
                action: WorkflowAction::ForwardToAcp,
                actor: backoffice(),
                note: None,
                occurred_at: Utc::now(),
            },
            request: next,
            document: None,
            spawned: Some(spawned.clone()),
            consent_token_hash: None,
        })
        .await
        .expect("forward");

        let found = repo.find_by_id(&request.id).await.expect("find").expect("present");
        assert_eq!(found.linked_request_id, Some(spawned.id.clone()));
        let child = repo.find_by_id(&spawned.id).await.expect("find").expect("spawned");
        assert_eq!(child.status, RequestStatus::PendingProviderAssignment);
    }

    #[tokio::test]
    async fn consent_tokens_are_single_use_and_expire() {
        let repo = repository().await;
        let request = Request::new(
            RequestKind::ClientRequest,
            RequestStatus::PendingConsent,
            Actor::new("u-rep", "rep@example.com", Role::Comercial),
            json!({"commercial_name": "Farmacia Uno", "ruc_cedula": "1790012345001"}),
        );
        repo.insert(request.clone()).await.expect("insert");

        let now = Utc::now();
        repo.save_consent_token("hash-live", &request.id, now + Duration::hours(1))
            .await
            .expect("save");
        repo.save_consent_token("hash-expired", &request.id, now - Duration::minutes(1))
            .await
            .expect("save");

        assert_eq!(
            repo.resolve_consent_token("hash-live", now).await.expect("resolve"),
            Some(request.id.clone())
        );
        assert_eq!(repo.resolve_consent_token("hash-expired", now).await.expect("expired"), None);
        assert_eq!(repo.resolve_consent_token("unknown", now).await.expect("unknown"), None);

        let grant = |token: &str| {
            let mut next = request.clone();
            next.advance(RequestStatus::PendingApproval).expect("advance");
            TransitionWrite {
                expected_version: request.version,
                record: TransitionRecord {
                    request_id: request.id.clone(),
                    from: RequestStatus::PendingConsent,
                    to: RequestStatus::PendingApproval,
                    action: WorkflowAction::GrantConsent,
                    actor: Actor::new("consent-link", "compras@uno.ec", Role::Client),
                    note: None,
                    occurred_at: next.updated_at,
                },
                request: next,
                document: None,
                spawned: None,
                consent_token_hash: Some(token.to_owned()),
            }
        };

        let error = repo.apply_transition(grant("hash-expired")).await.expect_err("expired");
        assert!(matches!(error, RepositoryError::ConsentTokenSpent));
        let untouched = repo.find_by_id(&request.id).await.expect("find").expect("present");
        assert_eq!(untouched.status, RequestStatus::PendingConsent);

        repo.apply_transition(grant("hash-live")).await.expect("redeemed");
        assert_eq!(repo.resolve_consent_token("hash-live", now).await.expect("spent"), None);
    }

    #[tokio::test]
    async fn conflicting_consent_write_keeps_token_usable() {
        let repo = repository().await;
        let request = Request::new(
            RequestKind::ClientRequest,
            RequestStatus::PendingConsent,
            Actor::new("u-rep", "rep@example.com", Role::Comercial),
            json!({"commercial_name": "Farmacia Dos", "ruc_cedula": "1790012345002"}),
        );
        repo.insert(request.clone()).await.expect("insert");
        let now = Utc::now();
        repo.save_consent_token("hash-kept", &request.id, now + Duration::hours(1))
            .await
            .expect("save");

        let mut next = request.clone();
        next.advance(RequestStatus::PendingApproval).expect("advance");
        let error = repo
            .apply_transition(TransitionWrite {
                expected_version: request.version + 1,
                record: TransitionRecord {
                    request_id: request.id.clone(),
                    from: RequestStatus::PendingConsent,
                    to: RequestStatus::PendingApproval,
                    action: WorkflowAction::GrantConsent,
                    actor: Actor::new("consent-link", "", Role::Client),
                    note: None,
                    occurred_at: next.updated_at,
                },
                request: next,
                document: None,
                spawned: None,
                consent_token_hash: Some("hash-kept".to_owned()),
            })
            .await
            .expect_err("stale version");
        assert!(matches!(error, RepositoryError::VersionConflict { .. }));
        assert_eq!(
            repo.resolve_consent_token("hash-kept", now).await.expect("still live"),
            Some(request.id)
        );
    }
}
