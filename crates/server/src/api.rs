//! JSON API over the workflow service.
//!
//! - `POST /api/v1/requests/{kind}`                 open a request
//! - `GET  /api/v1/requests`                        list (`kind,status,mine,page,page_size`)
//! - `GET  /api/v1/requests/{id}`                   fetch one request
//! - `GET  /api/v1/requests/{id}/actions`           actions open to the caller
//! - `GET  /api/v1/requests/{id}/history`           applied transitions
//! - `POST /api/v1/requests/{id}/transitions`       apply an action
//! - `GET  /api/v1/documents/{id}`                  stored document bytes
//! - `POST /api/v1/public/consent/{token}`          client consent link

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use backoffice_core::documents::DocumentUpload;
use backoffice_core::domain::request::{
    Request, RequestId, RequestKind, RequestStatus, TransitionRecord,
};
use backoffice_core::domain::role::Actor;
use backoffice_core::errors::{ApplicationError, DomainError, InterfaceError};
use backoffice_core::workflow::WorkflowAction;
use backoffice_db::RequestPage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::auth::{self, ApiToken};
use crate::service::{
    ActionsView, CreateCommand, Created, ListQuery, TransitionCommand, Transitioned,
    WorkflowService,
};

/// Room for base64 expansion and the JSON around an upload.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct ApiState {
    service: Arc<WorkflowService>,
    token: ApiToken,
}

impl ApiState {
    pub fn new(service: Arc<WorkflowService>, token: ApiToken) -> Self {
        Self { service, token }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_class: &'static str,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0;
        let status = match &error {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(
                event_name = "api.request.failed",
                correlation_id = %error.correlation_id(),
                error_class = error.error_class(),
                error = %error.message(),
                "request failed"
            );
        } else {
            warn!(
                event_name = "api.request.rejected",
                correlation_id = %error.correlation_id(),
                error_class = error.error_class(),
                error = %error.message(),
                "request rejected"
            );
        }

        let message = if error.is_client_error() {
            error.message().to_owned()
        } else {
            error.user_message().to_owned()
        };
        let body = ErrorBody {
            error: message,
            error_class: error.error_class(),
            correlation_id: error.correlation_id().to_owned(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct CreateBody {
    pub payload: Value,
    #[serde(default)]
    pub document: Option<DocumentUpload>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub kind: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub mine: bool,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    pub action: String,
    #[serde(default)]
    pub expected_version: Option<i64>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub document: Option<DocumentUpload>,
}

pub fn router(state: ApiState) -> Router {
    let body_limit = state.service.max_upload_bytes() / 3 * 4 + BODY_OVERHEAD_BYTES;
    Router::new()
        .route("/api/v1/requests", get(list_requests))
        // `{id}` doubles as the request kind on POST.
        .route("/api/v1/requests/{id}", get(get_request).post(create_request))
        .route("/api/v1/requests/{id}/actions", get(request_actions))
        .route("/api/v1/requests/{id}/history", get(request_history))
        .route("/api/v1/requests/{id}/transitions", post(apply_transition))
        .route("/api/v1/documents/{id}", get(download_document))
        .route("/api/v1/public/consent/{token}", post(grant_consent))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn caller(state: &ApiState, headers: &HeaderMap) -> Result<(Actor, String), ApiError> {
    let correlation_id = auth::correlation_id(headers);
    let actor = auth::authenticate(headers, &state.token)
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok((actor, correlation_id))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>, correlation_id: &str) -> ApiResult<T> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            Err(ApiError(InterfaceError::PayloadTooLarge {
                message: rejection.body_text(),
                correlation_id: correlation_id.to_owned(),
            }))
        }
        Err(rejection) => Err(ApiError(InterfaceError::BadRequest {
            message: rejection.body_text(),
            correlation_id: correlation_id.to_owned(),
        })),
    }
}

fn parse<T>(raw: &str, correlation_id: &str) -> ApiResult<T>
where
    T: std::str::FromStr<Err = DomainError>,
{
    raw.parse::<T>()
        .map_err(|error| ApiError::from_application(error.into(), correlation_id))
}

async fn create_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(kind): Path<String>,
    payload: Result<Json<CreateBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    let (actor, correlation_id) = caller(&state, &headers)?;
    let kind: RequestKind = parse(&kind, &correlation_id)?;
    let body = json_body(payload, &correlation_id)?;

    let created = state
        .service
        .create(
            &actor,
            CreateCommand { kind, payload: body.payload, document: body.document },
            &correlation_id,
        )
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    info!(
        event_name = "api.request.created",
        correlation_id = %correlation_id,
        request_id = %created.request.id,
        actor_role = %actor.role,
        "request created via api"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_requests(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<RequestPage>> {
    let (actor, correlation_id) = caller(&state, &headers)?;
    let kind = params.kind.as_deref().map(|raw| parse::<RequestKind>(raw, &correlation_id)).transpose()?;
    let status =
        params.status.as_deref().map(|raw| parse::<RequestStatus>(raw, &correlation_id)).transpose()?;

    let page = state
        .service
        .list(
            &actor,
            ListQuery {
                kind,
                status,
                mine: params.mine,
                page: params.page,
                page_size: params.page_size,
            },
        )
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(page))
}

async fn get_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Request>> {
    let (actor, correlation_id) = caller(&state, &headers)?;
    let request = state
        .service
        .get(&actor, &RequestId(id))
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(request))
}

async fn request_actions(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<ActionsView>> {
    let (actor, correlation_id) = caller(&state, &headers)?;
    let view = state
        .service
        .available_actions(&actor, &RequestId(id))
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(view))
}

async fn request_history(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<TransitionRecord>>> {
    let (actor, correlation_id) = caller(&state, &headers)?;
    let history = state
        .service
        .history(&actor, &RequestId(id))
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(history))
}

async fn apply_transition(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<TransitionBody>, JsonRejection>,
) -> ApiResult<Json<Transitioned>> {
    let (actor, correlation_id) = caller(&state, &headers)?;
    let body = json_body(payload, &correlation_id)?;
    let action: WorkflowAction = parse(&body.action, &correlation_id)?;

    let outcome = state
        .service
        .transition(
            &actor,
            &RequestId(id),
            TransitionCommand {
                action,
                expected_version: body.expected_version,
                note: body.note,
                document: body.document,
            },
            &correlation_id,
        )
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(outcome))
}

async fn download_document(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let (actor, correlation_id) = caller(&state, &headers)?;
    let content = state
        .service
        .document(&actor, &id)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    let content_type = HeaderValue::from_str(&content.document.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition =
        HeaderValue::from_str(&format!("inline; filename=\"{}\"", content.document.file_name))
            .unwrap_or_else(|_| HeaderValue::from_static("inline"));

    Ok((
        [(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition)],
        content.bytes,
    )
        .into_response())
}

async fn grant_consent(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> ApiResult<Json<Transitioned>> {
    let correlation_id = auth::correlation_id(&headers);
    let outcome = state
        .service
        .grant_consent(&token, &correlation_id)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;

    info!(
        event_name = "api.consent.granted",
        correlation_id = %correlation_id,
        request_id = %outcome.request.id,
        "client consent recorded"
    );
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, ApiState};
    use crate::auth::ApiToken;
    use crate::service::tests::service;

    const TOKEN: &str = "api-token-for-tests-0001";

    fn app() -> Router {
        let (service, _) = service();
        let token = ApiToken::new(&SecretString::from(TOKEN.to_string()));
        router(ApiState::new(Arc::new(service), token))
    }

    fn call(method: &str, uri: &str, role: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {TOKEN}"))
            .header("x-actor-id", format!("id-{role}"))
            .header("x-actor-email", format!("{role}@example.com"))
            .header("x-actor-role", role)
            .header("x-correlation-id", "corr-test")
            .header("content-type", "application/json");
        match body {
            Some(body) => builder.body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request builds")
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("router responds");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn private_purchase() -> Value {
        json!({"payload": {"client_snapshot": {"commercial_name": "Clinica Norte"}}})
    }

    #[tokio::test]
    async fn create_then_transition_round_trip() {
        let app = app();
        let (status, created) =
            send(&app, call("POST", "/api/v1/requests/private_purchase", "comercial", Some(private_purchase())))
                .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["request"]["status"], "pending_commercial");
        let id = created["request"]["id"].as_str().expect("id").to_string();

        let (status, actions) =
            send(&app, call("GET", &format!("/api/v1/requests/{id}/actions"), "backoffice_comercial", None))
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(actions["actions"][0]["action"], "send_offer");

        let (status, moved) = send(
            &app,
            call(
                "POST",
                &format!("/api/v1/requests/{id}/transitions"),
                "backoffice_comercial",
                Some(json!({
                    "action": "send_offer",
                    "expected_version": 1,
                    "document": {"file_name": "oferta.pdf", "content_base64": "data:application/pdf;base64,JVBERi0xLjQ="},
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(moved["request"]["status"], "offer_sent");
        assert_eq!(moved["request"]["version"], 2);

        let link = moved["request"]["documents"][0]["link"].as_str().expect("link").to_string();
        let response = app
            .clone()
            .oneshot(call("GET", &link, "backoffice_comercial", None))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/pdf");
    }

    #[tokio::test]
    async fn error_mapping_follows_error_class() {
        let app = app();
        let (_, created) =
            send(&app, call("POST", "/api/v1/requests/private_purchase", "comercial", Some(private_purchase())))
                .await;
        let id = created["request"]["id"].as_str().expect("id").to_string();
        let uri = format!("/api/v1/requests/{id}/transitions");

        let (status, body) =
            send(&app, call("POST", &uri, "comercial", Some(json!({"action": "send_offer"})))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error_class"], "forbidden");
        assert_eq!(body["correlation_id"], "corr-test");

        let (status, body) = send(
            &app,
            call("POST", &uri, "backoffice_comercial", Some(json!({"action": "forward_to_acp"}))),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error_class"], "conflict");

        let (status, body) =
            send(&app, call("POST", &uri, "backoffice_comercial", Some(json!({"action": "send_offer"})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_class"], "validation");

        let (status, _) =
            send(&app, call("POST", &uri, "backoffice_comercial", Some(json!({"action": "fly"})))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            send(&app, call("GET", "/api/v1/requests/does-not-exist", "admin", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_class"], "not_found");
    }

    #[tokio::test]
    async fn missing_credentials_are_unauthorized() {
        let app = app();
        let request = Request::builder()
            .method("GET")
            .uri("/api/v1/requests")
            .body(Body::empty())
            .expect("request builds");
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_class"], "unauthorized");
        assert!(body["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn list_accepts_filters_and_rejects_unknown_kind() {
        let app = app();
        send(&app, call("POST", "/api/v1/requests/private_purchase", "comercial", Some(private_purchase())))
            .await;

        let (status, page) = send(
            &app,
            call("GET", "/api/v1/requests?kind=private_purchase&status=pending_commercial", "gerencia", None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], 1);
        assert_eq!(page["page"], 1);

        let (status, _) = send(&app, call("GET", "/api/v1/requests?kind=boats", "gerencia", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn consent_link_works_without_actor_headers() {
        let app = app();
        let (_, created) = send(
            &app,
            call(
                "POST",
                "/api/v1/requests/client_request",
                "comercial",
                Some(json!({"payload": {"commercial_name": "Laboratorio Sur", "ruc_cedula": "0912345678"}})),
            ),
        )
        .await;
        let token = created["consent_token"].as_str().expect("token").to_string();
        let id = created["request"]["id"].as_str().expect("id").to_string();
        let uri = format!("/api/v1/requests/{id}/transitions");
        let grant = json!({"action": "grant_consent"});

        let (status, _) = send(&app, call("POST", &uri, "admin", Some(grant.clone()))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, call("POST", &uri, "client", Some(grant))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/public/consent/{token}"))
            .body(Body::empty())
            .expect("request builds");
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["request"]["status"], "pending_approval");

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/public/consent/{token}"))
            .body(Body::empty())
            .expect("request builds");
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
