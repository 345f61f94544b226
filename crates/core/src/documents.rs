//! Document uploads attached to workflow transitions.
//!
//! Uploads arrive as base64 (optionally wrapped in a data URL), are checked
//! against the configured size limit, and are filed under a folder derived
//! from the request they belong to.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::payload::{self, ClientRequestPayload, EquipmentPurchasePayload, PrivatePurchasePayload};
use crate::domain::request::{Request, RequestKind};
use crate::workflow::WorkflowAction;

pub const DOCUMENT_LINK_PREFIX: &str = "/api/v1/documents";
const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
const FALLBACK_SEGMENT: &str = "general";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("document content is empty")]
    Empty,
    #[error("document file name is empty")]
    MissingFileName,
    #[error("document content is not valid base64: {0}")]
    InvalidEncoding(String),
    #[error("document is {size} bytes, above the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpload {
    pub file_name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub content_base64: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedDocument {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub sha256: String,
}

impl DocumentUpload {
    pub fn decode(&self, max_bytes: usize) -> Result<DecodedDocument, DocumentError> {
        let file_name = sanitize_segment(&self.file_name);
        if self.file_name.trim().is_empty() {
            return Err(DocumentError::MissingFileName);
        }

        let raw = self.content_base64.trim();
        let (url_mime, encoded) = split_data_url(raw);
        if encoded.is_empty() {
            return Err(DocumentError::Empty);
        }

        // A base64 payload decodes to at most three quarters of its length.
        if encoded.len() / 4 * 3 > max_bytes.saturating_add(3) {
            return Err(DocumentError::TooLarge { size: encoded.len() / 4 * 3, limit: max_bytes });
        }

        let bytes = STANDARD
            .decode(encoded)
            .map_err(|error| DocumentError::InvalidEncoding(error.to_string()))?;
        if bytes.is_empty() {
            return Err(DocumentError::Empty);
        }
        if bytes.len() > max_bytes {
            return Err(DocumentError::TooLarge { size: bytes.len(), limit: max_bytes });
        }

        let mime_type = self
            .mime_type
            .as_deref()
            .map(str::trim)
            .filter(|mime| !mime.is_empty())
            .or(url_mime)
            .map(str::to_owned)
            .unwrap_or_else(|| guess_mime_type(&file_name).to_owned());

        Ok(DecodedDocument { sha256: sha256_hex(&bytes), file_name, mime_type, bytes })
    }
}

fn split_data_url(raw: &str) -> (Option<&str>, &str) {
    let Some(rest) = raw.strip_prefix("data:") else {
        return (None, raw);
    };
    match rest.split_once(',') {
        Some((header, payload)) => {
            let mime = header.split(';').next().filter(|mime| !mime.is_empty());
            (mime, payload.trim())
        }
        None => (None, rest),
    }
}

fn guess_mime_type(file_name: &str) -> &'static str {
    let extension = file_name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("txt") => "text/plain",
        _ => DEFAULT_MIME_TYPE,
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Replaces characters that are not allowed in folder or file names.
pub fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|ch| match ch {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            other => other,
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed.chars().all(|ch| ch == '.') {
        FALLBACK_SEGMENT.to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentFolder {
    UnsignedOffer { commercial: String, client: String },
    SignedOffer { commercial: String, client: String },
    EquipmentPurchase { client: String, request_id: String },
    ClientRecord { client: String },
    PermitEvidence { requester_email: String },
}

impl DocumentFolder {
    /// Picks the folder for a document attached to `request` by `action`.
    /// `action` is `None` for documents supplied at creation.
    pub fn for_request(request: &Request, action: Option<WorkflowAction>) -> Self {
        let commercial = request.created_by.email.clone();
        match request.kind {
            RequestKind::PrivatePurchase => {
                let client = payload::view::<PrivatePurchasePayload>(&request.payload)
                    .ok()
                    .and_then(|view| view.client_name().map(str::to_owned))
                    .unwrap_or_default();
                if action == Some(WorkflowAction::ApproveAndSign) {
                    Self::SignedOffer { commercial, client }
                } else {
                    Self::UnsignedOffer { commercial, client }
                }
            }
            RequestKind::EquipmentPurchase => Self::EquipmentPurchase {
                client: payload::view::<EquipmentPurchasePayload>(&request.payload)
                    .map(|view| view.client_name)
                    .unwrap_or_default(),
                request_id: request.id.0.clone(),
            },
            RequestKind::ClientRequest => Self::ClientRecord {
                client: payload::view::<ClientRequestPayload>(&request.payload)
                    .map(|view| view.commercial_name)
                    .unwrap_or_default(),
            },
            RequestKind::Permit => {
                Self::PermitEvidence { requester_email: request.created_by.email.clone() }
            }
        }
    }

    pub fn path(&self) -> String {
        let segments: Vec<&str> = match self {
            Self::UnsignedOffer { commercial, client } => {
                vec!["Ofertas Sin Firmar", commercial, client]
            }
            Self::SignedOffer { commercial, client } => vec!["Ofertas Firmadas", commercial, client],
            Self::EquipmentPurchase { client, request_id } => {
                vec!["Solicitudes de Compra de Equipos", client, request_id]
            }
            Self::ClientRecord { client } => vec!["Ficha de Cliente", client],
            Self::PermitEvidence { requester_email } => vec!["Permisos", requester_email],
        };
        segments.iter().fold(String::new(), |mut path, segment| {
            path.push('/');
            path.push_str(&sanitize_segment(segment));
            path
        })
    }
}

/// A stored document as it is linked from a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    pub file_name: String,
    pub mime_type: String,
    pub folder_path: String,
    pub link: String,
    pub sha256: String,
    pub size_bytes: i64,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

impl DocumentRef {
    pub fn new(document: &DecodedDocument, folder_path: impl Into<String>, uploaded_by: impl Into<String>) -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            link: format!("{DOCUMENT_LINK_PREFIX}/{id}"),
            id,
            file_name: document.file_name.clone(),
            mime_type: document.mime_type.clone(),
            folder_path: folder_path.into(),
            sha256: document.sha256.clone(),
            size_bytes: i64::try_from(document.bytes.len()).unwrap_or(i64::MAX),
            uploaded_by: uploaded_by.into(),
            uploaded_at: Utc::now(),
        }
    }

    /// Object name inside the folder; the id prefix keeps re-uploads apart.
    pub fn stored_name(&self) -> String {
        format!("{}-{}", self.id, self.file_name)
    }

    /// Location of the bytes relative to the document store root.
    pub fn location(&self) -> String {
        format!("{}/{}", self.folder_path.trim_matches('/'), self.stored_name())
    }
}
