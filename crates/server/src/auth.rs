//! Caller identification for API routes.
//!
//! Every request carries the shared API token as a bearer credential plus the
//! acting user's identity headers. The gateway in front of the service owns
//! user login; this layer only checks the token and reads the identity.

use axum::http::HeaderMap;
use backoffice_core::domain::role::{Actor, Role};
use backoffice_core::errors::ApplicationError;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_EMAIL_HEADER: &str = "x-actor-email";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Digest of the configured API token. The raw secret is not kept.
#[derive(Clone)]
pub struct ApiToken {
    digest: [u8; 32],
}

impl ApiToken {
    pub fn new(secret: &SecretString) -> Self {
        Self { digest: Sha256::digest(secret.expose_secret().as_bytes()).into() }
    }

    /// Compares digests without short-circuiting on the first differing byte.
    pub fn verify(&self, presented: &str) -> bool {
        let presented: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        self.digest.iter().zip(presented.iter()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
    }
}

pub fn correlation_id(headers: &HeaderMap) -> String {
    header(headers, CORRELATION_ID_HEADER)
        .filter(|value| value.len() <= 128)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn authenticate(headers: &HeaderMap, token: &ApiToken) -> Result<Actor, ApplicationError> {
    let presented = header(headers, "authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(|| ApplicationError::Unauthorized("missing bearer token".to_string()))?;
    if !token.verify(presented) {
        return Err(ApplicationError::Unauthorized("invalid bearer token".to_string()));
    }

    let id = required(headers, ACTOR_ID_HEADER)?;
    let email = required(headers, ACTOR_EMAIL_HEADER)?;
    let role = Role::parse(&required(headers, ACTOR_ROLE_HEADER)?)
        .map_err(|error| ApplicationError::Unauthorized(error.to_string()))?;
    if role == Role::Client {
        return Err(ApplicationError::Unauthorized(
            "the client role acts only through a consent link".to_string(),
        ));
    }

    Ok(Actor::new(id, email, role))
}

fn required(headers: &HeaderMap, name: &str) -> Result<String, ApplicationError> {
    header(headers, name)
        .map(str::to_owned)
        .ok_or_else(|| ApplicationError::Unauthorized(format!("missing `{name}` header")))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
