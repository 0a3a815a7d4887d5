//! Remote services for the upload store: a REST client for a Firebase-style
//! realtime database, object storage and identity toolkit, plus an in-process
//! stand-in with the same contract.

use anyhow::{anyhow, Context, Result};
use reqwest::{header::AUTHORIZATION, Client, RequestBuilder, Response};
use serde::Deserialize;
use tokio::sync::RwLock;
use url::Url;

mod auth;
mod database;
mod memory;
mod storage;

pub use memory::{InMemoryBackend, DEFAULT_MEMORY_BASE_URL};

pub const DEFAULT_STORAGE_URL: &str = "https://firebasestorage.googleapis.com";
pub const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub database_url: String,
    pub storage_bucket: String,
    pub storage_url: String,
    pub auth_url: String,
}

#[derive(Debug, Clone)]
struct AuthSession {
    uid: String,
    id_token: String,
}

/// Implements `Datastore`, `ObjectStorage` and `AuthService` over HTTP.
///
/// A successful sign-up or sign-in keeps the returned id token; database
/// requests then carry it as `?auth=` and storage requests as an
/// `Authorization: Firebase` header.
pub struct FirebaseRestBackend {
    http: Client,
    config: FirebaseConfig,
    session: RwLock<Option<AuthSession>>,
}

impl FirebaseRestBackend {
    pub fn new(config: FirebaseConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    pub fn with_client(config: FirebaseConfig, http: Client) -> Self {
        Self {
            http,
            config,
            session: RwLock::new(None),
        }
    }

    pub async fn signed_in_uid(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.uid.clone())
    }

    async fn id_token(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.id_token.clone())
    }

    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.id_token().await {
            Some(token) => request.header(AUTHORIZATION, format!("Firebase {token}")),
            None => request,
        }
    }
}

/// Appends `segments` to the path of `base`, percent-encoding each one so a
/// `/` inside a segment stays part of it.
pub(crate) fn endpoint<S: AsRef<str>>(base: &str, segments: &[S]) -> Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("invalid base url {base}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("base url {base} cannot carry a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message(String),
    Structured { message: String },
}

impl ErrorDetail {
    fn into_message(self) -> String {
        match self {
            ErrorDetail::Message(message) | ErrorDetail::Structured { message } => message,
        }
    }
}

pub(crate) async fn error_for_response(operation: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error.into_message())
        .unwrap_or(body);
    Err(anyhow!("{operation} failed ({status}): {message}"))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
