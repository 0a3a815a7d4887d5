//! Remote collaborators the action layer talks to. Implementations live
//! outside this crate; the `Missing*` types stand in when one is not wired.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use shared::{domain::ImageBlob, protocol::AuthUser};

/// Handle to an object written by [`ObjectStorage::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub path: String,
    pub download_token: Option<String>,
}

#[async_trait]
pub trait Datastore: Send + Sync {
    /// Appends `record` under a freshly generated key and returns that key.
    async fn push(&self, collection: &str, record: Value) -> Result<String>;
    /// Merges `fields` into the record stored at `key`.
    async fn update(&self, collection: &str, key: &str, fields: Value) -> Result<()>;
    /// Reads the whole collection once: an object keyed by record id, or
    /// `Value::Null` when the collection is empty.
    async fn read_once(&self, collection: &str) -> Result<Value>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, path: &str, blob: &ImageBlob) -> Result<StoredObject>;
    async fn download_url(&self, object: &StoredObject) -> Result<String>;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser>;
    async fn sign_in_with_email_and_password(&self, email: &str, password: &str)
        -> Result<AuthUser>;
    async fn sign_out(&self) -> Result<()>;
}

pub struct MissingDatastore;

#[async_trait]
impl Datastore for MissingDatastore {
    async fn push(&self, collection: &str, _record: Value) -> Result<String> {
        Err(anyhow!("datastore unavailable for collection {collection}"))
    }

    async fn update(&self, collection: &str, key: &str, _fields: Value) -> Result<()> {
        Err(anyhow!(
            "datastore unavailable for collection {collection} key {key}"
        ))
    }

    async fn read_once(&self, collection: &str) -> Result<Value> {
        Err(anyhow!("datastore unavailable for collection {collection}"))
    }
}

pub struct MissingObjectStorage;

#[async_trait]
impl ObjectStorage for MissingObjectStorage {
    async fn put(&self, path: &str, _blob: &ImageBlob) -> Result<StoredObject> {
        Err(anyhow!("object storage unavailable for path {path}"))
    }

    async fn download_url(&self, object: &StoredObject) -> Result<String> {
        Err(anyhow!("object storage unavailable for path {}", object.path))
    }
}

pub struct MissingAuthService;

#[async_trait]
impl AuthService for MissingAuthService {
    async fn create_user_with_email_and_password(
        &self,
        _email: &str,
        _password: &str,
    ) -> Result<AuthUser> {
        Err(anyhow!("auth service unavailable"))
    }

    async fn sign_in_with_email_and_password(
        &self,
        _email: &str,
        _password: &str,
    ) -> Result<AuthUser> {
        Err(anyhow!("auth service unavailable"))
    }

    async fn sign_out(&self) -> Result<()> {
        Err(anyhow!("auth service unavailable"))
    }
}
