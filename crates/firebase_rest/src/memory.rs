use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use shared::{domain::ImageBlob, protocol::AuthUser};
use tokio::sync::Mutex;
use upload_store::{AuthService, Datastore, ObjectStorage, StoredObject};
use uuid::Uuid;

use crate::endpoint;

pub const DEFAULT_MEMORY_BASE_URL: &str = "memory://uploads";

struct Account {
    uid: String,
    password: String,
}

struct StoredBlob {
    blob: ImageBlob,
    token: String,
}

/// Process-local backend with the same observable contract as the REST one:
/// push keys sort in creation order, patches merge, an empty collection reads
/// as `null`, and storage paths overwrite on collision.
pub struct InMemoryBackend {
    base_url: String,
    next_key: AtomicU64,
    collections: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    objects: Mutex<HashMap<String, StoredBlob>>,
    accounts: Mutex<HashMap<String, Account>>,
    signed_in: Mutex<Option<String>>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_MEMORY_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            next_key: AtomicU64::new(0),
            collections: Mutex::new(HashMap::new()),
            objects: Mutex::new(HashMap::new()),
            accounts: Mutex::new(HashMap::new()),
            signed_in: Mutex::new(None),
        }
    }

    pub async fn object(&self, path: &str) -> Option<ImageBlob> {
        self.objects
            .lock()
            .await
            .get(path)
            .map(|stored| stored.blob.clone())
    }

    pub async fn signed_in_uid(&self) -> Option<String> {
        self.signed_in.lock().await.clone()
    }

    fn next_push_key(&self) -> String {
        let seq = self.next_key.fetch_add(1, Ordering::Relaxed);
        let suffix = Uuid::new_v4().simple().to_string();
        format!("-{seq:012}{}", &suffix[..8])
    }
}

#[async_trait]
impl Datastore for InMemoryBackend {
    async fn push(&self, collection: &str, record: Value) -> Result<String> {
        let key = self.next_push_key();
        self.collections
            .lock()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(key.clone(), record);
        Ok(key)
    }

    async fn update(&self, collection: &str, key: &str, fields: Value) -> Result<()> {
        let Value::Object(fields) = fields else {
            return Err(anyhow!("update for {collection}/{key} must be an object"));
        };

        let mut collections = self.collections.lock().await;
        let entry = collections
            .entry(collection.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        match entry {
            Value::Object(existing) => existing.extend(fields),
            other => *other = Value::Object(fields),
        }
        Ok(())
    }

    async fn read_once(&self, collection: &str) -> Result<Value> {
        let collections = self.collections.lock().await;
        match collections.get(collection) {
            Some(entries) if !entries.is_empty() => Ok(Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            )),
            _ => Ok(Value::Null),
        }
    }
}

#[async_trait]
impl ObjectStorage for InMemoryBackend {
    async fn put(&self, path: &str, blob: &ImageBlob) -> Result<StoredObject> {
        let token = Uuid::new_v4().to_string();
        self.objects.lock().await.insert(
            path.to_string(),
            StoredBlob {
                blob: blob.clone(),
                token: token.clone(),
            },
        );
        Ok(StoredObject {
            path: path.to_string(),
            download_token: Some(token),
        })
    }

    async fn download_url(&self, object: &StoredObject) -> Result<String> {
        let objects = self.objects.lock().await;
        let stored = objects
            .get(&object.path)
            .ok_or_else(|| anyhow!("object {} does not exist", object.path))?;

        let mut url = endpoint(&self.base_url, &[object.path.as_str()])?;
        url.query_pairs_mut().append_pair("token", &stored.token);
        Ok(url.to_string())
    }
}

#[async_trait]
impl AuthService for InMemoryBackend {
    async fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser> {
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(email) {
            return Err(anyhow!("EMAIL_EXISTS"));
        }

        let uid = Uuid::new_v4().simple().to_string();
        accounts.insert(
            email.to_string(),
            Account {
                uid: uid.clone(),
                password: password.to_string(),
            },
        );
        *self.signed_in.lock().await = Some(uid.clone());
        Ok(AuthUser { uid })
    }

    async fn sign_in_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser> {
        let accounts = self.accounts.lock().await;
        let account = accounts
            .get(email)
            .ok_or_else(|| anyhow!("EMAIL_NOT_FOUND"))?;
        if account.password != password {
            return Err(anyhow!("INVALID_PASSWORD"));
        }

        *self.signed_in.lock().await = Some(account.uid.clone());
        Ok(AuthUser {
            uid: account.uid.clone(),
        })
    }

    async fn sign_out(&self) -> Result<()> {
        *self.signed_in.lock().await = None;
        Ok(())
    }
}
