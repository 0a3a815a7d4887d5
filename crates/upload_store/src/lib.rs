use std::{fmt, str::FromStr, sync::Arc};

use anyhow::{anyhow, Context};
use chrono::SubsecRound;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{
    domain::{ImageBlob, NewUpload, UploadId, UploadRecord, User, UserId},
    error::ActionError,
    protocol::{ImageUrlPatch, UploadBody},
};
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

pub mod remote;
mod state;

pub use remote::{
    AuthService, Datastore, MissingAuthService, MissingDatastore, MissingObjectStorage,
    ObjectStorage, StoredObject,
};
pub use state::{Mutation, MutationKind, Snapshot, FEATURED_UPLOAD_COUNT};

pub const DEFAULT_UPLOADS_COLLECTION: &str = "fileUploads";

/// Where a blob lands in object storage.
///
/// `Filename` keys objects by the raw blob name, so two uploads sharing a
/// filename overwrite each other. `UploadId` namespaces them under the
/// collection by the datastore-generated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoragePathPolicy {
    #[default]
    Filename,
    UploadId,
}

impl StoragePathPolicy {
    pub fn object_path(&self, collection: &str, id: &UploadId, blob: &ImageBlob) -> String {
        match self {
            StoragePathPolicy::Filename => blob.name.clone(),
            StoragePathPolicy::UploadId => match blob.extension() {
                Some(ext) => format!("{collection}/{id}.{ext}"),
                None => format!("{collection}/{id}"),
            },
        }
    }
}

impl FromStr for StoragePathPolicy {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "filename" => Ok(StoragePathPolicy::Filename),
            "upload_id" => Ok(StoragePathPolicy::UploadId),
            other => Err(anyhow!("unknown storage path policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub uploads_collection: String,
    pub storage_path_policy: StoragePathPolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            uploads_collection: DEFAULT_UPLOADS_COLLECTION.to_string(),
            storage_path_policy: StoragePathPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Committed(MutationKind),
}

#[derive(Debug, Clone, Copy)]
enum AuthMode {
    SignUp,
    SignIn,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::SignUp => f.write_str("sign-up"),
            AuthMode::SignIn => f.write_str("sign-in"),
        }
    }
}

/// Action layer over a [`Snapshot`].
///
/// Actions call the remote services and then commit [`Mutation`]s; the
/// snapshot lock is never held across a remote call. `loading` is one shared
/// flag, so with two actions in flight the first to finish clears it.
///
/// Only sign-up and sign-in surface failures into the snapshot's `error`.
/// Listing and creation log their failures and hand them back to the caller
/// without touching `error`.
pub struct UploadStore {
    datastore: Arc<dyn Datastore>,
    storage: Arc<dyn ObjectStorage>,
    auth: Arc<dyn AuthService>,
    options: StoreOptions,
    state: RwLock<Snapshot>,
    events: broadcast::Sender<StoreEvent>,
}

impl UploadStore {
    pub fn new() -> Arc<Self> {
        Self::new_with_dependencies(
            Arc::new(MissingDatastore),
            Arc::new(MissingObjectStorage),
            Arc::new(MissingAuthService),
        )
    }

    pub fn new_with_dependencies(
        datastore: Arc<dyn Datastore>,
        storage: Arc<dyn ObjectStorage>,
        auth: Arc<dyn AuthService>,
    ) -> Arc<Self> {
        Self::new_with_options(datastore, storage, auth, StoreOptions::default())
    }

    pub fn new_with_options(
        datastore: Arc<dyn Datastore>,
        storage: Arc<dyn ObjectStorage>,
        auth: Arc<dyn AuthService>,
        options: StoreOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            datastore,
            storage,
            auth,
            options,
            state: RwLock::new(Snapshot::new()),
            events,
        })
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    async fn commit(&self, mutation: Mutation) {
        let kind = mutation.kind();
        self.state.write().await.apply(mutation);
        let _ = self.events.send(StoreEvent::Committed(kind));
    }

    /// Reads the upload collection once and replaces the local list with it.
    pub async fn list_uploads(&self) -> Result<usize, ActionError> {
        self.commit(Mutation::SetLoading(true)).await;

        match self.fetch_uploads().await {
            Ok(uploads) => {
                let count = uploads.len();
                self.commit(Mutation::ReplaceUploads(uploads)).await;
                self.commit(Mutation::SetLoading(false)).await;
                info!(
                    "uploads: listed collection={} count={count}",
                    self.options.uploads_collection
                );
                Ok(count)
            }
            Err(err) => {
                error!(
                    "uploads: listing failed collection={}: {err}",
                    self.options.uploads_collection
                );
                self.commit(Mutation::SetLoading(false)).await;
                Err(err)
            }
        }
    }

    async fn fetch_uploads(&self) -> Result<Vec<UploadRecord>, ActionError> {
        let collection = self
            .datastore
            .read_once(&self.options.uploads_collection)
            .await
            .map_err(ActionError::remote_read)?;
        records_from_collection(collection).map_err(ActionError::remote_read)
    }

    /// Runs the creation workflow and appends the resulting record locally.
    ///
    /// Steps that already succeeded are not undone when a later one fails.
    pub async fn create_upload(&self, upload: NewUpload) -> Result<UploadRecord, ActionError> {
        match self.run_create_upload(&upload).await {
            Ok(record) => {
                self.commit(Mutation::AppendUpload(record.clone())).await;
                info!(
                    "uploads: created id={} filename={}",
                    record.id, record.filename
                );
                Ok(record)
            }
            Err(err) => {
                error!(
                    "uploads: create failed filename={}: {err}",
                    upload.image.name
                );
                Err(err)
            }
        }
    }

    async fn run_create_upload(&self, upload: &NewUpload) -> Result<UploadRecord, ActionError> {
        let id = self.write_upload_record(upload).await?;
        let object = self.store_upload_blob(&id, &upload.image).await?;
        let image_url = self
            .storage
            .download_url(&object)
            .await
            .map_err(ActionError::storage)?;
        self.patch_image_url(&id, &image_url).await?;

        Ok(UploadRecord {
            id,
            kind: upload.kind.clone(),
            description: upload.description.clone(),
            filename: upload.image.name.clone(),
            date: upload.date.trunc_subsecs(3),
            image_url: Some(image_url),
        })
    }

    async fn write_upload_record(&self, upload: &NewUpload) -> Result<UploadId, ActionError> {
        let body = serde_json::to_value(UploadBody::from_new_upload(upload))
            .map_err(ActionError::remote_write)?;
        let key = self
            .datastore
            .push(&self.options.uploads_collection, body)
            .await
            .map_err(ActionError::remote_write)?;
        Ok(UploadId(key))
    }

    async fn store_upload_blob(
        &self,
        id: &UploadId,
        blob: &ImageBlob,
    ) -> Result<StoredObject, ActionError> {
        let path = self.options.storage_path_policy.object_path(
            &self.options.uploads_collection,
            id,
            blob,
        );
        self.storage
            .put(&path, blob)
            .await
            .map_err(ActionError::storage)
    }

    async fn patch_image_url(&self, id: &UploadId, image_url: &str) -> Result<(), ActionError> {
        let patch = serde_json::to_value(ImageUrlPatch {
            image_url: image_url.to_string(),
        })
        .map_err(ActionError::remote_write)?;
        self.datastore
            .update(&self.options.uploads_collection, id.as_str(), patch)
            .await
            .map_err(ActionError::remote_write)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<User, ActionError> {
        self.authenticate(AuthMode::SignUp, email, password).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, ActionError> {
        self.authenticate(AuthMode::SignIn, email, password).await
    }

    async fn authenticate(
        &self,
        mode: AuthMode,
        email: &str,
        password: &str,
    ) -> Result<User, ActionError> {
        self.commit(Mutation::SetLoading(true)).await;
        self.commit(Mutation::ClearError).await;

        let result = match mode {
            AuthMode::SignUp => {
                self.auth
                    .create_user_with_email_and_password(email, password)
                    .await
            }
            AuthMode::SignIn => {
                self.auth
                    .sign_in_with_email_and_password(email, password)
                    .await
            }
        };

        match result {
            Ok(auth_user) => {
                self.commit(Mutation::SetLoading(false)).await;
                let user = User::new(auth_user.uid);
                self.commit(Mutation::SetUser(Some(user.clone()))).await;
                info!("auth: {mode} succeeded user_id={}", user.id);
                Ok(user)
            }
            Err(err) => {
                let err = ActionError::auth(err);
                self.commit(Mutation::SetLoading(false)).await;
                self.commit(Mutation::SetError(err.clone())).await;
                error!("auth: {mode} failed: {err}");
                Err(err)
            }
        }
    }

    /// Restores a session from a uid the auth provider already vouched for.
    pub async fn auto_sign_in(&self, uid: impl Into<UserId>) {
        self.commit(Mutation::SetUser(Some(User::new(uid)))).await;
    }

    /// Clears the local user immediately; the remote sign-out runs detached.
    ///
    /// The detached call is not ordered against later actions, so a sign-in
    /// issued right after `logout` can have its new session dropped by it.
    pub async fn logout(&self) {
        let auth = Arc::clone(&self.auth);
        tokio::spawn(async move {
            if let Err(err) = auth.sign_out().await {
                warn!("auth: sign-out failed: {err:#}");
            }
        });
        self.commit(Mutation::SetUser(None)).await;
    }

    pub async fn clear_error(&self) {
        self.commit(Mutation::ClearError).await;
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.clone()
    }

    pub async fn all_uploads(&self) -> Vec<UploadRecord> {
        self.state.read().await.all_uploads().to_vec()
    }

    pub async fn featured_uploads(&self) -> Vec<UploadRecord> {
        self.state.read().await.featured_uploads().to_vec()
    }

    pub async fn upload_by_id(&self, id: &UploadId) -> Option<UploadRecord> {
        self.state.read().await.upload_by_id(id).cloned()
    }

    pub async fn current_user(&self) -> Option<User> {
        self.state.read().await.current_user().cloned()
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.is_loading()
    }

    pub async fn current_error(&self) -> Option<ActionError> {
        self.state.read().await.current_error().cloned()
    }
}

/// Turns a keyed collection into records, in the map's iteration order.
///
/// A record that does not decode is skipped with a warning; the rest of the
/// listing still lands.
fn records_from_collection(collection: Value) -> anyhow::Result<Vec<UploadRecord>> {
    let entries = match collection {
        Value::Null => return Ok(Vec::new()),
        Value::Object(entries) => entries,
        _ => return Err(anyhow!("upload collection is not a keyed object")),
    };

    Ok(entries
        .into_iter()
        .filter_map(|(key, body)| match decode_record(&key, body) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("uploads: skipping record {key}: {err:#}");
                None
            }
        })
        .collect())
}

fn decode_record(key: &str, body: Value) -> anyhow::Result<UploadRecord> {
    let body: UploadBody = serde_json::from_value(body).context("malformed body")?;
    body.into_record(UploadId::from(key)).context("invalid date")
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
