use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use shared::domain::ImageBlob;
use tracing::debug;
use upload_store::{ObjectStorage, StoredObject};
use url::Url;

use crate::{endpoint, error_for_response, FirebaseRestBackend};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    name: String,
    #[serde(default)]
    download_tokens: Option<String>,
}

impl FirebaseRestBackend {
    /// `{storage_url}/v0/b/{bucket}/o[/{object}]`; the object path is a single
    /// encoded segment.
    fn storage_endpoint(&self, object_path: Option<&str>) -> Result<Url> {
        let mut segments = vec!["v0", "b", self.config.storage_bucket.as_str(), "o"];
        segments.extend(object_path);
        endpoint(&self.config.storage_url, segments.as_slice())
    }
}

/// Servers may hand back several comma-separated tokens; any one works.
fn first_token(tokens: Option<String>) -> Option<String> {
    tokens?
        .split(',')
        .map(str::trim)
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl ObjectStorage for FirebaseRestBackend {
    async fn put(&self, path: &str, blob: &ImageBlob) -> Result<StoredObject> {
        let mut url = self.storage_endpoint(None)?;
        url.query_pairs_mut().append_pair("name", path);

        let content_type = blob
            .content_type
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(blob.bytes.clone());
        let response = self
            .authorize(request)
            .await
            .send()
            .await
            .context("storage upload request failed")?;
        let metadata: ObjectMetadata = error_for_response("storage upload", response)
            .await?
            .json()
            .await
            .context("invalid storage upload response")?;

        debug!(
            "storage: stored path={} size_bytes={}",
            metadata.name,
            blob.bytes.len()
        );
        Ok(StoredObject {
            path: metadata.name,
            download_token: first_token(metadata.download_tokens),
        })
    }

    async fn download_url(&self, object: &StoredObject) -> Result<String> {
        let url = self.storage_endpoint(Some(object.path.as_str()))?;
        let response = self
            .authorize(self.http.get(url.clone()))
            .await
            .send()
            .await
            .context("storage metadata request failed")?;
        let metadata: ObjectMetadata = error_for_response("storage metadata", response)
            .await?
            .json()
            .await
            .context("invalid storage metadata response")?;

        let token = first_token(metadata.download_tokens)
            .or_else(|| object.download_token.clone())
            .ok_or_else(|| anyhow!("object {} has no download token", object.path))?;

        let mut download = url;
        download
            .query_pairs_mut()
            .append_pair("alt", "media")
            .append_pair("token", &token);
        Ok(download.to_string())
    }
}
