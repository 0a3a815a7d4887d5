use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use upload_store::Datastore;
use url::Url;

use crate::{endpoint, error_for_response, FirebaseRestBackend};

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

impl FirebaseRestBackend {
    /// `{database_url}/{path}.json`, with the id token as `auth` when signed in.
    async fn database_endpoint(&self, path: &str) -> Result<Url> {
        let mut segments: Vec<String> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        let last = segments
            .last_mut()
            .ok_or_else(|| anyhow!("empty database path"))?;
        last.push_str(".json");

        let mut url = endpoint(&self.config.database_url, segments.as_slice())?;
        if let Some(token) = self.id_token().await {
            url.query_pairs_mut().append_pair("auth", &token);
        }
        Ok(url)
    }
}

#[async_trait]
impl Datastore for FirebaseRestBackend {
    async fn push(&self, collection: &str, record: Value) -> Result<String> {
        let url = self.database_endpoint(collection).await?;
        let response = self
            .http
            .post(url)
            .json(&record)
            .send()
            .await
            .context("database push request failed")?;
        let body: PushResponse = error_for_response("database push", response)
            .await?
            .json()
            .await
            .context("invalid database push response")?;
        debug!("database: pushed collection={collection} key={}", body.name);
        Ok(body.name)
    }

    async fn update(&self, collection: &str, key: &str, fields: Value) -> Result<()> {
        let url = self
            .database_endpoint(&format!("{collection}/{key}"))
            .await?;
        let response = self
            .http
            .patch(url)
            .json(&fields)
            .send()
            .await
            .context("database update request failed")?;
        error_for_response("database update", response).await?;
        debug!("database: updated collection={collection} key={key}");
        Ok(())
    }

    async fn read_once(&self, collection: &str) -> Result<Value> {
        let url = self.database_endpoint(collection).await?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .context("database read request failed")?;
        error_for_response("database read", response)
            .await?
            .json()
            .await
            .context("invalid database read response")
    }
}
