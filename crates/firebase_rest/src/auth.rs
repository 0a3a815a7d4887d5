use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::protocol::AuthUser;
use tracing::info;
use upload_store::AuthService;

use crate::{endpoint, error_for_response, AuthSession, FirebaseRestBackend};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordAuthRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordAuthResponse {
    local_id: String,
    id_token: String,
}

impl FirebaseRestBackend {
    async fn password_auth(&self, method: &str, email: &str, password: &str) -> Result<AuthUser> {
        let action = format!("accounts:{method}");
        let mut url = endpoint(&self.config.auth_url, &["v1", action.as_str()])?;
        url.query_pairs_mut().append_pair("key", &self.config.api_key);

        let response = self
            .http
            .post(url)
            .json(&PasswordAuthRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?;
        let body: PasswordAuthResponse = error_for_response(method, response)
            .await?
            .json()
            .await
            .with_context(|| format!("invalid {method} response"))?;

        *self.session.write().await = Some(AuthSession {
            uid: body.local_id.clone(),
            id_token: body.id_token,
        });
        info!("auth: {method} uid={}", body.local_id);
        Ok(AuthUser { uid: body.local_id })
    }
}

#[async_trait]
impl AuthService for FirebaseRestBackend {
    async fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser> {
        self.password_auth("signUp", email, password).await
    }

    async fn sign_in_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthUser> {
        self.password_auth("signInWithPassword", email, password)
            .await
    }

    /// The REST API keeps no server-side session; dropping the token is enough.
    async fn sign_out(&self) -> Result<()> {
        *self.session.write().await = None;
        Ok(())
    }
}
