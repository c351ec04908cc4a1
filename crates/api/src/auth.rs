// crates/api/src/auth.rs
//! Client for the authentication surface: credentials, token
//! validation, and the per-provider authorization handles.

use mailshift_types::{Provider, ProviderTokens};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ensure_success, Ack, ApiError};

/// Outcome of login and signup. `success == false` carries the reason
/// in `message`; it is not a transport error.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenValidation {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SignupRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base: String,
}

impl AuthClient {
    pub fn new(http: reqwest::Client, base: impl AsRef<str>) -> Self {
        Self {
            http,
            base: base.as_ref().trim_end_matches('/').to_string(),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        debug!(%email, "sending login request");
        let response = self
            .http
            .post(format!("{}/api/auth/login", self.base))
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        ensure_success(response)
            .await?
            .json()
            .await
            .map_err(ApiError::from_reqwest)
    }

    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        debug!(%email, "sending signup request");
        let response = self
            .http
            .post(format!("{}/api/auth/signup", self.base))
            .json(&SignupRequest {
                name,
                email,
                password,
            })
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        ensure_success(response)
            .await?
            .json()
            .await
            .map_err(ApiError::from_reqwest)
    }

    pub async fn validate_token(&self, token: &str) -> Result<TokenValidation, ApiError> {
        let response = self
            .http
            .post(format!("{}/api/auth/validate-token", self.base))
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        ensure_success(response)
            .await?
            .json()
            .await
            .map_err(ApiError::from_reqwest)
    }

    /// Fetch both provider authorization slots for a user.
    pub async fn user_tokens(
        &self,
        token: &str,
        user_id: &str,
    ) -> Result<ProviderTokens, ApiError> {
        let response = self
            .http
            .get(format!("{}/api/oauth/tokens/{user_id}", self.base))
            .bearer_auth(token)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        ensure_success(response)
            .await?
            .json()
            .await
            .map_err(ApiError::from_reqwest)
    }

    pub async fn disconnect_provider(
        &self,
        token: &str,
        user_id: &str,
        provider: Provider,
    ) -> Result<Ack, ApiError> {
        let response = self
            .http
            .delete(format!(
                "{}/api/oauth/tokens/{user_id}?service={provider}",
                self.base
            ))
            .bearer_auth(token)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        ensure_success(response)
            .await?
            .json()
            .await
            .map_err(ApiError::from_reqwest)
    }

    /// Consent page for a provider; completed out-of-band in a browser.
    pub fn authorize_url(&self, user_id: &str, provider: Provider) -> String {
        format!("{}/callback/auth/{provider}?userId={user_id}", self.base)
    }

    /// Best-effort backend reachability probe.
    pub async fn health(&self) -> bool {
        match self
            .http
            .get(format!("{}/api/health", self.base))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn client(server: &mockito::ServerGuard) -> AuthClient {
        AuthClient::new(reqwest::Client::new(), server.url())
    }

    #[tokio::test]
    async fn test_login_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/auth/login")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "email": "ana@example.com",
                "password": "hunter22",
            })))
            .with_status(200)
            .with_body(r#"{"success":true,"token":"jwt-1","userId":"u-1","name":"Ana"}"#)
            .create_async()
            .await;

        let response = client(&server)
            .login("ana@example.com", "hunter22")
            .await
            .unwrap();
        mock.assert_async().await;
        assert!(response.success);
        assert_eq!(response.token.as_deref(), Some("jwt-1"));
        assert_eq!(response.user_id.as_deref(), Some("u-1"));
    }

    #[tokio::test]
    async fn test_login_rejection_carries_server_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/auth/login")
            .with_status(401)
            .with_body(r#"{"message":"Invalid credentials"}"#)
            .create_async()
            .await;

        let err = client(&server)
            .login("ana@example.com", "wrong")
            .await
            .unwrap_err();
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid credentials");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_user_tokens_sends_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/oauth/tokens/u-1")
            .match_header("authorization", "Bearer jwt-1")
            .with_status(200)
            .with_body(r#"{"outlook":{"accessToken":"o-1"},"gmail":null}"#)
            .create_async()
            .await;

        let tokens = client(&server).user_tokens("jwt-1", "u-1").await.unwrap();
        mock.assert_async().await;
        assert_eq!(tokens.outlook.unwrap().access_token, "o-1");
        assert!(tokens.gmail.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_provider() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/api/oauth/tokens/u-1?service=gmail")
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .create_async()
            .await;

        let ack = client(&server)
            .disconnect_provider("jwt-1", "u-1", Provider::Gmail)
            .await
            .unwrap();
        mock.assert_async().await;
        assert!(ack.success);
    }

    #[tokio::test]
    async fn test_health_down_is_false() {
        let client = AuthClient::new(reqwest::Client::new(), "http://127.0.0.1:1");
        assert!(!client.health().await);
    }

    #[test]
    fn test_authorize_url() {
        let client = AuthClient::new(reqwest::Client::new(), "http://localhost:8081/");
        assert_eq!(
            client.authorize_url("u-1", Provider::Outlook),
            "http://localhost:8081/callback/auth/outlook?userId=u-1"
        );
    }
}
