//! API client for the marketplace identity service.
//!
//! This module provides the `ApiClient` struct for logging in, refreshing
//! the access credential from the session cookie, and managing the
//! authenticated user's profile.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::{Client, RequestBuilder, Url};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use tracing::debug;

use super::{ApiError, RefreshError};
use crate::auth::{AccessToken, IdentityBackend};
use crate::config::Config;
use crate::models::{ProfileUpdate, Role, UserProfile};

// ============================================================================
// Constants
// ============================================================================

const LOGIN_PATH: &str = "/api/auth/login/";
const REGISTER_PATH: &str = "/api/auth/register/";
const REFRESH_PATH: &str = "/api/auth/token/refresh/";
const PROFILE_PATH: &str = "/api/auth/profile/";
const VERIFY_EMAIL_PATH: &str = "/api/auth/verify-email/";
const RESEND_VERIFICATION_PATH: &str = "/api/auth/resend-verification/";
const LOGOUT_PATH: &str = "/api/auth/logout/";
const ACCOUNT_PATH: &str = "/api/auth/account/";

/// httpOnly cookie holding the long-lived session
const SESSION_COOKIE: &str = "refresh_token";

/// Places a refresh response may carry the new credential, in order of preference.
const ACCESS_TOKEN_POINTERS: [&str; 3] = ["/access", "/data/access", "/data/tokens/access"];

/// Successful login or registration.
#[derive(Debug, Clone)]
pub struct AuthGrant {
    pub credential: AccessToken,
    pub user: UserProfile,
}

/// API client for the identity service.
/// Clone is cheap - reqwest::Client and the cookie jar are reference counted.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    jar: Arc<Jar>,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client with its own cookie jar
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = Url::parse(config.base_url())
            .with_context(|| format!("Invalid API base URL: {}", config.api_base_url))?;
        let jar = Arc::new(Jar::default());

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .cookie_provider(Arc::clone(&jar))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            jar,
            base_url,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    fn authorized(builder: RequestBuilder, credential: Option<AccessToken>) -> RequestBuilder {
        match credential {
            Some(token) => builder.bearer_auth(token.as_str()),
            None => builder,
        }
    }

    // ===== Session =====

    /// Exchange email and password for a credential; the service also sets
    /// the session cookie.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, ApiError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let grant: GrantData = Self::send(self.client.post(self.url(LOGIN_PATH)).json(&body))
            .await
            .map_err(credentials_rejected)?;
        grant.into_grant()
    }

    pub async fn register(&self, email: &str, password: &str, role: Role) -> Result<AuthGrant, ApiError> {
        let body = serde_json::json!({ "email": email, "password": password, "role": role });
        let grant: GrantData = Self::send(self.client.post(self.url(REGISTER_PATH)).json(&body))
            .await
            .map_err(credentials_rejected)?;
        grant.into_grant()
    }

    /// Obtain a new access credential using the session cookie.
    ///
    /// A success response without a credential is reported as
    /// `SessionExpired(MissingCredential)`.
    pub async fn refresh_credential(&self) -> Result<AccessToken, ApiError> {
        let request = self.client.post(self.url(REFRESH_PATH)).json(&serde_json::json!({}));
        let body = Self::send_raw(request).await?;
        let value: Value = serde_json::from_str(&body).unwrap_or(Value::Null);

        ACCESS_TOKEN_POINTERS
            .iter()
            .find_map(|pointer| value.pointer(pointer).and_then(Value::as_str))
            .filter(|token| !token.is_empty())
            .map(AccessToken::new)
            .ok_or(ApiError::SessionExpired(RefreshError::MissingCredential))
    }

    pub async fn logout(&self, credential: Option<AccessToken>) -> Result<(), ApiError> {
        let request = Self::authorized(self.client.post(self.url(LOGOUT_PATH)), credential);
        Self::send_raw(request).await.map(|_| ())
    }

    /// Drop the session cookie from this client's jar
    pub fn expire_session_cookie(&self) {
        let expired = format!("{}=; Max-Age=0; Path=/", SESSION_COOKIE);
        self.jar.add_cookie_str(&expired, &self.base_url);
        debug!("Session cookie expired");
    }

    // ===== Profile =====

    pub async fn get_profile(&self, credential: Option<AccessToken>) -> Result<UserProfile, ApiError> {
        Self::send(Self::authorized(self.client.get(self.url(PROFILE_PATH)), credential)).await
    }

    pub async fn update_profile(
        &self,
        credential: Option<AccessToken>,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, ApiError> {
        let request = Self::authorized(self.client.patch(self.url(PROFILE_PATH)), credential).json(update);
        Self::send(request).await
    }

    pub async fn verify_email(&self, credential: Option<AccessToken>, code: &str) -> Result<(), ApiError> {
        let request = Self::authorized(self.client.post(self.url(VERIFY_EMAIL_PATH)), credential)
            .json(&serde_json::json!({ "code": code }));
        Self::send_raw(request).await.map(|_| ())
    }

    pub async fn resend_verification(&self, credential: Option<AccessToken>) -> Result<(), ApiError> {
        let request = Self::authorized(self.client.post(self.url(RESEND_VERIFICATION_PATH)), credential);
        Self::send_raw(request).await.map(|_| ())
    }

    pub async fn delete_account(&self, credential: Option<AccessToken>) -> Result<(), ApiError> {
        let request = Self::authorized(self.client.delete(self.url(ACCOUNT_PATH)), credential);
        Self::send_raw(request).await.map(|_| ())
    }

    // ===== Transport =====

    /// Send a request and return the body of a successful response.
    /// Non-success statuses and `{"status": "error"}` envelopes become errors.
    async fn send_raw(request: RequestBuilder) -> Result<String, ApiError> {
        let response = request.send().await.map_err(ApiError::from_transport)?;
        let status = response.status();
        let body = response.text().await.map_err(ApiError::from_transport)?;

        if !status.is_success() {
            debug!(%status, "Identity service returned an error status");
            return Err(ApiError::from_status(status, &error_message(&body)));
        }

        if let Ok(envelope) = serde_json::from_str::<Envelope<Value>>(&body) {
            if envelope.status == EnvelopeStatus::Error {
                return Err(ApiError::Validation(
                    envelope.error.as_ref().map(describe_error).unwrap_or_default(),
                ));
            }
        }
        Ok(body)
    }

    /// Send a request and unwrap the envelope's `data`
    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
        let body = Self::send_raw(request).await?;
        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))?;
        envelope
            .data
            .ok_or_else(|| ApiError::InvalidResponse("Response envelope carried no data".to_string()))
    }
}

#[async_trait]
impl IdentityBackend for ApiClient {
    async fn refresh(&self) -> Result<AccessToken, RefreshError> {
        self.refresh_credential().await.map_err(|e| RefreshError::from(&e))
    }

    async fn fetch_profile(&self, credential: &AccessToken) -> Result<UserProfile, ApiError> {
        self.get_profile(Some(credential.clone())).await
    }
}

/// A 401 from login or registration is about the submitted email/password,
/// not an expired credential.
fn credentials_rejected(err: ApiError) -> ApiError {
    match err {
        ApiError::Unauthorized => ApiError::InvalidCredentials,
        other => other,
    }
}

/// Pull a human-readable message out of an error response body
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => value
            .get("error")
            .filter(|e| !e.is_null())
            .or_else(|| value.get("detail"))
            .map(describe_error)
            .unwrap_or_else(|| body.to_string()),
        Err(_) => body.to_string(),
    }
}

/// Flatten an envelope `error`: either a plain message or a map of field
/// names to message lists.
fn describe_error(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(describe_error).collect::<Vec<_>>().join(", "),
        Value::Object(fields) => fields
            .iter()
            .map(|(field, messages)| match field.as_str() {
                "non_field_errors" | "detail" => describe_error(messages),
                _ => format!("{}: {}", field, describe_error(messages)),
            })
            .collect::<Vec<_>>()
            .join("; "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// Wire types - internal only

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum EnvelopeStatus {
    Success,
    Error,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: EnvelopeStatus,
    #[serde(default = "Option::default")]
    data: Option<T>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GrantData {
    user: UserProfile,
    #[serde(default)]
    tokens: Option<GrantTokens>,
}

#[derive(Debug, Deserialize)]
struct GrantTokens {
    #[serde(default)]
    access: Option<String>,
}

impl GrantData {
    fn into_grant(self) -> Result<AuthGrant, ApiError> {
        let access = self
            .tokens
            .and_then(|t| t.access)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("Login response carried no access token".to_string()))?;
        Ok(AuthGrant {
            credential: AccessToken::new(access),
            user: self.user,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::testutil::{can_bind_localhost, test_api_client};

    fn user_json() -> Value {
        json!({"id": "u-1", "email": "ann@example.com", "role": "client", "email_verified": true})
    }

    fn grant_json(access: &str) -> Value {
        json!({"status": "success", "data": {"user": user_json(), "tokens": {"access": access}}, "error": null})
    }

    #[test]
    fn test_describe_error_flattens_validation_map() {
        let error = json!({"email": ["Email already exists"], "password": ["Too short", "Too common"]});
        assert_eq!(
            describe_error(&error),
            "email: Email already exists; password: Too short, Too common"
        );
        assert_eq!(describe_error(&json!("Invalid credentials")), "Invalid credentials");
        assert_eq!(describe_error(&json!({"non_field_errors": ["Nope"]})), "Nope");
    }

    #[test]
    fn test_error_message_falls_back_to_detail_then_body() {
        assert_eq!(
            error_message(r#"{"status":"error","error":"Invalid credentials","data":null}"#),
            "Invalid credentials"
        );
        assert_eq!(
            error_message(r#"{"detail":"Request was throttled. Expected available in 42 seconds."}"#),
            "Request was throttled. Expected available in 42 seconds."
        );
        assert_eq!(error_message("<html>Bad Gateway</html>"), "<html>Bad Gateway</html>");
    }

    #[test]
    fn test_grant_without_access_token_is_invalid() {
        let grant: GrantData = serde_json::from_value(json!({"user": user_json()})).unwrap();
        assert!(matches!(grant.into_grant(), Err(ApiError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_login_returns_grant() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(body_json(json!({"email": "ann@example.com", "password": "hunter22"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(grant_json("access-1")))
            .expect(1)
            .mount(&server)
            .await;

        let api = test_api_client(&server.uri());
        let grant = api.login("ann@example.com", "hunter22").await.unwrap();
        assert_eq!(grant.credential, AccessToken::new("access-1"));
        assert!(grant.user.email_verified);
    }

    #[tokio::test]
    async fn test_bad_login_is_invalid_credentials() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                json!({"status": "error", "error": "Invalid credentials", "data": null}),
            ))
            .mount(&server)
            .await;

        let api = test_api_client(&server.uri());
        let err = api.login("ann@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidCredentials));
        assert!(!err.is_unauthorized());
        assert_eq!(err.user_message(), "Invalid email or password");
    }

    #[tokio::test]
    async fn test_register_validation_error_is_verbatim() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REGISTER_PATH))
            .and(body_json(json!({"email": "ann@example.com", "password": "hunter22", "role": "worker"})))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                json!({"status": "error", "error": {"email": ["Email already exists"]}, "data": null}),
            ))
            .mount(&server)
            .await;

        let api = test_api_client(&server.uri());
        let err = api.register("ann@example.com", "hunter22", Role::Worker).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(ref m) if m == "email: Email already exists"));
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_message() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(429).set_body_json(
                json!({"detail": "Request was throttled. Expected available in 60 seconds."}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let api = test_api_client(&server.uri());
        let err = api.login("ann@example.com", "hunter22").await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited(ref m) if m.contains("throttled")));
    }

    #[tokio::test]
    async fn test_refresh_accepts_bare_and_enveloped_credentials() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        for body in [json!({"access": "bare"}), json!({"status": "success", "data": {"access": "bare"}})] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path(REFRESH_PATH))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .mount(&server)
                .await;

            let api = test_api_client(&server.uri());
            assert_eq!(api.refresh_credential().await.unwrap(), AccessToken::new("bare"));
        }
    }

    #[tokio::test]
    async fn test_refresh_without_credential_field_fails() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success", "data": {}})))
            .mount(&server)
            .await;

        let api = test_api_client(&server.uri());
        assert_eq!(
            IdentityBackend::refresh(&api).await,
            Err(RefreshError::MissingCredential)
        );
    }

    #[tokio::test]
    async fn test_refresh_without_session_is_rejected() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                json!({"status": "error", "error": "Refresh token not found", "data": null}),
            ))
            .mount(&server)
            .await;

        let api = test_api_client(&server.uri());
        assert_eq!(IdentityBackend::refresh(&api).await, Err(RefreshError::Rejected));
    }

    #[tokio::test]
    async fn test_session_cookie_from_login_is_sent_on_refresh() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "refresh_token=long-lived; HttpOnly; Path=/; SameSite=Lax")
                    .set_body_json(grant_json("access-1")),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .and(header("cookie", "refresh_token=long-lived"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "access-2"})))
            .expect(1)
            .mount(&server)
            .await;

        let api = test_api_client(&server.uri());
        api.login("ann@example.com", "hunter22").await.unwrap();
        assert_eq!(api.refresh_credential().await.unwrap(), AccessToken::new("access-2"));
    }

    #[tokio::test]
    async fn test_profile_request_carries_bearer_token() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROFILE_PATH))
            .and(header("authorization", "Bearer access-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "success", "data": user_json()})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = test_api_client(&server.uri());
        let user = api.get_profile(Some(AccessToken::new("access-1"))).await.unwrap();
        assert_eq!(user.email, "ann@example.com");
    }
}
