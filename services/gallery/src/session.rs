//! Session values and the identity provider boundary.
//!
//! A [`Session`] is established by signing in and handed explicitly to every
//! catalog call; signing out consumes it.

use crate::config::AuthConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Errors raised by sign-in and session handling
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Unsupported OAuth provider: {0}")]
    UnsupportedProvider(String),

    #[error("Guest sign-in is disabled")]
    DevLoginDisabled,

    #[error("Missing or malformed bearer token")]
    MissingToken,

    #[error("Session is no longer valid")]
    Unauthorized,

    #[error("Identity provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Identity request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Request(e.to_string())
    }
}

/// Authenticated session of one user
#[derive(Clone, PartialEq)]
pub struct Session {
    pub user_id: Uuid,
    pub access_token: String,
    pub email: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

// Keep tokens out of logs
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// OAuth providers users can sign in with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Github,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Github => "github",
        }
    }
}

impl FromStr for OAuthProvider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(OAuthProvider::Github),
            other => Err(AuthError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Identity provider boundary
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Email a one-time sign-in link
    async fn send_magic_link(&self, email: &str) -> Result<(), AuthError>;

    /// URL the browser is redirected to for OAuth sign-in
    fn oauth_url(&self, provider: OAuthProvider) -> Result<String, AuthError>;

    /// Sign in with the fixed guest credentials (development only)
    async fn sign_in_as_guest(&self) -> Result<Session, AuthError>;

    /// Resolve a bearer token into a session
    async fn session_for_token(&self, token: &str) -> Result<Session, AuthError>;

    /// Invalidate the session
    async fn sign_out(&self, session: Session) -> Result<(), AuthError>;
}

/// Basic shape check done before talking to the provider
pub fn validate_email(email: &str) -> Result<&str, AuthError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AuthError::InvalidEmail(email.to_string())),
    }
}

/// Extract the token from an `Authorization: Bearer ...` header value
pub fn bearer_token(header: &str) -> Result<&str, AuthError> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: Uuid,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    user: UserResponse,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        Session {
            user_id: self.user.id,
            access_token: self.access_token,
            email: self.user.email,
            expires_at: self
                .expires_in
                .map(|secs| now + chrono::Duration::seconds(secs)),
        }
    }
}

/// GoTrue-compatible identity provider reached over HTTP
pub struct HttpIdentity {
    client: Client,
    base_url: Url,
    config: AuthConfig,
}

impl HttpIdentity {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| AuthError::Request(format!("invalid identity url: {e}")))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        info!(url = %base_url, dev_login = config.dev_login, "Identity provider configured");

        Ok(Self {
            client,
            base_url,
            config: config.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.base_url
            .join(path)
            .map_err(|e| AuthError::Request(e.to_string()))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, AuthError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::Unauthorized);
        }
        let message = response.text().await.unwrap_or_default();
        Err(AuthError::Provider {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentity {
    #[instrument(skip(self))]
    async fn send_magic_link(&self, email: &str) -> Result<(), AuthError> {
        let email = validate_email(email)?;

        let response = self
            .client
            .post(self.endpoint("auth/v1/otp")?)
            .header("apikey", &self.config.anon_key)
            .json(&serde_json::json!({ "email": email, "create_user": true }))
            .send()
            .await?;
        Self::check(response).await?;

        info!("Magic link sent");
        Ok(())
    }

    fn oauth_url(&self, provider: OAuthProvider) -> Result<String, AuthError> {
        let mut url = self.endpoint("auth/v1/authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", &self.config.redirect_to);
        Ok(url.into())
    }

    #[instrument(skip(self))]
    async fn sign_in_as_guest(&self) -> Result<Session, AuthError> {
        if !self.config.dev_login {
            warn!("Guest sign-in attempted while disabled");
            return Err(AuthError::DevLoginDisabled);
        }

        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self
            .client
            .post(url)
            .header("apikey", &self.config.anon_key)
            .json(&serde_json::json!({
                "email": self.config.guest_email,
                "password": self.config.guest_password,
            }))
            .send()
            .await?;
        let token: TokenResponse = Self::check(response).await?.json().await?;
        let session = token.into_session(Utc::now());

        info!(user_id = %session.user_id, "Signed in as guest");
        Ok(session)
    }

    async fn session_for_token(&self, token: &str) -> Result<Session, AuthError> {
        let response = self
            .client
            .get(self.endpoint("auth/v1/user")?)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token)
            .send()
            .await?;
        let user: UserResponse = Self::check(response).await?.json().await?;

        debug!(user_id = %user.id, "Resolved session");

        Ok(Session {
            user_id: user.id,
            access_token: token.to_string(),
            email: user.email,
            expires_at: None,
        })
    }

    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    async fn sign_out(&self, session: Session) -> Result<(), AuthError> {
        let response = self
            .client
            .post(self.endpoint("auth/v1/logout")?)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await?;
        Self::check(response).await?;

        info!("Signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn auth_config(dev_login: bool) -> AuthConfig {
        AuthConfig {
            url: "https://auth.example.com".to_string(),
            anon_key: "anon".to_string(),
            redirect_to: "https://pika.example.com".to_string(),
            dev_login,
            guest_email: "guest@example.com".to_string(),
            guest_password: "guestpassword123".to_string(),
            request_timeout_secs: 5,
        }
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email(" ana@example.com ").unwrap(), "ana@example.com");
        assert!(matches!(validate_email("ana"), Err(AuthError::InvalidEmail(_))));
        assert!(matches!(validate_email("@example.com"), Err(AuthError::InvalidEmail(_))));
        assert!(matches!(validate_email("ana@localhost"), Err(AuthError::InvalidEmail(_))));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def").unwrap(), "abc.def");
        assert!(matches!(bearer_token("Basic abc"), Err(AuthError::MissingToken)));
        assert!(matches!(bearer_token("Bearer  "), Err(AuthError::MissingToken)));
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("GitHub".parse::<OAuthProvider>().unwrap(), OAuthProvider::Github);
        assert!(matches!(
            "myspace".parse::<OAuthProvider>(),
            Err(AuthError::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn test_oauth_url_carries_redirect() {
        let identity = HttpIdentity::new(&auth_config(false)).unwrap();
        let url = identity.oauth_url(OAuthProvider::Github).unwrap();

        assert!(url.starts_with("https://auth.example.com/auth/v1/authorize?"));
        assert!(url.contains("provider=github"));
        assert!(url.contains("redirect_to=https%3A%2F%2Fpika.example.com"));
    }

    #[tokio::test]
    async fn test_guest_sign_in_disabled_without_request() {
        let identity = HttpIdentity::new(&auth_config(false)).unwrap();

        assert!(matches!(
            identity.sign_in_as_guest().await,
            Err(AuthError::DevLoginDisabled)
        ));
    }

    #[tokio::test]
    async fn test_magic_link_rejects_bad_email_without_request() {
        let identity = HttpIdentity::new(&auth_config(false)).unwrap();

        assert!(matches!(
            identity.send_magic_link("not-an-email").await,
            Err(AuthError::InvalidEmail(_))
        ));
    }

    #[test]
    fn test_token_response_into_session() {
        let raw = r#"{
            "access_token": "tok",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "ref",
            "user": { "id": "550e8400-e29b-41d4-a716-446655440000", "email": "guest@example.com" }
        }"#;
        let token: TokenResponse = serde_json::from_str(raw).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let session = token.into_session(now);

        assert_eq!(session.access_token, "tok");
        assert_eq!(session.email.as_deref(), Some("guest@example.com"));
        assert!(!session.is_expired(now));
        assert!(session.is_expired(now + chrono::Duration::hours(1)));
        assert!(!format!("{:?}", session).contains("tok"));
    }
}
