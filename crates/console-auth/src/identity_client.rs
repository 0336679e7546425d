//! Identity service transport.
//!
//! `IdentityService` is the seam between the session lifecycle and the
//! network; `HttpIdentityClient` is the production implementation.

use crate::{Credential, Profile, ProfileUpdate};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const FALLBACK_LOGIN_DETAIL: &str = "Login failed";

/// Transport-level failure talking to the identity service.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// HTTP 401: the service refused the credentials or the bearer token.
    #[error("{detail}")]
    Unauthorized { detail: String },

    /// Any other non-success status.
    #[error("HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    /// Connection, TLS or body-transfer failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// 2xx with a body that does not match the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The request did not complete before its deadline
    #[error("Request timed out")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl IdentityError {
    /// True when the server has definitively refused the credential.
    pub fn is_rejection(&self) -> bool {
        matches!(self, IdentityError::Unauthorized { .. })
    }

    /// True when the same request may succeed if retried.
    pub fn is_transient(&self) -> bool {
        !self.is_rejection() && !matches!(self, IdentityError::InvalidUrl(_))
    }

    /// Human-readable message suitable for showing next to a form field.
    pub fn detail(&self) -> String {
        match self {
            IdentityError::Unauthorized { detail } | IdentityError::Status { detail, .. } => {
                detail.clone()
            }
            other => other.to_string(),
        }
    }
}

pub type IdentityResult<T> = Result<T, IdentityError>;

/// Successful `POST /login` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginGrant {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Remote identity service operations used by the session lifecycle.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// `POST /login`
    async fn login(&self, username: &str, password: &str) -> IdentityResult<LoginGrant>;

    /// `GET /me`
    async fn fetch_profile(&self, credential: &Credential) -> IdentityResult<Profile>;

    /// `PUT /me`
    async fn update_profile(
        &self,
        credential: &Credential,
        update: &ProfileUpdate,
    ) -> IdentityResult<Profile>;

    /// `POST /logout`; callers treat failures as advisory.
    async fn logout(&self, credential: &Credential) -> IdentityResult<()>;
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Error payloads carry `detail` as a string, or as a list of validation errors.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Value>,
}

/// reqwest-backed identity client.
#[derive(Clone)]
pub struct HttpIdentityClient {
    http_client: Client,
    api_url: String,
}

impl HttpIdentityClient {
    /// Create a client for the service rooted at `api_url`
    /// (e.g. `https://dash.example.com/api/auth`).
    pub fn new(api_url: &str) -> IdentityResult<Self> {
        Self::with_client(Client::new(), api_url)
    }

    pub fn with_client(http_client: Client, api_url: &str) -> IdentityResult<Self> {
        let parsed = Url::parse(api_url)?;
        Ok(Self {
            http_client,
            api_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }

    async fn read_profile(response: Response) -> IdentityResult<Profile> {
        let response = Self::check_status(response, None).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| IdentityError::MalformedResponse(e.to_string()))
    }

    /// Map a non-2xx response to an error. The server `detail` wins; otherwise
    /// `fallback`, otherwise the status reason phrase.
    async fn check_status(response: Response, fallback: Option<&str>) -> IdentityResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = extract_detail(&body)
            .or_else(|| fallback.map(str::to_string))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());
        debug!(status = %status, detail = %detail, "Identity service returned an error");

        if status == StatusCode::UNAUTHORIZED {
            Err(IdentityError::Unauthorized { detail })
        } else {
            Err(IdentityError::Status {
                status: status.as_u16(),
                detail,
            })
        }
    }
}

fn extract_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail? {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Array(items) => items
            .iter()
            .find_map(|item| item.get("msg").and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

#[async_trait]
impl IdentityService for HttpIdentityClient {
    async fn login(&self, username: &str, password: &str) -> IdentityResult<LoginGrant> {
        let url = self.endpoint("login");
        debug!(url = %url, username = %username, "Attempting password login");

        let response = self
            .http_client
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let response = Self::check_status(response, Some(FALLBACK_LOGIN_DETAIL)).await?;

        let body = response.bytes().await?;
        let grant: LoginGrant = serde_json::from_slice(&body)
            .map_err(|e| IdentityError::MalformedResponse(e.to_string()))?;
        if grant.access_token.is_empty() {
            return Err(IdentityError::MalformedResponse(
                "login response carried an empty access_token".to_string(),
            ));
        }
        Ok(grant)
    }

    async fn fetch_profile(&self, credential: &Credential) -> IdentityResult<Profile> {
        let url = self.endpoint("me");
        debug!(url = %url, "Fetching profile");

        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, credential.bearer())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        Self::read_profile(response).await
    }

    async fn update_profile(
        &self,
        credential: &Credential,
        update: &ProfileUpdate,
    ) -> IdentityResult<Profile> {
        let url = self.endpoint("me");
        debug!(url = %url, "Updating profile");

        let response = self
            .http_client
            .put(&url)
            .header(reqwest::header::AUTHORIZATION, credential.bearer())
            .json(update)
            .send()
            .await?;

        Self::read_profile(response).await
    }

    async fn logout(&self, credential: &Credential) -> IdentityResult<()> {
        let url = self.endpoint("logout");

        let response = self
            .http_client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, credential.bearer())
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Logout notification was not accepted");
        }
        Ok(())
    }
}
