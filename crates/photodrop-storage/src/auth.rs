//! Google service-account authentication
//!
//! Signs an RS256 JWT assertion with the service account's private key
//! (optionally impersonating a workspace user via domain-wide delegation)
//! and exchanges it for an OAuth access token. Tokens are cached until
//! shortly before they expire.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::traits::{StorageError, StorageResult};

pub const DRIVE_SCOPES: &str =
    "https://www.googleapis.com/auth/drive https://www.googleapis.com/auth/drive.file";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The fields of a service-account key file this client needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub async fn from_file(path: &Path) -> StorageResult<Self> {
        let raw = tokio::fs::read(path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to read service account file {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_slice(&raw).map_err(|e| {
            StorageError::ConfigError(format!("Invalid service account file: {}", e))
        })
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS as u64
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Supplies bearer tokens for Drive requests.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> StorageResult<String>;
}

/// A fixed token, for tests and pre-issued credentials.
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> StorageResult<String> {
        Ok(self.0.clone())
    }
}

/// Access-token provider for a service account.
pub struct ServiceAccountAuth {
    http_client: reqwest::Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    subject: Option<String>,
    cache: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(
        http_client: reqwest::Client,
        key: ServiceAccountKey,
        subject: Option<String>,
    ) -> StorageResult<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| StorageError::ConfigError(format!("Invalid private key: {}", e)))?;

        Ok(Self {
            http_client,
            key,
            encoding_key,
            subject,
            cache: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// A valid bearer token, refreshed when close to expiry.
    pub async fn access_token(&self) -> StorageResult<String> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if Instant::now() + REFRESH_MARGIN < cached.expires_at {
                return Ok(cached.token.clone());
            }
        }

        let fresh = self.fetch_token().await?;
        let token = fresh.access_token.clone();
        *cache = Some(CachedToken {
            token: fresh.access_token,
            expires_at: Instant::now() + Duration::from_secs(fresh.expires_in),
        });
        tracing::debug!(
            client_email = %self.key.client_email,
            expires_in = fresh.expires_in,
            "Obtained Google access token"
        );
        Ok(token)
    }

    fn assertion(&self) -> StorageResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: DRIVE_SCOPES,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
            sub: self.subject.as_deref(),
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| StorageError::Auth(format!("Failed to sign assertion: {}", e)))
    }

    async fn fetch_token(&self) -> StorageResult<TokenResponse> {
        let assertion = self.assertion()?;
        let response = self
            .http_client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| StorageError::Network(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() || status.as_u16() == 429 {
                return Err(StorageError::Api(photodrop_core::ApiError::new(
                    "oauth",
                    status.as_u16(),
                    body,
                )));
            }
            return Err(StorageError::Auth(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| StorageError::InvalidResponse(format!("Invalid token response: {}", e)))
    }
}

#[async_trait]
impl AccessTokenSource for ServiceAccountAuth {
    async fn access_token(&self) -> StorageResult<String> {
        ServiceAccountAuth::access_token(self).await
    }
}
