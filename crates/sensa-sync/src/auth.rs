//! # Collector Authentication
//!
//! Obtains and caches the bearer token presented on every upload.
//!
//! ## Authentication Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Collector Authentication Flow                      │
//! │                                                                         │
//! │  ┌────────────────┐                          ┌─────────────────┐       │
//! │  │  SyncEngine    │                          │  Collector      │       │
//! │  └───────┬────────┘                          └────────┬────────┘       │
//! │          │                                            │                │
//! │          │  run() starts: invalidate()                │                │
//! │          │                                            │                │
//! │          │  1. POST /login {login, password}          │                │
//! │          │───────────────────────────────────────────►│                │
//! │          │  2. 200, Authorization: Bearer ...         │                │
//! │          │◄───────────────────────────────────────────│                │
//! │          │                                            │                │
//! │          │  3. POST /devices/ {id, name}  (once)      │                │
//! │          │───────────────────────────────────────────►│                │
//! │          │  4. 201, or 409 / duplicate (fine)         │                │
//! │          │◄───────────────────────────────────────────│                │
//! │          │                                            │                │
//! │          │  [upload gets 401] → invalidate()          │                │
//! │          │                                            │                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Token Lifetime
//! Collector tokens live about a minute. The engine drops the cached token at
//! the start of every run, and [`TokenInfo::is_stale`] guards long runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{endpoint, structured_error, JSON_CONTENT_TYPE};

/// Collector tokens are refreshed after this age even without a 401.
const TOKEN_MAX_AGE: Duration = Duration::from_secs(50);

// =============================================================================
// TokenProvider Trait
// =============================================================================

/// Source of the `Authorization` header value for uploads.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns the cached token, refreshing it first if there is none.
    ///
    /// Failures are always `Unauthorized`, `NetworkUnavailable` or
    /// `ServerUnavailable`.
    async fn current_token(&self) -> SyncResult<String>;

    /// Forces the next [`current_token`](Self::current_token) to refresh.
    async fn invalidate(&self);
}

// =============================================================================
// Token Cache
// =============================================================================

/// Token information stored after login.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    /// Value of the login response's `Authorization` header.
    pub token: String,
    /// When the token was obtained (local time).
    pub obtained_at: Instant,
}

impl TokenInfo {
    fn new(token: String) -> Self {
        TokenInfo {
            token,
            obtained_at: Instant::now(),
        }
    }

    /// Returns true once the token is old enough that the collector may reject it.
    pub fn is_stale(&self) -> bool {
        self.obtained_at.elapsed() >= TOKEN_MAX_AGE
    }
}

// =============================================================================
// CloudAuth
// =============================================================================

/// Configuration for collector authentication.
#[derive(Clone)]
pub struct CloudAuthConfig {
    pub base_url: Url,
    pub login: String,
    pub password: String,
    pub device_id: String,
    pub device_name: String,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for CloudAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudAuthConfig")
            .field("base_url", &self.base_url.as_str())
            .field("login", &self.login)
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

impl CloudAuthConfig {
    /// Builds the auth configuration from the uploader configuration.
    pub fn from_sync_config(config: &SyncConfig) -> SyncResult<Self> {
        Ok(CloudAuthConfig {
            base_url: config.collector_url()?,
            login: config.collector.login.clone(),
            password: config.collector.password.clone(),
            device_id: config.device.id.clone(),
            device_name: config.device.name.clone(),
            connect_timeout: config.collector.connect_timeout(),
        })
    }
}

/// [`TokenProvider`] that logs in against the collector.
pub struct CloudAuth {
    config: CloudAuthConfig,
    client: reqwest::Client,
    token: RwLock<Option<TokenInfo>>,
    device_registered: AtomicBool,
}

impl CloudAuth {
    /// Creates a new auth manager. No request is made until a token is needed.
    pub fn new(config: CloudAuthConfig) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("HTTP client setup failed: {e}")))?;
        Ok(CloudAuth {
            config,
            client,
            token: RwLock::new(None),
            device_registered: AtomicBool::new(false),
        })
    }

    /// Current token info without triggering a refresh.
    pub async fn cached(&self) -> Option<TokenInfo> {
        self.token.read().await.clone()
    }

    /// Logs in and, the first time, registers this device.
    async fn refresh(&self) -> SyncResult<TokenInfo> {
        let token = self.login().await?;
        if !self.device_registered.load(Ordering::SeqCst) {
            self.register_device(&token).await?;
            self.device_registered.store(true, Ordering::SeqCst);
        }
        Ok(TokenInfo::new(token))
    }

    async fn login(&self) -> SyncResult<String> {
        let url = endpoint(&self.config.base_url, "login").map_err(refresh_failure_from_sync)?;
        debug!(url = %url, login = %self.config.login, "Logging in");

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .json(&json!({ "login": self.config.login, "password": self.config.password }))
            .send()
            .await
            .map_err(refresh_failure)?;

        let status = response.status();
        if status.is_success() {
            return response
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| SyncError::Unauthorized("login response carried no token".into()));
        }

        if status.is_server_error() {
            return Err(SyncError::ServerUnavailable(format!("login failed with HTTP {status}")));
        }
        Err(SyncError::Unauthorized(format!("login rejected with HTTP {status}")))
    }

    async fn register_device(&self, token: &str) -> SyncResult<()> {
        let url = endpoint(&self.config.base_url, "devices/").map_err(refresh_failure_from_sync)?;

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(AUTHORIZATION, token)
            .json(&json!({ "id": self.config.device_id, "name": self.config.device_name }))
            .send()
            .await
            .map_err(refresh_failure)?;

        let status = response.status();
        if status.is_success() {
            info!(device_id = %self.config.device_id, "Device registered");
            return Ok(());
        }

        let body = response.bytes().await.unwrap_or_default();
        if status == StatusCode::CONFLICT || is_duplicate_device(&body) {
            debug!(device_id = %self.config.device_id, "Device already registered");
            return Ok(());
        }

        warn!(%status, "Device registration failed");
        if status.is_server_error() {
            Err(SyncError::ServerUnavailable(format!("device registration failed with HTTP {status}")))
        } else {
            Err(SyncError::Unauthorized(format!("device registration rejected with HTTP {status}")))
        }
    }
}

#[async_trait]
impl TokenProvider for CloudAuth {
    async fn current_token(&self) -> SyncResult<String> {
        {
            let guard = self.token.read().await;
            if let Some(token) = guard.as_ref().filter(|t| !t.is_stale()) {
                debug!("Using cached token");
                return Ok(token.token.clone());
            }
        }

        let mut guard = self.token.write().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = guard.as_ref().filter(|t| !t.is_stale()) {
            return Ok(token.token.clone());
        }

        let fresh = self.refresh().await?;
        info!("Authenticated with collector");
        let token = fresh.token.clone();
        *guard = Some(fresh);
        Ok(token)
    }

    async fn invalidate(&self) {
        *self.token.write().await = None;
        debug!("Token invalidated");
    }
}

/// Maps a failed login/registration request onto the three refresh outcomes.
fn refresh_failure(err: reqwest::Error) -> SyncError {
    if err.is_connect() {
        SyncError::ServerUnavailable(err.to_string())
    } else {
        SyncError::NetworkUnavailable(err.to_string())
    }
}

fn refresh_failure_from_sync(err: SyncError) -> SyncError {
    SyncError::ServerUnavailable(err.to_string())
}

fn is_duplicate_device(body: &[u8]) -> bool {
    structured_error(body)
        .map(|(name, message)| {
            let text = format!("{name} {message}").to_lowercase();
            text.contains("duplicate") || text.contains("already registered")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::test_collector::{unused_local_url, Reply, TestCollector, LOGIN, PASSWORD};

    fn auth_for(base: &Url, password: &str) -> CloudAuth {
        CloudAuth::new(CloudAuthConfig {
            base_url: base.clone(),
            login: LOGIN.to_string(),
            password: password.to_string(),
            device_id: "device-1".to_string(),
            device_name: "Test Phone".to_string(),
            connect_timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_login_caches_token_and_registers_once() {
        let collector = TestCollector::start().await;
        let auth = auth_for(collector.base_url(), PASSWORD);

        let first = auth.current_token().await.unwrap();
        let second = auth.current_token().await.unwrap();

        assert_eq!(first, "Bearer token-1");
        assert_eq!(second, first);
        assert_eq!(collector.logins(), 1);

        auth.invalidate().await;
        assert!(auth.cached().await.is_none());
        let third = auth.current_token().await.unwrap();

        assert_eq!(third, "Bearer token-2");
        assert_eq!(collector.logins(), 2);

        let registrations = collector.registrations();
        assert_eq!(registrations.len(), 1);
        assert_eq!(registrations[0]["id"], "device-1");
        assert_eq!(registrations[0]["name"], "Test Phone");
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let collector = TestCollector::start().await;
        let auth = auth_for(collector.base_url(), "wrong");

        let err = auth.current_token().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized);
        assert!(auth.cached().await.is_none());
    }

    #[tokio::test]
    async fn test_login_server_errors() {
        let collector = TestCollector::start().await;
        let auth = auth_for(collector.base_url(), PASSWORD);

        collector.script_logins([Reply::Status(503)]);
        let err = auth.current_token().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerUnavailable);

        // 200 without a token header
        collector.script_logins([Reply::Status(200)]);
        let err = auth.current_token().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized);

        // Recovers on the next attempt.
        assert!(auth.current_token().await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_device_is_not_fatal() {
        let collector = TestCollector::start().await;
        let auth = auth_for(collector.base_url(), PASSWORD);

        collector.script_registrations([Reply::Json(
            400,
            r#"{"errorName":"DuplicateDevice","errorMessage":"device exists"}"#.to_string(),
        )]);
        assert!(auth.current_token().await.is_ok());

        let collector = TestCollector::start().await;
        let auth = auth_for(collector.base_url(), PASSWORD);
        collector.script_registrations([Reply::Status(409)]);
        assert!(auth.current_token().await.is_ok());
    }

    #[tokio::test]
    async fn test_registration_rejected() {
        let collector = TestCollector::start().await;
        let auth = auth_for(collector.base_url(), PASSWORD);

        collector.script_registrations([Reply::Status(403)]);
        let err = auth.current_token().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn test_unreachable_collector() {
        let url = unused_local_url().await;
        let base = Url::parse(&format!("http://127.0.0.1:{}/api", url.port().unwrap())).unwrap();
        let auth = auth_for(&base, PASSWORD);

        let err = auth.current_token().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ServerUnavailable);
    }

    #[test]
    fn test_token_staleness() {
        let fresh = TokenInfo::new("t".into());
        assert!(!fresh.is_stale());

        let old = TokenInfo {
            token: "t".into(),
            obtained_at: Instant::now() - TOKEN_MAX_AGE,
        };
        assert!(old.is_stale());
    }
}
