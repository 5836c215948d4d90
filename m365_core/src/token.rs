//! Per-scope access token cache.
//!
//! Each scope owns an async slot. A caller holds the slot's lock while it checks the
//! cached entry and, if needed, performs the grant, so concurrent requests for the same
//! scope result in a single token request. Different scopes never block each other.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::Credentials;
use crate::error::ToolError;
use crate::oauth;

/// Tokens expiring within this window are treated as stale.
pub const SAFETY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub scope: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn is_live(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin < self.expires_at
    }
}

type Slot = Arc<Mutex<Option<CachedToken>>>;

pub struct TokenManager {
    http: reqwest::Client,
    authority_host: String,
    credentials: Credentials,
    margin: Duration,
    slots: StdMutex<HashMap<String, Slot>>,
}

impl TokenManager {
    pub fn new(http: reqwest::Client, authority_host: String, credentials: Credentials) -> Self {
        Self {
            http,
            authority_host,
            credentials,
            margin: Duration::seconds(SAFETY_MARGIN_SECS),
            slots: StdMutex::new(HashMap::new()),
        }
    }

    fn slot(&self, scope: &str) -> Result<Slot, ToolError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|e| ToolError::Internal(format!("token cache lock poisoned: {}", e)))?;
        Ok(slots
            .entry(scope.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone())
    }

    pub async fn get_access_token(&self, scope: &str) -> Result<String, ToolError> {
        let slot = self.slot(scope)?;
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if cached.is_live(Utc::now(), self.margin) {
                debug!(scope, "using cached access token");
                return Ok(cached.token.clone());
            }
        }

        let tokens = oauth::client_credentials_grant(
            &self.http,
            &self.authority_host,
            &self.credentials,
            scope,
        )
        .await?;
        let expires_at = Utc::now() + Duration::seconds(tokens.expires_in);
        info!(scope, expires_at = %expires_at.to_rfc3339(), "acquired access token");

        let token = tokens.access_token;
        *entry = Some(CachedToken {
            scope: scope.to_string(),
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }

    /// Forget the cached token for a scope, e.g. after the API rejected it.
    pub async fn invalidate(&self, scope: &str) -> Result<(), ToolError> {
        let slot = self.slot(scope)?;
        *slot.lock().await = None;
        Ok(())
    }

    /// Snapshot of a cached entry, if present.
    pub async fn cached(&self, scope: &str) -> Option<CachedToken> {
        let slot = self.slot(scope).ok()?;
        let entry = slot.lock().await;
        entry.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(expires_in_secs: i64) -> CachedToken {
        CachedToken {
            scope: oauth::GRAPH_SCOPE.to_string(),
            token: "t".to_string(),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    #[test]
    fn entry_inside_margin_is_stale() {
        let margin = Duration::seconds(SAFETY_MARGIN_SECS);
        assert!(entry(3600).is_live(Utc::now(), margin));
        assert!(!entry(30).is_live(Utc::now(), margin));
        assert!(!entry(-5).is_live(Utc::now(), margin));
    }
}
