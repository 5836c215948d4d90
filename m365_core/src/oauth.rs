use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Credentials;
use crate::error::ToolError;

pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
pub const AZURE_SCOPE: &str = "https://management.azure.com/.default";

/// Upper bound on a single token request, independent of any per-call timeout.
pub const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub expires_in: i64,
    pub token_type: Option<String>,
}

pub fn token_url(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        if tenant_id.is_empty() {
            "organizations"
        } else {
            tenant_id
        }
    )
}

/// Client-credentials grant against the identity platform v2 token endpoint.
pub async fn client_credentials_grant(
    http: &reqwest::Client,
    authority_host: &str,
    credentials: &Credentials,
    scope: &str,
) -> Result<OAuthTokens, ToolError> {
    let url = token_url(authority_host, &credentials.tenant_id);
    let body = [
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
        ("grant_type", "client_credentials"),
        ("scope", scope),
    ];
    let resp = http
        .post(url)
        .form(&body)
        .timeout(TOKEN_REQUEST_TIMEOUT)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout("token request".to_string())
            } else {
                ToolError::Authentication(format!("token request failed: {}", e))
            }
        })?;
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| ToolError::Authentication(format!("token response unreadable: {}", e)))?;
    let v: serde_json::Value = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
    if !status.is_success() {
        let reason = v
            .get("error_description")
            .or_else(|| v.get("error"))
            .and_then(|s| s.as_str())
            .map(|s| s.to_string())
            .unwrap_or(text);
        return Err(ToolError::Authentication(format!(
            "token endpoint returned {}: {}",
            status.as_u16(),
            reason
        )));
    }
    parse_token_response(&v)
}

pub fn parse_token_response(v: &serde_json::Value) -> Result<OAuthTokens, ToolError> {
    let access_token = v
        .get("access_token")
        .and_then(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ToolError::Authentication("token response is missing access_token".to_string())
        })?;
    // Some proxies send expires_in as a string.
    let expires_in = v
        .get("expires_in")
        .and_then(|e| e.as_i64().or_else(|| e.as_str()?.parse().ok()))
        .ok_or_else(|| {
            ToolError::Authentication("token response is missing expires_in".to_string())
        })?;
    Ok(OAuthTokens {
        access_token: access_token.to_string(),
        expires_in,
        token_type: v
            .get("token_type")
            .and_then(|s| s.as_str())
            .map(|s| s.to_string()),
    })
}
