use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use librespot_oauth::{OAuthClient, OAuthClientBuilder, OAuthToken};

use crate::device::CredentialProvider;
use crate::error::{EngineError, EngineResult};
use crate::remote::SpotifyClient;

const SPOTIFY_CLIENT_ID: &str = "492e1e45ea814fa3ac555fe1576aaf5b";
const SPOTIFY_REDIRECT_URI: &str = "http://127.0.0.1:8898/login";
pub const SCOPES: &str = "streaming user-read-playback-state user-modify-playback-state user-read-currently-playing user-library-modify user-library-read";

const RESPONSE: &str = r#"
<!doctype html>
<html>
<head><title>Success</title></head>
<body><h1>Authentication Successful!</h1><script>window.close();</script></body>
</html>
"#;
const CACHE: &str = ".cache";
const REFRESH_TOKEN_FILE: &str = ".cache/refresh_token";

/// Tokens for the Web API and the local device.
#[derive(Clone)]
pub struct AuthResult {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<OAuthToken> for AuthResult {
    fn from(token: OAuthToken) -> Self {
        let remaining = token
            .expires_at
            .saturating_duration_since(std::time::Instant::now());
        let remaining = chrono::Duration::from_std(remaining)
            .unwrap_or_else(|_| chrono::Duration::seconds(3600));
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + remaining,
        }
    }
}

fn oauth_client(interactive: bool) -> Result<OAuthClient> {
    let builder = OAuthClientBuilder::new(
        SPOTIFY_CLIENT_ID,
        SPOTIFY_REDIRECT_URI,
        SCOPES.split_whitespace().collect(),
    );
    let builder = if interactive {
        builder.open_in_browser().with_custom_message(RESPONSE)
    } else {
        builder
    };
    builder.build().context("Failed to build OAuth client")
}

fn store_refresh_token(refresh_token: &str) {
    if let Err(e) = fs::create_dir_all(CACHE).and_then(|_| fs::write(REFRESH_TOKEN_FILE, refresh_token)) {
        tracing::warn!(error = %e, "Could not persist refresh token");
    } else {
        tracing::debug!("Saved refresh token to disk");
    }
}

async fn perform_browser_auth() -> Result<AuthResult> {
    tracing::info!("Starting browser-based OAuth flow");
    let token = oauth_client(true)?
        .get_access_token_async()
        .await
        .context("Failed to get token")?;

    let result = AuthResult::from(token);
    store_refresh_token(&result.refresh_token);
    tracing::info!("Browser authentication completed successfully");
    Ok(result)
}

/// Exchange a refresh token for fresh tokens. The returned refresh token
/// replaces the old one, on disk too.
pub async fn refresh_access_token(refresh_token: &str) -> Result<AuthResult> {
    let token = oauth_client(false)?
        .refresh_token_async(refresh_token)
        .await
        .context("Failed to refresh token")?;

    let result = AuthResult::from(token);
    store_refresh_token(&result.refresh_token);
    tracing::debug!(expires_at = %result.expires_at, "Token refreshed successfully");
    Ok(result)
}

/// Reuse the cached refresh token when it still works, otherwise log in
/// through the browser.
pub async fn perform_oauth_flow() -> Result<AuthResult> {
    let stored_refresh_token = Path::new(REFRESH_TOKEN_FILE)
        .exists()
        .then(|| fs::read_to_string(REFRESH_TOKEN_FILE).ok())
        .flatten()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    match stored_refresh_token {
        Some(refresh_token) => {
            tracing::info!("Found cached refresh token");
            match refresh_access_token(&refresh_token).await {
                Ok(result) => Ok(result),
                Err(e) => {
                    tracing::warn!(error = %e, "Cached refresh token failed, re-authenticating");
                    perform_browser_auth().await
                }
            }
        }
        None => {
            tracing::info!("No cached credentials found, starting browser authentication");
            perform_browser_auth().await
        }
    }
}

/// Hands the local device a freshly refreshed access token on every
/// initialization, sharing the Web API client's refresh token.
pub struct OAuthCredentials {
    client: SpotifyClient,
}

impl OAuthCredentials {
    pub fn new(client: SpotifyClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialProvider for OAuthCredentials {
    async fn access_token(&self) -> EngineResult<String> {
        self.client
            .refresh_token_if_needed(true)
            .await
            .map_err(|e| EngineError::AuthenticationFailed(e.to_string()))?;
        self.client
            .access_token()
            .await
            .ok_or_else(|| EngineError::AuthenticationFailed("no access token".into()))
    }
}
