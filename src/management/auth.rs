use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};

use crate::{
    context::RequestContext,
    debug,
    error::{Error, Result},
    spotify::{auth, http::HttpCore},
    types::{AccessToken, OAuthStatus, OAuthToken, TokenSource},
    warning,
};

/// Seconds before expiry at which a stored token is refreshed.
const REFRESH_MARGIN_SECS: i64 = 30;

/// File-backed OAuth token of a logged-in user.
///
/// When a token file exists it takes precedence over the anonymous
/// web-player tokens.
pub struct OAuthTokenManager {
    path: PathBuf,
    refresh_url: String,
}

impl OAuthTokenManager {
    pub fn new(path: PathBuf, refresh_url: String) -> Self {
        OAuthTokenManager { path, refresh_url }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored token. A missing file is `Ok(None)`.
    pub async fn load(&self) -> Result<Option<OAuthToken>> {
        let content = match async_fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let token: OAuthToken = serde_json::from_str(&content)?;
        if token.access_token.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(token))
    }

    pub async fn persist(&self, token: &OAuthToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(token)?;
        async_fs::write(&self.path, json).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        match async_fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn status(&self) -> OAuthStatus {
        match self.load().await {
            Ok(Some(token)) => OAuthStatus {
                enabled: true,
                expires_at: Some(token.expires_at),
                has_refresh: token
                    .refresh_token
                    .as_deref()
                    .is_some_and(|r| !r.trim().is_empty()),
                client_id: Some(token.client_id),
            },
            _ => OAuthStatus::default(),
        }
    }

    fn is_expired(token: &OAuthToken) -> bool {
        token.expires_at - Utc::now() <= Duration::seconds(REFRESH_MARGIN_SECS)
    }

    /// The stored token as a bearer token, refreshed when close to expiry.
    ///
    /// Returns `Ok(None)` when no usable token is stored, including an expired
    /// token that cannot be refreshed for lack of a refresh token or client id.
    pub async fn access_token(
        &self,
        http: &HttpCore,
        ctx: &RequestContext,
    ) -> Result<Option<AccessToken>> {
        let token = match self.load().await {
            Ok(Some(t)) => t,
            Ok(None) => return Ok(None),
            Err(e) => {
                debug!("oauth token file unreadable: {}", e);
                return Ok(None);
            }
        };

        if !Self::is_expired(&token) {
            return Ok(Some(as_access_token(&token)));
        }

        let refresh = token
            .refresh_token
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());
        let (Some(refresh), false) = (refresh, token.client_id.trim().is_empty()) else {
            debug!("stored oauth token expired and cannot be refreshed");
            return Ok(None);
        };

        let refreshed = auth::refresh_token(http, ctx, &self.refresh_url, &token.client_id, refresh)
            .await
            .map_err(|e| match e {
                Error::Cancelled(_) | Error::OAuth(_) => e,
                other => Error::OAuth(other.to_string()),
            })?;
        if let Err(e) = self.persist(&refreshed).await {
            warning!("Failed to save refreshed token to cache: {}", e);
        }
        Ok(Some(as_access_token(&refreshed)))
    }
}

fn as_access_token(token: &OAuthToken) -> AccessToken {
    AccessToken {
        value: token.access_token.clone(),
        expires_at: token.expires_at,
        source: TokenSource::OAuth,
    }
}
