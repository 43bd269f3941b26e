//! Configuration management for the Spotify metadata client.
//!
//! This module handles loading and accessing configuration values from environment
//! variables and `.env` files. It provides the [`ClientConfig`] that every
//! [`SpotifyClient`](crate::spotify::SpotifyClient) is built from, including the
//! upstream endpoints, cache lifetimes and the retry policy.
//!
//! The configuration system follows a hierarchical approach:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Application defaults

use dotenv;
use std::{env, path::PathBuf, time::Duration};

use crate::context::RequestContext;

const APP_DIR: &str = "spotmeta";

/// Loads environment variables from a `.env` file in the local data directory.
///
/// Creates the necessary directory structure if it doesn't exist and loads
/// environment variables from a `.env` file located in the platform-specific
/// local data directory under `spotmeta/.env`. A missing file is not an error;
/// every setting has a default.
///
/// # Directory Structure
///
/// The function looks for the `.env` file in:
/// - Linux: `~/.local/share/spotmeta/.env`
/// - macOS: `~/Library/Application Support/spotmeta/.env`
/// - Windows: `%LOCALAPPDATA%/spotmeta/.env`
///
/// # Errors
///
/// Returns an error string if the directory cannot be created or an existing
/// `.env` file cannot be parsed.
///
/// # Example
///
/// ```
/// use spotmeta::config;
///
/// #[tokio::main]
/// async fn main() {
///     if let Err(e) = config::load_env().await {
///         eprintln!("Configuration error: {}", e);
///     }
/// }
/// ```
pub async fn load_env() -> Result<(), String> {
    let path = data_dir().join(".env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Returns true when `SPOTMETA_DEBUG` is set to `1`, `true`, `yes` or `on`.
pub fn debug_enabled() -> bool {
    env::var("SPOTMETA_DEBUG")
        .map(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}

/// The platform-specific data directory of the application.
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}

/// Location of the on-disk mirror of the TOTP secret table.
///
/// Overridable with `SPOTMETA_SECRETS_PATH`.
pub fn secrets_path() -> PathBuf {
    env_path("SPOTMETA_SECRETS_PATH")
        .unwrap_or_else(|| data_dir().join("secrets").join("secretBytes.json"))
}

/// Location of the OAuth token written by `spotmeta auth login`.
///
/// Overridable with `SPOTMETA_OAUTH_TOKEN_PATH`.
pub fn oauth_token_path() -> PathBuf {
    env_path("SPOTMETA_OAUTH_TOKEN_PATH")
        .unwrap_or_else(|| data_dir().join("cache").join("oauth_token.json"))
}

/// Returns the Spotify application client id used for the OAuth login, if any.
///
/// Retrieves the `SPOTIFY_API_AUTH_CLIENT_ID` environment variable. The
/// command line flag takes precedence over this value.
pub fn spotify_client_id() -> Option<String> {
    env::var("SPOTIFY_API_AUTH_CLIENT_ID")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Returns the bind address of the loopback OAuth callback server.
///
/// Defaults to `127.0.0.1:0`, an ephemeral port chosen by the OS.
pub fn oauth_callback_addr() -> String {
    env::var("SERVER_ADDRESS").unwrap_or_else(|_| "127.0.0.1:0".to_string())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Upstream base URLs.
///
/// All outbound traffic is derived from these values so tests can point a
/// client at a local server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// REST API base, e.g. `https://api.spotify.com/v1`.
    pub api_base: String,
    /// Web player origin serving the token and server-time endpoints.
    pub web_base: String,
    /// Accounts service for the OAuth authorize and token endpoints.
    pub accounts_base: String,
    /// Remote JSON document holding the TOTP secret table.
    pub secrets_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base: "https://api.spotify.com/v1".to_string(),
            web_base: "https://open.spotify.com".to_string(),
            accounts_base: "https://accounts.spotify.com".to_string(),
            secrets_url: "https://cdn.jsdelivr.net/gh/afkarxyz/secretBytes@refs/heads/main/secrets/secretBytes.json".to_string(),
        }
    }
}

impl Endpoints {
    /// Endpoints pointing every service at one base URL, used by tests.
    pub fn local(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_base: format!("{base}/v1"),
            web_base: base.to_string(),
            accounts_base: format!("{base}/accounts"),
            secrets_url: format!("{base}/secrets/secretBytes.json"),
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/api/token", self.web_base)
    }

    pub fn legacy_token_url(&self) -> String {
        format!("{}/get_access_token", self.web_base)
    }

    pub fn access_point_url(&self) -> String {
        format!(
            "{}/get_access_token?reason=transport&productType=web_player",
            self.web_base
        )
    }

    pub fn server_time_url(&self) -> String {
        format!("{}/api/server-time", self.web_base)
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/authorize", self.accounts_base)
    }

    pub fn accounts_token_url(&self) -> String {
        format!("{}/api/token", self.accounts_base)
    }

    pub fn playlist_url(&self, id: &str) -> String {
        format!("{}/playlists/{id}", self.api_base)
    }

    pub fn playlist_tracks_url(&self, id: &str) -> String {
        format!("{}/playlists/{id}/tracks?limit=100", self.api_base)
    }

    pub fn album_url(&self, id: &str) -> String {
        format!("{}/albums/{id}", self.api_base)
    }

    pub fn album_tracks_url(&self, id: &str) -> String {
        format!("{}/albums/{id}/tracks?limit=50", self.api_base)
    }

    pub fn track_url(&self, id: &str) -> String {
        format!("{}/tracks/{id}", self.api_base)
    }

    pub fn artist_url(&self, id: &str) -> String {
        format!("{}/artists/{id}", self.api_base)
    }

    pub fn artist_albums_url(&self, id: &str, include_groups: &str) -> String {
        format!(
            "{}/artists/{id}/albums?include_groups={include_groups}&limit=50",
            self.api_base
        )
    }
}

/// Tunables of the rate limiter and the retry loops.
///
/// Interactive and batch callers differ only in their deadline: the wait
/// budget is derived from it, so a long batch deadline waits through cooldowns
/// that an interactive call would surface immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Minimum spacing between two requests to the same host.
    pub min_interval: Duration,
    /// Upper bound of the per-host exponential backoff.
    pub max_backoff: Duration,
    /// Added to every cooldown deadline to absorb clock skew.
    pub skew_buffer: Duration,
    /// Cooldowns at or below this are always waited through.
    pub short_cooldown: Duration,
    /// Upper bound of the wait budget derived from a deadline.
    pub max_wait_cap: Duration,
    /// Wait budget when the caller set no deadline.
    pub no_deadline_budget: Duration,
    /// Subtracted from the remaining deadline when computing the budget.
    pub deadline_safety_margin: Duration,
    /// Retry-After assumed when the header is missing or unparsable.
    pub default_retry_after: Duration,
    /// Attempts of one API request, across all failure kinds.
    pub api_attempts: u32,
    /// 429 responses an API request waits through before surfacing.
    pub api_rate_limit_retries: u32,
    /// Retries of transient network and 5xx failures of an API request.
    pub api_transient_retries: u32,
    /// Attempts of one token request.
    pub token_attempts: u32,
    /// Longest Retry-After a token request sleeps through in place.
    pub token_retry_after_ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10 * 60),
            skew_buffer: Duration::from_secs(5),
            short_cooldown: Duration::from_secs(3),
            max_wait_cap: Duration::from_secs(2 * 60),
            no_deadline_budget: Duration::from_secs(2 * 60),
            deadline_safety_margin: Duration::from_secs(2),
            default_retry_after: Duration::from_secs(5),
            api_attempts: 6,
            api_rate_limit_retries: 2,
            api_transient_retries: 2,
            token_attempts: 3,
            token_retry_after_ceiling: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// How long a caller with this context may spend waiting on cooldowns.
    pub fn wait_budget(&self, ctx: &RequestContext) -> Duration {
        match ctx.remaining() {
            Some(remaining) => remaining
                .saturating_sub(self.deadline_safety_margin)
                .min(self.max_wait_cap),
            None => self.no_deadline_budget,
        }
    }
}

/// Everything a [`SpotifyClient`](crate::spotify::SpotifyClient) needs.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoints: Endpoints,
    pub retry: RetryPolicy,
    /// Lifetime of cached API response bodies. Zero disables the cache.
    pub cache_ttl: Duration,
    /// Lifetime of the in-memory secret table.
    pub secrets_ttl: Duration,
    /// Lifetime of the cached server time.
    pub server_time_ttl: Duration,
    /// Per-request timeout of the HTTP client.
    pub http_timeout: Duration,
    /// Token lifetime assumed when a token response carries no expiry.
    pub token_fallback_lifetime: Duration,
    /// Subtracted from every token expiry.
    pub token_expiry_buffer: Duration,
    /// Album track listings fetched concurrently while building a discography.
    pub discography_concurrency: usize,
    /// Disk mirror of the secret table, `None` disables it.
    pub secrets_path: Option<PathBuf>,
    /// OAuth token file consulted before any other strategy, `None` disables it.
    pub oauth_token_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            retry: RetryPolicy::default(),
            cache_ttl: Duration::from_secs(10 * 60),
            secrets_ttl: Duration::from_secs(6 * 60 * 60),
            server_time_ttl: Duration::from_secs(5 * 60),
            http_timeout: Duration::from_secs(15),
            token_fallback_lifetime: Duration::from_secs(45 * 60),
            token_expiry_buffer: Duration::from_secs(30),
            discography_concurrency: 4,
            secrets_path: Some(secrets_path()),
            oauth_token_path: Some(oauth_token_path()),
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with the `SPOTMETA_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(url) = env_string("SPOTMETA_API_URL") {
            config.endpoints.api_base = url;
        }
        if let Some(url) = env_string("SPOTMETA_SECRETS_URL") {
            config.endpoints.secrets_url = url;
        }
        if let Some(secs) = env_u64("SPOTMETA_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(ms) = env_u64("SPOTMETA_MIN_INTERVAL_MS") {
            config.retry.min_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("SPOTMETA_HTTP_TIMEOUT_SECS").filter(|s| *s > 0) {
            config.http_timeout = Duration::from_secs(secs);
        }
        config
    }

    /// A configuration for an isolated client talking to `base`.
    ///
    /// Disk mirrors and the OAuth override are disabled and pacing is
    /// shortened so tests stay fast.
    pub fn local(base: &str) -> Self {
        let mut config = Self::default();
        config.endpoints = Endpoints::local(base);
        config.retry.min_interval = Duration::from_millis(1);
        config.secrets_path = None;
        config.oauth_token_path = None;
        config
    }
}

