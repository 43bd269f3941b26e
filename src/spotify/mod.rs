//! # Spotify Integration Module
//!
//! This module turns Spotify links into normalized metadata. It talks to the
//! public web surface of Spotify without registered client credentials, so
//! most of the code deals with obtaining a token, staying under the rate
//! limits and surviving partial failures.
//!
//! ## Architecture
//!
//! ```text
//! SpotifyClient::fetch_metadata(url)
//!          ↓
//! URI Resolver (uri)              link → SpotifyReference
//!          ↓
//! Token Manager (token)           OAuth file → cached → TOTP → legacy → access point
//!     └── TOTP Engine (totp)      secret table + server clock → 6-digit code
//!          ↓
//! Paginated Fetcher (paging)      follows `next` links
//!          ↓
//! Response Cache (cache)          TTL cache + single-flight per URL
//!          ↓
//! HTTP transport (http)           headers, retries, 401/429 handling
//!     └── Rate Limiter (ratelimit) per-host pacing and backoff
//!          ↓
//! Data Formatter (format)         raw shapes → payloads
//! ```
//!
//! ## Core Modules
//!
//! - [`uri`] - Parses `spotify:` URIs, `open.spotify.com` URLs (locale and
//!   embed forms included) and bare ids.
//! - [`totp`] - Derives the TOTP key from the newest entry of the published
//!   secret table and computes RFC 6238 codes against Spotify's server time.
//! - [`token`] - The ordered token strategies and the shared token slot.
//! - [`ratelimit`] - Minimum spacing between requests per host, cooldowns
//!   after 429 with exponential backoff, and fail-fast when a cooldown does
//!   not fit the caller's deadline.
//! - [`http`] - The single `reqwest` client and the retry loop for API calls.
//! - [`cache`] - Response bodies keyed by URL, shared by concurrent callers.
//! - [`paging`] - Cursor pagination with an optional delay between pages.
//! - [`format`] - Payload construction, ISRC lookups and discography fan-out.
//! - [`auth`] - OAuth 2.0 PKCE login, code exchange and refresh.
//! - [`client`] - [`SpotifyClient`], which owns all of the shared state.
//!
//! ## Error Handling
//!
//! Every operation returns [`crate::error::Result`]. Transient network and
//! gateway errors are retried locally a bounded number of times. A 429 is
//! waited out when the cooldown fits the remaining deadline and surfaced as
//! [`Error::RateLimited`](crate::error::Error::RateLimited) otherwise. A 401
//! clears the cached token; `fetch_metadata` then retries once with a fresh
//! token.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use spotmeta::spotify::SpotifyClient;
//!
//! let client = SpotifyClient::from_env()?;
//! let payload = client
//!     .fetch_metadata(
//!         "spotify:playlist:37i9dQZF1DXcBWIGoYBM5M",
//!         true,
//!         Duration::from_millis(500),
//!         Duration::from_secs(120),
//!     )
//!     .await?;
//! ```
//!
//! ## Thread Safety
//!
//! [`SpotifyClient`] is `Clone + Send + Sync`. Each piece of shared state has
//! its own lock, and no `std::sync::Mutex` is held across an `.await`.

pub mod auth;
pub mod cache;
pub mod client;
pub mod format;
pub mod http;
pub mod paging;
pub mod ratelimit;
pub mod token;
pub mod totp;
pub mod uri;

pub use client::SpotifyClient;
pub use uri::parse_spotify_reference;
