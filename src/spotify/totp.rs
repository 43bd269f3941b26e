//! Time-based one-time codes for the web-player token endpoint.
//!
//! The shared secret is not published. It is rebuilt from a versioned secret
//! table: each integer is XOR-ed with a position-dependent mask, the results
//! are concatenated in decimal and the UTF-8 bytes of that string are
//! carried base32-encoded, the form authenticator apps exchange. The HMAC key
//! is the decoded secret. Codes follow RFC 6238 (HMAC-SHA1, 30 s step, 6 digits) against
//! Spotify's server clock rather than the local one.

use std::{sync::Mutex, time::Duration};

use bytes::Bytes;
use hmac::{Hmac, Mac};
use reqwest::StatusCode;
use serde::Deserialize;
use sha1::Sha1;
use tokio::time::Instant;

use crate::{
    config::ClientConfig,
    context::RequestContext,
    debug,
    error::{Error, Result},
    management::SecretStore,
    spotify::http::HttpCore,
    types::{SecretEntry, TotpCode},
    utils, warning,
};

type HmacSha1 = Hmac<Sha1>;

const TIME_STEP: i64 = 30;
const DIGITS_MOD: u32 = 1_000_000;
const MS_THRESHOLD: i64 = 1_000_000_000_000;
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// The shared secret rebuilt from one secret table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotpSecret {
    pub version: i64,
    /// RFC 4648 base32, padded.
    pub base32: String,
}

impl TotpSecret {
    /// The HMAC key.
    pub fn key(&self) -> Result<Vec<u8>> {
        base32_decode(&self.base32)
    }
}

/// Picks the entry with the highest version.
pub fn latest_secret(entries: &[SecretEntry]) -> Option<&SecretEntry> {
    entries.iter().max_by_key(|e| e.version)
}

pub fn derive_secret(entry: &SecretEntry) -> TotpSecret {
    let transformed: String = entry
        .secret
        .iter()
        .enumerate()
        .map(|(i, v)| (v ^ ((i as i64 % 33) + 9)).to_string())
        .collect();
    TotpSecret {
        version: entry.version,
        base32: base32_encode(transformed.as_bytes()),
    }
}

/// Computes the 6-digit code for `timestamp`.
///
/// Timestamps above 10^12 are taken as milliseconds.
pub fn totp_code(key: &[u8], timestamp: i64) -> Result<String> {
    let seconds = if timestamp > MS_THRESHOLD {
        timestamp / 1000
    } else {
        timestamp
    };
    let counter = (seconds.max(0) / TIME_STEP) as u64;

    let mut mac = HmacSha1::new_from_slice(key).map_err(|e| Error::Totp(e.to_string()))?;
    mac.update(&counter.to_be_bytes());
    let sum = mac.finalize().into_bytes();

    let offset = (sum[sum.len() - 1] & 0x0f) as usize;
    let binary = (u32::from(sum[offset]) & 0x7f) << 24
        | u32::from(sum[offset + 1]) << 16
        | u32::from(sum[offset + 2]) << 8
        | u32::from(sum[offset + 3]);
    Ok(format!("{:06}", binary % DIGITS_MOD))
}

/// RFC 4648 base32 with padding.
pub fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    for chunk in bytes.chunks(5) {
        let mut buf = [0u8; 5];
        buf[..chunk.len()].copy_from_slice(chunk);
        let bits = buf.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        let symbols = (chunk.len() * 8).div_ceil(5);
        for i in 0..8 {
            if i < symbols {
                let index = ((bits >> (35 - i * 5)) & 0x1f) as usize;
                out.push(BASE32_ALPHABET[index] as char);
            } else {
                out.push('=');
            }
        }
    }
    out
}

/// Decodes RFC 4648 base32. Padding and lowercase input are accepted.
pub fn base32_decode(input: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut bits: u64 = 0;
    let mut pending = 0u32;
    for c in input.trim().trim_end_matches('=').bytes() {
        let upper = c.to_ascii_uppercase();
        let value = BASE32_ALPHABET
            .iter()
            .position(|a| *a == upper)
            .ok_or_else(|| Error::Totp(format!("invalid base32 character {:?}", c as char)))?;
        bits = (bits << 5) | value as u64;
        pending += 5;
        if pending >= 8 {
            pending -= 8;
            out.push((bits >> pending) as u8);
            bits &= (1 << pending) - 1;
        }
    }
    Ok(out)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ServerTimeBody {
    Bare(i64),
    Wrapped {
        #[serde(rename = "serverTime")]
        server_time: i64,
    },
}

/// Reads a server-time body, either a bare integer or `{"serverTime": n}`.
pub fn parse_server_time(body: &[u8]) -> Result<i64> {
    let parsed: ServerTimeBody = serde_json::from_slice(body)
        .map_err(|e| Error::Totp(format!("invalid server time body: {e}")))?;
    let value = match parsed {
        ServerTimeBody::Bare(v) => v,
        ServerTimeBody::Wrapped { server_time } => server_time,
    };
    if value <= 0 {
        return Err(Error::Totp("failed to fetch server time from Spotify".into()));
    }
    Ok(value)
}

struct CachedSecrets {
    entries: Vec<SecretEntry>,
    fetched_at: Instant,
}

struct ServerTimeSample {
    value: i64,
    is_ms: bool,
    taken_at: Instant,
}

impl ServerTimeSample {
    fn extrapolate(&self) -> i64 {
        let elapsed = self.taken_at.elapsed();
        if self.is_ms {
            self.value + elapsed.as_millis() as i64
        } else {
            self.value + elapsed.as_secs() as i64
        }
    }
}

pub struct TotpEngine {
    secrets_url: String,
    server_time_url: String,
    secrets_ttl: Duration,
    server_time_ttl: Duration,
    store: Option<SecretStore>,
    secrets: Mutex<Option<CachedSecrets>>,
    server_time: Mutex<Option<ServerTimeSample>>,
}

impl TotpEngine {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            secrets_url: config.endpoints.secrets_url.clone(),
            server_time_url: config.endpoints.server_time_url(),
            secrets_ttl: config.secrets_ttl,
            server_time_ttl: config.server_time_ttl,
            store: config.secrets_path.clone().map(SecretStore::new),
            secrets: Mutex::new(None),
            server_time: Mutex::new(None),
        }
    }

    /// Generates a code with the newest secret against the server clock.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] passes through untouched; every other failure is
    /// reported as [`Error::Totp`].
    pub async fn generate(&self, http: &HttpCore, ctx: &RequestContext) -> Result<TotpCode> {
        let entries = self.secret_table(http, ctx).await.map_err(into_totp)?;
        let entry = latest_secret(&entries)
            .ok_or_else(|| Error::Totp("no secrets available".into()))?;
        let secret = derive_secret(entry);
        let key = secret.key()?;
        let server_time = self.server_time(http, ctx).await.map_err(into_totp)?;
        let code = totp_code(&key, server_time)?;
        debug!("totp generated version={}", secret.version);
        Ok(TotpCode {
            code,
            server_time,
            version: secret.version,
        })
    }

    /// The secret table, from memory, the remote document or the disk mirror.
    pub async fn secret_table(
        &self,
        http: &HttpCore,
        ctx: &RequestContext,
    ) -> Result<Vec<SecretEntry>> {
        {
            let cached = self.secrets.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(c) = cached.as_ref() {
                if !c.entries.is_empty() && c.fetched_at.elapsed() <= self.secrets_ttl {
                    return Ok(c.entries.clone());
                }
            }
        }

        let remote_err = match self.fetch_remote_secrets(http, ctx).await {
            Ok((entries, body)) => {
                self.remember_secrets(&entries);
                if let Some(store) = &self.store {
                    if let Err(e) = store.persist(&body).await {
                        warning!("Could not mirror secrets to {}: {}", store.path().display(), e);
                    }
                }
                return Ok(entries);
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => e,
        };
        debug!("remote secret table failed: {}", remote_err);

        let Some(store) = &self.store else {
            return Err(Error::Totp(format!(
                "failed to fetch secrets: {remote_err}"
            )));
        };
        let entries = store.load().await.map_err(|e| {
            Error::Totp(format!(
                "failed to fetch secrets from both remote ({remote_err}) and local ({e})"
            ))
        })?;
        self.remember_secrets(&entries);
        Ok(entries)
    }

    fn remember_secrets(&self, entries: &[SecretEntry]) {
        let mut cached = self.secrets.lock().unwrap_or_else(|e| e.into_inner());
        *cached = Some(CachedSecrets {
            entries: entries.to_vec(),
            fetched_at: Instant::now(),
        });
    }

    async fn fetch_remote_secrets(
        &self,
        http: &HttpCore,
        ctx: &RequestContext,
    ) -> Result<(Vec<SecretEntry>, Bytes)> {
        let host = utils::host_of(&self.secrets_url);
        http.limiter().gate(ctx, &host).await?;
        let response = http.get_plain(ctx, &self.secrets_url).await?;
        if response.status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = utils::parse_retry_after(
                response.retry_after.as_deref(),
                http.policy().default_retry_after,
            );
            http.limiter().note_rate_limited(&host, Some(retry_after));
        }
        if !response.status.is_success() {
            return Err(Error::Upstream {
                status: response.status.as_u16(),
                endpoint: self.secrets_url.clone(),
                body: response.preview(200),
            });
        }
        http.limiter().note_success(&host);
        let entries: Vec<SecretEntry> = serde_json::from_slice(&response.body)?;
        Ok((entries, response.body))
    }

    /// Spotify's clock, cached and advanced by local elapsed time.
    pub async fn server_time(&self, http: &HttpCore, ctx: &RequestContext) -> Result<i64> {
        {
            let cached = self.server_time.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(sample) = cached.as_ref() {
                if sample.taken_at.elapsed() <= self.server_time_ttl {
                    return Ok(sample.extrapolate());
                }
            }
        }

        let value = self.fetch_server_time(http, ctx).await?;
        let mut cached = self.server_time.lock().unwrap_or_else(|e| e.into_inner());
        *cached = Some(ServerTimeSample {
            value,
            is_ms: value > MS_THRESHOLD,
            taken_at: Instant::now(),
        });
        Ok(value)
    }

    async fn fetch_server_time(&self, http: &HttpCore, ctx: &RequestContext) -> Result<i64> {
        let host = utils::host_of(&self.server_time_url);
        http.limiter().gate(ctx, &host).await?;
        let response = http.get(ctx, &self.server_time_url, None).await?;

        if response.status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = utils::parse_retry_after(
                response.retry_after.as_deref(),
                http.policy().default_retry_after,
            );
            let cooldown = http.limiter().note_rate_limited(&host, Some(retry_after));
            return Err(Error::Totp(format!(
                "spotify server-time rate limited (429) retry-after={}s backoff={}s",
                retry_after.as_secs(),
                cooldown.backoff.as_secs()
            )));
        }
        if !response.status.is_success() {
            return Err(Error::Totp(format!(
                "failed to get server time. status={}",
                response.status.as_u16()
            )));
        }
        http.limiter().note_success(&host);
        parse_server_time(&response.body)
    }
}

fn into_totp(err: Error) -> Error {
    match err {
        Error::Cancelled(_) | Error::Totp(_) => err,
        other => Error::Totp(other.to_string()),
    }
}
