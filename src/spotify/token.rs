//! Anonymous web-player tokens.
//!
//! [`TokenManager::get_access_token`] tries, in order: the OAuth token of a
//! logged-in user, the cached token, and then each [`TokenStrategy`] until one
//! yields a non-empty token. The winner is cached in the shared
//! [`TokenSlot`], which the transport clears whenever the API answers 401.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use tokio::sync::watch;

use crate::{
    config::ClientConfig,
    context::RequestContext,
    debug,
    error::{Error, Result},
    management::OAuthTokenManager,
    spotify::{http::HttpCore, totp::TotpEngine},
    types::{AccessToken, TokenResponse, TokenSource},
    utils,
};

/// The single current token, shared between the manager and the transport.
#[derive(Debug, Clone, Default)]
pub struct TokenSlot(Arc<Mutex<Option<AccessToken>>>);

impl TokenSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token if it has not expired.
    pub fn get_fresh(&self) -> Option<AccessToken> {
        let slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().filter(|t| t.is_fresh()).cloned()
    }

    pub fn store(&self, token: AccessToken) {
        if token.value.trim().is_empty() {
            return;
        }
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(token);
    }

    pub fn clear(&self) {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

/// Expiry rules applied to every token response.
#[derive(Debug, Clone, Copy)]
pub struct TokenLifetime {
    /// Assumed lifetime when the response carries no expiry.
    pub fallback: Duration,
    /// Subtracted from the expiry so tokens are replaced before the server
    /// starts rejecting them.
    pub buffer: Duration,
}

impl TokenLifetime {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            fallback: config.token_fallback_lifetime,
            buffer: config.token_expiry_buffer,
        }
    }

    /// Effective expiry of `response`, received at `now`.
    pub fn expiry(&self, response: &TokenResponse, now: DateTime<Utc>) -> DateTime<Utc> {
        let fallback = now + chrono_duration(self.fallback);
        let raw = match (
            response.access_token_expiration_timestamp_ms.filter(|ms| *ms > 0),
            response.expires_in.filter(|s| *s > 0),
        ) {
            (Some(ms), _) => DateTime::from_timestamp_millis(ms).unwrap_or(fallback),
            (None, Some(secs)) => now + chrono::Duration::seconds(secs),
            (None, None) => fallback,
        };
        let buffer = chrono_duration(self.buffer);
        if raw > now + buffer { raw - buffer } else { raw }
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}

/// One way of obtaining an anonymous token.
#[async_trait]
pub trait TokenStrategy: Send + Sync {
    fn source(&self) -> TokenSource;

    async fn acquire(&self, http: &HttpCore, ctx: &RequestContext) -> Result<AccessToken>;
}

/// Web-player token endpoint authenticated with a TOTP code.
pub struct TotpTokenStrategy {
    engine: Arc<TotpEngine>,
    token_url: String,
    lifetime: TokenLifetime,
}

impl TotpTokenStrategy {
    pub fn new(engine: Arc<TotpEngine>, token_url: String, lifetime: TokenLifetime) -> Self {
        Self {
            engine,
            token_url,
            lifetime,
        }
    }
}

#[async_trait]
impl TokenStrategy for TotpTokenStrategy {
    fn source(&self) -> TokenSource {
        TokenSource::Totp
    }

    async fn acquire(&self, http: &HttpCore, ctx: &RequestContext) -> Result<AccessToken> {
        let code = self.engine.generate(http, ctx).await?;
        let mut url = Url::parse(&self.token_url)
            .map_err(|e| Error::AuthFailure(format!("invalid token url: {e}")))?;
        let server_time = code.server_time.to_string();
        url.query_pairs_mut()
            .append_pair("reason", "init")
            .append_pair("productType", "web-player")
            .append_pair("totp", &code.code)
            .append_pair("totpServerTime", &server_time)
            .append_pair("totpVer", &code.version.to_string())
            .append_pair("sTime", &server_time)
            .append_pair("cTime", &Utc::now().timestamp_millis().to_string());
        fetch_token(http, ctx, url.as_str(), TokenSource::Totp, self.lifetime).await
    }
}

/// A token endpoint that needs no proof, the legacy and access-point variants.
pub struct EndpointTokenStrategy {
    source: TokenSource,
    url: String,
    lifetime: TokenLifetime,
}

impl EndpointTokenStrategy {
    pub fn legacy(config: &ClientConfig) -> Self {
        Self {
            source: TokenSource::Legacy,
            url: format!(
                "{}?reason=transport&productType=web_player",
                config.endpoints.legacy_token_url()
            ),
            lifetime: TokenLifetime::from_config(config),
        }
    }

    pub fn access_point(config: &ClientConfig) -> Self {
        Self {
            source: TokenSource::AccessPoint,
            url: config.endpoints.access_point_url(),
            lifetime: TokenLifetime::from_config(config),
        }
    }
}

#[async_trait]
impl TokenStrategy for EndpointTokenStrategy {
    fn source(&self) -> TokenSource {
        self.source
    }

    async fn acquire(&self, http: &HttpCore, ctx: &RequestContext) -> Result<AccessToken> {
        fetch_token(http, ctx, &self.url, self.source, self.lifetime).await
    }
}

/// GETs a token endpoint with a small retry loop.
///
/// Network errors back off 250 ms per attempt and 5xx 500 ms per attempt.
/// A 429 is recorded with the rate limiter and slept through in place when
/// `Retry-After` is within the configured ceiling, otherwise surfaced.
pub async fn fetch_token(
    http: &HttpCore,
    ctx: &RequestContext,
    url: &str,
    source: TokenSource,
    lifetime: TokenLifetime,
) -> Result<AccessToken> {
    let redacted = utils::redact_token_url(url);
    debug!("token GET {}", redacted);
    let host = utils::host_of(url);
    let policy = http.policy();
    http.limiter().gate(ctx, &host).await?;

    let mut last_err: Option<Error> = None;
    for attempt in 1..=policy.token_attempts {
        debug!("token attempt={}", attempt);
        let response = match http.get(ctx, url, None).await {
            Ok(r) => r,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                last_err = Some(e);
                ctx.sleep(Duration::from_millis(250) * attempt).await?;
                continue;
            }
        };

        if response.status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = utils::parse_retry_after(
                response.retry_after.as_deref(),
                policy.default_retry_after,
            );
            let cooldown = http.limiter().note_rate_limited(&host, Some(retry_after));
            debug!("token 429 rate-limited retry-after={}s", retry_after.as_secs());
            last_err = Some(Error::RateLimited {
                host: host.clone(),
                endpoint: Some(redacted.clone()),
                retry_after: Some(retry_after),
                wait: cooldown.remaining(),
                cooldown_until: cooldown.until_utc(),
                backoff: cooldown.backoff,
            });
            if retry_after <= policy.token_retry_after_ceiling {
                ctx.sleep(retry_after).await?;
                continue;
            }
            break;
        }

        if !response.status.is_success() {
            let body = response.preview(500);
            debug!(
                "token non-200 status={} body(peek)={}",
                response.status.as_u16(),
                body
            );
            last_err = Some(Error::Upstream {
                status: response.status.as_u16(),
                endpoint: redacted.clone(),
                body,
            });
            if response.status.is_server_error() {
                ctx.sleep(Duration::from_millis(500) * attempt).await?;
                continue;
            }
            break;
        }

        let payload: TokenResponse = serde_json::from_slice(&response.body)?;
        if payload.access_token.trim().is_empty() {
            return Err(Error::AuthFailure("empty token received".into()));
        }
        http.limiter().note_success(&host);
        return Ok(AccessToken {
            expires_at: lifetime.expiry(&payload, Utc::now()),
            value: payload.access_token,
            source,
        });
    }

    Err(last_err.unwrap_or_else(|| Error::AuthFailure("failed to get access token".into())))
}

type ChainOutcome = Option<Result<AccessToken>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

enum ChainRole {
    Leader(watch::Sender<ChainOutcome>),
    Follower(watch::Receiver<ChainOutcome>),
}

/// Clears the in-flight marker when the leading caller finishes or gives up.
struct InflightGuard<'a>(&'a Mutex<Option<watch::Receiver<ChainOutcome>>>);

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        *lock(self.0) = None;
    }
}

pub struct TokenManager {
    slot: TokenSlot,
    strategies: Vec<Box<dyn TokenStrategy>>,
    oauth: Option<OAuthTokenManager>,
    inflight: Mutex<Option<watch::Receiver<ChainOutcome>>>,
}

impl TokenManager {
    pub fn new(
        slot: TokenSlot,
        strategies: Vec<Box<dyn TokenStrategy>>,
        oauth: Option<OAuthTokenManager>,
    ) -> Self {
        Self {
            slot,
            strategies,
            oauth,
            inflight: Mutex::new(None),
        }
    }

    /// The standard chain: TOTP, legacy, access point.
    pub fn standard(config: &ClientConfig, slot: TokenSlot, engine: Arc<TotpEngine>) -> Self {
        let lifetime = TokenLifetime::from_config(config);
        let strategies: Vec<Box<dyn TokenStrategy>> = vec![
            Box::new(TotpTokenStrategy::new(
                engine,
                config.endpoints.token_url(),
                lifetime,
            )),
            Box::new(EndpointTokenStrategy::legacy(config)),
            Box::new(EndpointTokenStrategy::access_point(config)),
        ];
        let oauth = config.oauth_token_path.clone().map(|path| {
            OAuthTokenManager::new(path, config.endpoints.accounts_token_url())
        });
        Self::new(slot, strategies, oauth)
    }

    pub fn slot(&self) -> &TokenSlot {
        &self.slot
    }

    pub fn oauth(&self) -> Option<&OAuthTokenManager> {
        self.oauth.as_ref()
    }

    pub fn invalidate(&self) {
        self.slot.clear();
    }

    /// Returns a usable bearer token.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] as soon as the context stops, otherwise
    /// [`Error::AuthFailure`] naming every strategy's failure.
    pub async fn get_access_token(
        &self,
        http: &HttpCore,
        ctx: &RequestContext,
    ) -> Result<AccessToken> {
        ctx.check()?;

        if let Some(oauth) = &self.oauth {
            match oauth.access_token(http, ctx).await {
                Ok(Some(token)) => {
                    debug!("using spotify oauth access token");
                    return Ok(token);
                }
                Ok(None) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => debug!("oauth token fetch failed: {}", e),
            }
        }

        if let Some(token) = self.slot.get_fresh() {
            debug!("using cached access token");
            return Ok(token);
        }

        // One chain run at a time. Callers arriving meanwhile wait for its
        // outcome; if the leading caller gives up, the next one takes over.
        loop {
            let role = {
                let mut inflight = lock(&self.inflight);
                if let Some(token) = self.slot.get_fresh() {
                    return Ok(token);
                }
                match inflight.as_ref() {
                    Some(rx) => ChainRole::Follower(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        *inflight = Some(rx);
                        ChainRole::Leader(tx)
                    }
                }
            };

            match role {
                ChainRole::Follower(mut rx) => {
                    let outcome = ctx
                        .run(async move {
                            match rx.wait_for(Option::is_some).await {
                                Ok(value) => value.clone(),
                                Err(_) => None,
                            }
                        })
                        .await?;
                    match outcome {
                        Some(result) => return result,
                        None => debug!("token acquisition abandoned; retrying"),
                    }
                }
                ChainRole::Leader(tx) => {
                    let _clear = InflightGuard(&self.inflight);
                    let result = self.run_chain(http, ctx).await;
                    if !result.as_ref().is_err_and(Error::is_cancelled) {
                        let _ = tx.send(Some(result.clone()));
                    }
                    return result;
                }
            }
        }
    }

    async fn run_chain(&self, http: &HttpCore, ctx: &RequestContext) -> Result<AccessToken> {
        let mut failures = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let source = strategy.source();
            match strategy.acquire(http, ctx).await {
                Ok(token) if !token.value.trim().is_empty() => {
                    debug!("access token acquired source={} (len={})", source, token.value.len());
                    self.slot.store(token.clone());
                    return Ok(token);
                }
                Ok(_) => failures.push(format!("{source}=empty token received")),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    debug!("token strategy {} failed: {}", source, e);
                    failures.push(format!("{source}={e}"));
                }
            }
        }

        Err(Error::AuthFailure(failures.join("; ")))
    }
}
