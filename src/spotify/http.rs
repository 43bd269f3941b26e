//! Shared HTTP plumbing: one `reqwest` client, browser-like headers, the rate
//! limiter and the retry loop for authenticated API calls.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{
    Client, RequestBuilder, StatusCode,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER, USER_AGENT},
};

use crate::{
    config::{ClientConfig, RetryPolicy},
    context::RequestContext,
    debug,
    error::{Error, Result},
    spotify::{ratelimit::RateLimiter, token::TokenSlot},
    utils,
};

/// Status, `Retry-After` header and body of a completed request.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub retry_after: Option<String>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn preview(&self, max: usize) -> String {
        utils::preview_body(&self.body, max)
    }
}

pub struct HttpCore {
    client: Client,
    user_agent: String,
    limiter: RateLimiter,
    token_slot: TokenSlot,
}

impl HttpCore {
    pub fn new(config: &ClientConfig, token_slot: TokenSlot) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self {
            client,
            user_agent: utils::random_user_agent(),
            limiter: RateLimiter::new(config.retry.clone()),
            token_slot,
        })
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn policy(&self) -> &RetryPolicy {
        self.limiter.policy()
    }

    pub fn token_slot(&self) -> &TokenSlot {
        &self.token_slot
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn base_headers(&self) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Ok(ua) = HeaderValue::from_str(&self.user_agent) {
            h.insert(USER_AGENT, ua);
        }
        h.insert(ACCEPT, HeaderValue::from_static("application/json"));
        h.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        h.insert(
            HeaderName::from_static("sec-ch-ua-platform"),
            HeaderValue::from_static("\"Windows\""),
        );
        h.insert(
            HeaderName::from_static("sec-fetch-dest"),
            HeaderValue::from_static("empty"),
        );
        h.insert(
            HeaderName::from_static("sec-fetch-mode"),
            HeaderValue::from_static("cors"),
        );
        h.insert(
            HeaderName::from_static("sec-fetch-site"),
            HeaderValue::from_static("same-origin"),
        );
        h.insert(REFERER, HeaderValue::from_static("https://open.spotify.com/"));
        h.insert(ORIGIN, HeaderValue::from_static("https://open.spotify.com"));
        h
    }

    /// Sends `request` and reads the whole body under `ctx`.
    pub async fn send(&self, ctx: &RequestContext, request: RequestBuilder) -> Result<RawResponse> {
        let response = ctx.run(request.send()).await??;
        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = ctx.run(response.bytes()).await??;
        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }

    /// A GET with the browser headers and an optional bearer token. No gate,
    /// no retries.
    pub async fn get(
        &self,
        ctx: &RequestContext,
        url: &str,
        bearer: Option<&str>,
    ) -> Result<RawResponse> {
        let mut request = self.client.get(url).headers(self.base_headers());
        if let Some(token) = bearer.filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }
        self.send(ctx, request).await
    }

    /// A plain GET that only asks for JSON, used for the secret table.
    pub async fn get_plain(&self, ctx: &RequestContext, url: &str) -> Result<RawResponse> {
        let request = self.client.get(url).header(ACCEPT, "application/json");
        self.send(ctx, request).await
    }

    /// A form POST, used by the OAuth token endpoint.
    pub async fn post_form(
        &self,
        ctx: &RequestContext,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<RawResponse> {
        let request = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .form(form);
        self.send(ctx, request).await
    }

    /// Fetches an API endpoint with a bearer token and returns the raw body.
    ///
    /// Network errors and 502/503/504 are retried with a short linear delay.
    /// A 429 records a cooldown with the rate limiter; the request waits it
    /// out when it fits the caller's budget, at most
    /// `api_rate_limit_retries` times. A 401 clears the cached token.
    pub async fn fetch_json_body(
        &self,
        ctx: &RequestContext,
        endpoint: &str,
        token: &str,
    ) -> Result<Bytes> {
        debug!("api GET {}", endpoint);
        let host = utils::host_of(endpoint);
        let policy = self.policy();
        let budget = policy.wait_budget(ctx);
        let mut rate_limited = 0u32;
        let mut transient = 0u32;

        for attempt in 1..=policy.api_attempts {
            self.limiter.gate(ctx, &host).await?;
            let started = tokio::time::Instant::now();

            let response = match self.get(ctx, endpoint, Some(token)).await {
                Ok(r) => r,
                Err(Error::Network(msg)) if transient < policy.api_transient_retries => {
                    transient += 1;
                    debug!(
                        "api request error (attempt={} elapsed={}ms): {}",
                        attempt,
                        started.elapsed().as_millis(),
                        msg
                    );
                    ctx.sleep(Duration::from_millis(250) * transient).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            debug!(
                "api response status={} elapsed={}ms",
                response.status.as_u16(),
                started.elapsed().as_millis()
            );

            match response.status {
                StatusCode::TOO_MANY_REQUESTS => {
                    rate_limited += 1;
                    let retry_after = utils::parse_retry_after(
                        response.retry_after.as_deref(),
                        policy.default_retry_after,
                    );
                    let cooldown = self.limiter.note_rate_limited(&host, Some(retry_after));
                    let wait = cooldown.remaining();
                    debug!(
                        "api 429 rate-limited retry-after={}s wait={}s",
                        retry_after.as_secs(),
                        wait.as_secs()
                    );
                    if rate_limited <= policy.api_rate_limit_retries && wait <= budget {
                        continue;
                    }
                    return Err(Error::RateLimited {
                        host,
                        endpoint: Some(endpoint.to_string()),
                        retry_after: Some(retry_after),
                        wait,
                        cooldown_until: cooldown.until_utc(),
                        backoff: cooldown.backoff,
                    });
                }
                StatusCode::UNAUTHORIZED => {
                    if !token.is_empty() {
                        self.token_slot.clear();
                    }
                    return Err(Error::Unauthorized {
                        endpoint: endpoint.to_string(),
                        body: response.preview(350),
                    });
                }
                StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
                    if transient < policy.api_transient_retries =>
                {
                    transient += 1;
                    ctx.sleep(Duration::from_millis(350) * transient).await?;
                    continue;
                }
                status if !status.is_success() => {
                    let body = response.preview(900);
                    debug!(
                        "api non-200 status={} endpoint={} body(peek)={}",
                        status.as_u16(),
                        endpoint,
                        body
                    );
                    return Err(Error::Upstream {
                        status: status.as_u16(),
                        endpoint: endpoint.to_string(),
                        body,
                    });
                }
                _ => {
                    self.limiter.note_success(&host);
                    return Ok(response.body);
                }
            }
        }

        Err(Error::Network(format!(
            "spotify API failed after retries for {endpoint}"
        )))
    }
}
