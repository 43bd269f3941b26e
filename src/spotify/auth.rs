use std::{sync::Arc, time::Duration};

use chrono::Utc;
use reqwest::Url;
use tokio::{net::TcpListener, sync::Mutex};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{self, Endpoints},
    context::RequestContext,
    debug,
    error::{Error, Result},
    info,
    management::OAuthTokenManager,
    server::start_callback_server,
    spotify::http::HttpCore,
    types::{OAuthToken, OAuthTokenResponse, PkceSession},
    utils, warning,
};

/// Session state shared with the callback handler.
pub type SharedSession = Arc<Mutex<Option<PkceSession>>>;

/// Runs the OAuth 2.0 PKCE login and stores the resulting token.
///
/// The flow:
/// 1. Generates a code verifier, its S256 challenge and a random `state`
/// 2. Starts the loopback callback server on an ephemeral port
/// 3. Opens the authorization URL in the default browser
/// 4. Waits up to `timeout` for the callback to deliver a code
/// 5. Exchanges the code for a token and persists it through `store`
///
/// # Errors
///
/// [`Error::OAuth`] when the provider reports an error, the `state` does not
/// match, the callback carries no code, the wait times out or the exchange
/// fails. [`Error::Io`] when the server cannot bind or the token cannot be
/// written.
pub async fn login(
    http: &HttpCore,
    endpoints: &Endpoints,
    store: &OAuthTokenManager,
    client_id: &str,
    timeout: Duration,
) -> Result<OAuthToken> {
    let client_id = client_id.trim();
    if client_id.is_empty() {
        return Err(Error::OAuth("spotify client id is required".into()));
    }

    // generate PKCE verifier, challenge and state
    let code_verifier = utils::generate_code_verifier();
    let code_challenge = utils::generate_code_challenge(&code_verifier);
    let state = utils::random_url_safe(32);

    let listener = TcpListener::bind(config::oauth_callback_addr()).await?;
    let port = listener.local_addr()?.port();
    let redirect_uri = format!("http://127.0.0.1:{port}/callback");

    let session: SharedSession = Arc::new(Mutex::new(Some(PkceSession::new(
        code_verifier.clone(),
        state.clone(),
        redirect_uri.clone(),
    ))));

    let shutdown = CancellationToken::new();
    let server_state = Arc::clone(&session);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = start_callback_server(listener, server_state, server_shutdown).await {
            warning!("OAuth callback server stopped: {}", e);
        }
    });

    let auth_url = build_authorize_url(
        &endpoints.authorize_url(),
        client_id,
        &redirect_uri,
        &state,
        &code_challenge,
    )?;

    info!("Waiting for Spotify authorization on {}", redirect_uri);
    if webbrowser::open(&auth_url).is_err() {
        warning!(
            "Failed to open browser. Please navigate to the following URL manually:\n{}",
            auth_url
        )
    }

    let waited = wait_for_code(&session, timeout).await;
    shutdown.cancel();
    let code = waited?;

    let ctx = RequestContext::with_timeout(Duration::from_secs(30));
    let token = exchange_code(
        http,
        &ctx,
        &endpoints.accounts_token_url(),
        client_id,
        &code,
        &redirect_uri,
        &code_verifier,
    )
    .await?;
    store.persist(&token).await?;
    Ok(token)
}

/// Builds the authorize URL. No scopes are requested; public metadata needs none.
pub fn build_authorize_url(
    authorize_url: &str,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
    code_challenge: &str,
) -> Result<String> {
    let mut url = Url::parse(authorize_url)
        .map_err(|e| Error::OAuth(format!("invalid authorize url: {e}")))?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("state", state)
        .append_pair("code_challenge_method", "S256")
        .append_pair("code_challenge", code_challenge);
    Ok(url.to_string())
}

/// Polls the shared session until the callback finished or `timeout` passed.
async fn wait_for_code(session: &SharedSession, timeout: Duration) -> Result<String> {
    let ctx = RequestContext::with_timeout(timeout);
    loop {
        {
            let lock = session.lock().await;
            if let Some(s) = lock.as_ref() {
                if let Some(err) = &s.error {
                    return Err(Error::OAuth(format!("spotify login failed: {err}")));
                }
                if let Some(code) = &s.code {
                    return Ok(code.clone());
                }
            }
        }
        if ctx.sleep(Duration::from_millis(500)).await.is_err() {
            return Err(Error::OAuth(
                "authentication failed or timed out waiting for the callback".into(),
            ));
        }
    }
}

/// Exchanges an authorization code for a token using the PKCE verifier.
pub async fn exchange_code(
    http: &HttpCore,
    ctx: &RequestContext,
    token_url: &str,
    client_id: &str,
    code: &str,
    redirect_uri: &str,
    verifier: &str,
) -> Result<OAuthToken> {
    let form = [
        ("grant_type", "authorization_code"),
        ("client_id", client_id),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("code_verifier", verifier),
    ];
    let response = request_token(http, ctx, token_url, &form).await?;
    into_oauth_token(response, client_id, None)
}

/// Exchanges a refresh token for a new access token.
///
/// Spotify may or may not rotate the refresh token; the old one is kept when
/// the response carries none.
pub async fn refresh_token(
    http: &HttpCore,
    ctx: &RequestContext,
    token_url: &str,
    client_id: &str,
    refresh_token: &str,
) -> Result<OAuthToken> {
    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", client_id),
    ];
    let response = request_token(http, ctx, token_url, &form).await?;
    into_oauth_token(response, client_id, Some(refresh_token))
}

async fn request_token(
    http: &HttpCore,
    ctx: &RequestContext,
    token_url: &str,
    form: &[(&str, &str)],
) -> Result<OAuthTokenResponse> {
    debug!("oauth POST {}", token_url);
    let host = utils::host_of(token_url);
    http.limiter().gate(ctx, &host).await?;
    let response = http.post_form(ctx, token_url, form).await?;
    if !response.status.is_success() {
        return Err(Error::OAuth(format!(
            "token endpoint returned status {} body={:?}",
            response.status.as_u16(),
            response.preview(300)
        )));
    }
    Ok(serde_json::from_slice(&response.body)?)
}

fn into_oauth_token(
    response: OAuthTokenResponse,
    client_id: &str,
    previous_refresh: Option<&str>,
) -> Result<OAuthToken> {
    if response.access_token.trim().is_empty() {
        return Err(Error::OAuth("token endpoint returned no access token".into()));
    }
    let now = Utc::now();
    let expires_in = if response.expires_in > 0 {
        response.expires_in
    } else {
        3600
    };
    let refresh_token = response
        .refresh_token
        .filter(|r| !r.trim().is_empty())
        .or_else(|| previous_refresh.map(str::to_string));

    Ok(OAuthToken {
        client_id: client_id.to_string(),
        access_token: response.access_token,
        refresh_token,
        expires_at: now + chrono::Duration::seconds(expires_in),
        token_type: response.token_type,
        scope: response.scope,
        last_updated_at: now,
    })
}
