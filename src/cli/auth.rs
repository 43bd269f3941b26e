use std::time::Duration;

use chrono::Utc;

use crate::{config, error, info, spotify::SpotifyClient, success, warning};

fn client() -> SpotifyClient {
    match SpotifyClient::from_env() {
        Ok(c) => c,
        Err(e) => error!("Failed to create Spotify client: {}", e),
    }
}

/// Runs the browser login. The client id comes from `--client-id` or
/// `SPOTIFY_API_AUTH_CLIENT_ID`.
pub async fn login(client_id: Option<String>, timeout: Duration) {
    let Some(client_id) = client_id
        .filter(|c| !c.trim().is_empty())
        .or_else(config::spotify_client_id)
    else {
        error!("Missing client id. Pass --client-id or set SPOTIFY_API_AUTH_CLIENT_ID.");
    };

    match client().login(&client_id, timeout).await {
        Ok(token) => success!(
            "Authentication successful. Token valid until {}",
            token.expires_at.to_rfc3339()
        ),
        Err(e) => error!("Login failed: {}", e),
    }
}

pub async fn status() {
    let status = client().oauth_status().await;
    if !status.enabled {
        info!("Not logged in; anonymous web-player tokens are used.");
        return;
    }

    if let Some(client_id) = &status.client_id {
        info!("Client id: {}", client_id);
    }
    match status.expires_at {
        Some(expires_at) if expires_at > Utc::now() => {
            info!("Access token valid until {}", expires_at.to_rfc3339())
        }
        Some(expires_at) if status.has_refresh => info!(
            "Access token expired at {}; it is refreshed on next use",
            expires_at.to_rfc3339()
        ),
        Some(expires_at) => warning!(
            "Access token expired at {} and cannot be refreshed. Run `auth login` again.",
            expires_at.to_rfc3339()
        ),
        None => {}
    }
}

pub async fn logout() {
    match client().logout().await {
        Ok(()) => success!("Logged out."),
        Err(e) => error!("Failed to remove stored token: {}", e),
    }
}
