use std::time::Duration;

use serde_json::json;

use crate::{RequestContext, cli::spinner, error, spotify::SpotifyClient};

/// Prints a bearer token with its source and expiry as JSON.
pub async fn token(timeout: Duration) {
    let client = match SpotifyClient::from_env() {
        Ok(c) => c,
        Err(e) => error!("Failed to create Spotify client: {}", e),
    };

    let ctx = if timeout.is_zero() {
        RequestContext::new()
    } else {
        RequestContext::with_timeout(timeout)
    };

    let pb = spinner("Requesting access token...");
    let result = client.get_access_token(&ctx).await;
    pb.finish_and_clear();

    let token = match result {
        Ok(t) => t,
        Err(e) => error!("{}", e),
    };

    let out = json!({
        "access_token": token.value,
        "source": token.source.to_string(),
        "expires_at": token.expires_at.to_rfc3339(),
    });
    match serde_json::to_string_pretty(&out) {
        Ok(s) => println!("{s}"),
        Err(e) => error!("Failed to serialize token: {}", e),
    }
}
