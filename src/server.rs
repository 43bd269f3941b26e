use axum::{Extension, Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{api, error::Result, spotify::auth::SharedSession};

/// Serves `/health` and the OAuth `/callback` on `listener` until `shutdown`
/// is cancelled.
pub async fn start_callback_server(
    listener: TcpListener,
    state: SharedSession,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = Router::new()
        .route("/health", get(api::health))
        .route("/callback", get(api::callback).layer(Extension(state)));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
