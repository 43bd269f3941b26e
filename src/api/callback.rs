use std::collections::HashMap;

use axum::{Extension, extract::Query, http::StatusCode, response::Html};

use crate::{debug, spotify::auth::SharedSession};

/// Records the outcome of the authorization redirect in the login session.
///
/// The code exchange itself happens in the login flow once it sees the code.
pub async fn callback(
    Query(params): Query<HashMap<String, String>>,
    Extension(shared_state): Extension<SharedSession>,
) -> (StatusCode, Html<&'static str>) {
    let mut state = shared_state.lock().await;
    let Some(session) = state.as_mut() else {
        return (
            StatusCode::BAD_REQUEST,
            Html("<h4>No login in progress.</h4>"),
        );
    };
    if session.is_finished() {
        return (
            StatusCode::CONFLICT,
            Html("<h4>Login already completed.</h4>"),
        );
    }

    if let Some(err) = params.get("error") {
        debug!("oauth callback error={}", err);
        session.error = Some(err.clone());
        return (StatusCode::BAD_REQUEST, Html("<h4>Login failed.</h4>"));
    }

    if params.get("state").map(String::as_str) != Some(session.state.as_str()) {
        session.error = Some("state mismatch".to_string());
        return (
            StatusCode::BAD_REQUEST,
            Html("<h4>Login failed: state mismatch.</h4>"),
        );
    }

    match params.get("code").filter(|c| !c.is_empty()) {
        Some(code) => {
            session.code = Some(code.clone());
            (
                StatusCode::OK,
                Html("<h2>Authentication successful.</h2><p>You can close this window.</p>"),
            )
        }
        None => {
            session.error = Some("missing authorization code".to_string());
            (
                StatusCode::BAD_REQUEST,
                Html("<h4>Missing authorization code.</h4>"),
            )
        }
    }
}
