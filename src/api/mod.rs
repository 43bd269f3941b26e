//! # API Module
//!
//! HTTP endpoints of the loopback server started during `auth login`.
//!
//! - [`callback`] receives the redirect from Spotify's authorization server
//!   and records either the authorization code or the reported error in the
//!   shared login session. The login flow picks it up from there and performs
//!   the PKCE code exchange.
//! - [`health`] reports the service name and version.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use axum::{Router, routing::get};
//! use spotmeta::api::{callback, health};
//!
//! let app = Router::new()
//!     .route("/callback", get(callback))
//!     .route("/health", get(health));
//! ```

mod callback;
mod health;

pub use callback::callback;
pub use health::health;
