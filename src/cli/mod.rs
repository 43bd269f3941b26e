//! # CLI Module
//!
//! The command-line layer of spotmeta. Each command builds a
//! [`SpotifyClient`](crate::spotify::SpotifyClient) from the environment,
//! runs one operation and reports the outcome.
//!
//! ## Commands
//!
//! - [`fetch`] - Resolves a Spotify link and prints its metadata as JSON, or
//!   as a track table with `--table`
//! - [`token`] - Prints a bearer token for downstream tools
//! - [`login`], [`status`], [`logout`] - Manage the optional OAuth login
//!
//! ## Output
//!
//! Results go to stdout. Progress spinners, status lines and diagnostics go to
//! stderr, so `spotmeta fetch <url> > out.json` yields clean JSON.
//!
//! ## Usage Patterns
//!
//! ```bash
//! spotmeta fetch https://open.spotify.com/album/4aawyAB9vmqN3uQ7FjRGTy
//! spotmeta fetch spotify:playlist:37i9dQZF1DXcBWIGoYBM5M --batch --delay 500
//! spotmeta fetch https://open.spotify.com/artist/0OdUWJ0sBjDrqHygGUXeCF/discography/single --table
//! spotmeta token
//! spotmeta auth login --client-id <id>
//! ```
//!
//! Failures terminate the process through the `error!` macro with exit code 1.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

mod auth;
mod fetch;
mod token;

pub use auth::{login, logout, status};
pub use fetch::fetch;
pub use token::token;

/// A steadily ticking spinner on stderr.
fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb
}
