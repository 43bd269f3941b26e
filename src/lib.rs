//! Spotify Metadata Client Library
//!
//! This library turns Spotify links and URIs into normalized track, album,
//! playlist, artist and discography data. It authenticates against Spotify's
//! web surface without official client credentials, paces and backs off per
//! host, caches and coalesces identical requests, and walks cursor-paginated
//! listings under caller-supplied deadlines.
//!
//! # Modules
//!
//! - `api` - HTTP endpoints for the local OAuth callback server
//! - `cli` - Command-line interface implementations
//! - `config` - Configuration management and environment variables
//! - `context` - Deadlines and cancellation for every suspension point
//! - `error` - The error taxonomy shared by all components
//! - `management` - On-disk state (OAuth token, secret table mirror)
//! - `server` - Local HTTP server for OAuth callbacks
//! - `spotify` - The metadata client and its components
//! - `types` - Data structures and type definitions
//! - `utils` - Utility functions and helpers
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use spotmeta::spotify::SpotifyClient;
//!
//! #[tokio::main]
//! async fn main() -> spotmeta::Res<()> {
//!     let client = SpotifyClient::from_env()?;
//!     let payload = client
//!         .fetch_metadata(
//!             "https://open.spotify.com/album/4aawyAB9vmqN3uQ7FjRGTy",
//!             false,
//!             Duration::ZERO,
//!             Duration::from_secs(60),
//!         )
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&payload)?);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod management;
pub mod server;
pub mod spotify;
pub mod types;
pub mod utils;

pub use context::RequestContext;
pub use error::{Error, Result};

/// A convenient Result type alias for CLI glue code.
///
/// Library components return [`error::Result`]; this boxed alias is used where
/// errors from several crates meet, mostly in the command-line layer.
///
/// # Example
///
/// ```
/// use spotmeta::Res;
///
/// async fn fetch_data() -> Res<String> {
///     Ok("data".to_string())
/// }
/// ```
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Prints an informational message with a blue bullet point.
///
/// Used for general status updates in the command-line layer. Output goes to
/// stderr so that JSON written to stdout stays machine readable.
///
/// # Example
///
/// ```
/// info!("Fetching {}", url);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
///
/// # Example
///
/// ```
/// success!("Authentication completed successfully");
/// ```
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits the program.
///
/// This macro terminates the process with exit code 1. It is reserved for the
/// command-line layer; library code returns [`Error`] instead.
///
/// # Example
///
/// ```
/// error!("Failed to load configuration");
/// // Program exits here - code after this will not execute
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
///
/// Used for recoverable issues such as a failed best-effort cache write or a
/// skipped album while building a discography.
///
/// # Example
///
/// ```
/// warning!("Could not mirror secrets to disk: {}", e);
/// ```
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a diagnostic line when `SPOTMETA_DEBUG` is enabled.
///
/// The check is done on every call so the variable can be toggled from a
/// `.env` file loaded after startup. Messages never contain bearer tokens or
/// TOTP codes; see [`utils::redact_token_url`].
///
/// # Example
///
/// ```
/// debug!("api cache hit {}", endpoint);
/// ```
#[macro_export]
macro_rules! debug {
  ($($arg:tt)*) => ({
    if $crate::config::debug_enabled() {
      use colored::Colorize;
      eprintln!("[{}] {}", "spotify-debug".dimmed(), std::format_args!($($arg)*));
    }
  })
}
