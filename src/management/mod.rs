mod auth;
mod secrets;

pub use auth::OAuthTokenManager;
pub use secrets::SecretStore;
