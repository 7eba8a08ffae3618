//! Shared login and API dispatch for music-service command-line clients.
//!
//! One core handles credentials for every provider: OAuth 2.0 with PKCE
//! (Spotify), QR-code scan-and-confirm (Netease Cloud Music) and pasted session
//! cookies (QQ Music, YouTube Music). Credentials are kept in one JSON file per
//! provider; API calls go through a gateway that refreshes once on an
//! authorization failure.
//!
//! # Modules
//!
//! - `api` - Route handler of the local OAuth redirect listener
//! - `auth` - The three authenticator variants
//! - `cli` - Command-line interface implementations
//! - `config` - Configuration management and environment variables
//! - `error` - Error types of the store, the authenticators and the gateway
//! - `gateway` - Authenticated API calls with a single refresh-and-retry
//! - `management` - Credential store and per-provider session manager
//! - `providers` - Per-provider adapters
//! - `server` - Local HTTP server for OAuth redirects
//! - `types` - Data structures and type definitions
//! - `utils` - PKCE helpers, URL and cookie utilities
//!
//! # Example
//!
//! ```
//! use earshot::{gateway::ApiGateway, providers::{self, Provider}};
//!
//! #[tokio::main]
//! async fn main() -> earshot::Res<()> {
//!     earshot::config::load_env().await?;
//!     let http = providers::build_http_client()?;
//!     let session = Provider::Spotify.session(http.clone()).await;
//!     let mut gateway = ApiGateway::new(http, session);
//!     println!("{}", gateway.get("/me").await?.body);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod management;
pub mod providers;
pub mod server;
pub mod types;
pub mod utils;

pub use auth::Authenticator;
pub use error::{ApiError, AuthError, StoreError};
pub use gateway::ApiGateway;
pub use management::{CredentialStore, SessionManager};
pub use types::{Credential, CredentialKind, ProviderConfig};

/// Boxed result used by the binary and the CLI layer, where errors of
/// different modules meet and are only printed.
///
/// ```
/// use earshot::Res;
///
/// async fn client_id() -> Res<String> {
///     Ok(earshot::config::spotify_client_id().await.unwrap_or_default())
/// }
/// ```
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Prints an informational line with a blue `o` marker to stdout.
///
/// ```
/// info!("Waiting for the redirect on {}", addr);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success line with a green checkmark to stdout.
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error with a red `!` marker to stderr and exits with status 1.
///
/// Only for fatal problems in the CLI layer; library code returns errors.
///
/// ```
/// error!("Login to {} failed. Err: {}", provider, e);
/// // not reached
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning with a yellow `!` marker to stderr.
///
/// Stdout stays reserved for command output such as `earshot call` bodies.
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
