//! # CLI Module
//!
//! Subcommand bodies for the `earshot` binary. Each function owns the user
//! interaction for one command (prompts, spinners, tables, coloured output)
//! and delegates the work to the session and gateway layers:
//!
//! ```text
//! CLI Layer (prompts, spinners, tables)
//!     ↓
//! providers (ProviderConfig + Authenticator per service)
//!     ↓
//! SessionManager / ApiGateway
//!     ↓
//! authenticators, CredentialStore, HTTP
//! ```
//!
//! ## Commands
//!
//! - [`login`] - interactive login (browser redirect, QR scan or pasted cookie)
//! - [`logout`] - forget the stored credential
//! - [`status`] - table of login state per provider
//! - [`call`] - one authenticated API request, body printed to stdout
//! - [`settings`] - show or change persisted adapter settings
//!
//! Fatal problems are reported with the crate's `error!` macro, which prints
//! and exits with status 1.

mod call;
mod login;
mod logout;
mod settings;
mod status;

pub use call::call;
pub use login::login;
pub use logout::logout;
pub use settings::settings;
pub use status::status;

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;

use crate::{error, providers};

fn spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb
}

fn http_client() -> Client {
    match providers::build_http_client() {
        Ok(client) => client,
        Err(e) => error!("Cannot build HTTP client. Err: {}", e),
    }
}
