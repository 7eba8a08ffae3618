//! Per-provider adapters.
//!
//! Each adapter supplies a [`ProviderConfig`] and picks the authenticator
//! variant its service needs. Apple Music lookups are anonymous and have no
//! adapter here.

mod netease;
mod qqmusic;
mod spotify;
mod ytmusic;

use std::{fmt, str::FromStr, sync::Arc};

use reqwest::Client;

pub use netease::NeteaseQr;
pub use qqmusic::{QqQr, hash33};

use crate::{
    auth::{
        Authenticator, CookieAuthenticator, PkceAuthenticator, PollingLoginAuthenticator,
        QrProtocol,
    },
    config,
    management::{CredentialStore, SessionManager},
    types::ProviderConfig,
};

/// Desktop browser User-Agent sent to providers that reject unknown clients.
pub(crate) const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Spotify,
    Netease,
    QqMusic,
    YtMusic,
}

impl Provider {
    pub fn all() -> [Provider; 4] {
        [
            Provider::Spotify,
            Provider::Netease,
            Provider::QqMusic,
            Provider::YtMusic,
        ]
    }

    pub fn id(&self) -> &'static str {
        match self {
            Provider::Spotify => "spotify",
            Provider::Netease => "netease",
            Provider::QqMusic => "qqmusic",
            Provider::YtMusic => "ytmusic",
        }
    }

    /// Provider configuration, with user settings (client id, API server)
    /// resolved from the environment and `settings.json`.
    pub async fn config(&self) -> ProviderConfig {
        match self {
            Provider::Spotify => {
                spotify::config(config::spotify_client_id().await.unwrap_or_default())
            }
            Provider::Netease => netease::config(&config::netease_api_url()),
            Provider::QqMusic => qqmusic::config(),
            Provider::YtMusic => ytmusic::config(),
        }
    }

    pub fn authenticator(&self, http: Client) -> Authenticator {
        match self {
            Provider::Spotify => {
                Authenticator::Pkce(PkceAuthenticator::new(http, config::callback_timeout()))
            }
            Provider::Netease => Authenticator::Polling(PollingLoginAuthenticator::new(
                http,
                Arc::new(NeteaseQr),
                config::qr_poll_interval(),
                config::qr_max_attempts(),
            )),
            // QQ Music also has a QR login, see `qr_authenticator`
            Provider::QqMusic | Provider::YtMusic => {
                Authenticator::Cookie(CookieAuthenticator::new(http))
            }
        }
    }

    /// QR scan login, for providers that offer one next to their default flow.
    pub fn qr_authenticator(&self, http: Client) -> Option<Authenticator> {
        let protocol: Arc<dyn QrProtocol> = match self {
            Provider::Netease => Arc::new(NeteaseQr),
            Provider::QqMusic => Arc::new(QqQr::default()),
            Provider::Spotify | Provider::YtMusic => return None,
        };
        Some(Authenticator::Polling(PollingLoginAuthenticator::new(
            http,
            protocol,
            config::qr_poll_interval(),
            config::qr_max_attempts(),
        )))
    }

    /// Wires config, authenticator and the default credential store together.
    pub async fn session(&self, http: Client) -> SessionManager {
        SessionManager::new(
            self.config().await,
            self.authenticator(http),
            CredentialStore::default_location(),
        )
    }

    /// Like [`Provider::session`], but logging in by QR scan. `None` when the
    /// provider has no QR login.
    pub async fn qr_session(&self, http: Client) -> Option<SessionManager> {
        let authenticator = self.qr_authenticator(http)?;
        Some(SessionManager::new(
            self.config().await,
            authenticator,
            CredentialStore::default_location(),
        ))
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spotify" => Ok(Provider::Spotify),
            "netease" | "ncm" => Ok(Provider::Netease),
            "qqmusic" | "qq" => Ok(Provider::QqMusic),
            "ytmusic" | "youtube" => Ok(Provider::YtMusic),
            "itunes" | "apple" | "applemusic" => {
                Err(format!("{s} needs no login and has no adapter"))
            }
            other => Err(format!(
                "unknown provider '{other}', expected one of: spotify, netease, qqmusic, ytmusic"
            )),
        }
    }
}

/// HTTP client shared by authenticators and the gateway.
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(config::http_timeout())
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
}
