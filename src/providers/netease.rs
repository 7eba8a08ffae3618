use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{
    auth::{PollOutcome, QrProtocol, QrTicket, SessionArtifacts},
    error::{AuthError, truncate_body},
    types::{ExpiryRule, ProviderConfig, QrLoginSession},
    utils,
};

const QR_LOGIN_URL: &str = "https://music.163.com/login?codekey=";

pub fn config(api_base: &str) -> ProviderConfig {
    ProviderConfig::new("netease")
        .with_api_base(api_base)
        .with_probe("/login/status", None)
        .with_expiry_rule(ExpiryRule::new("/code", &[301]))
}

#[derive(Debug, Deserialize)]
struct KeyResponse {
    data: KeyData,
}

#[derive(Debug, Deserialize)]
struct KeyData {
    unikey: String,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    cookie: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
}

/// QR login through a NeteaseCloudMusicApi-compatible server.
///
/// Check codes: 800 expired, 801 waiting for scan, 802 scanned, 803 confirmed
/// (the session cookie is part of the 803 response).
#[derive(Debug, Clone, Copy, Default)]
pub struct NeteaseQr;

impl NeteaseQr {
    fn outcome(response: CheckResponse) -> PollOutcome {
        match response.code {
            800 => PollOutcome::Expired,
            801 => PollOutcome::Pending,
            802 => PollOutcome::Scanned,
            803 => {
                let mut extra = BTreeMap::new();
                if let Some(nickname) = response.nickname {
                    extra.insert("nickname".to_string(), nickname);
                }
                PollOutcome::Confirmed(SessionArtifacts {
                    cookie: response.cookie.unwrap_or_default(),
                    extra,
                })
            }
            other => PollOutcome::Unrecognized(match response.message {
                Some(message) => format!("{other} ({message})"),
                None => other.to_string(),
            }),
        }
    }
}

#[async_trait]
impl QrProtocol for NeteaseQr {
    async fn request_login_key(
        &self,
        http: &Client,
        config: &ProviderConfig,
    ) -> Result<QrTicket, AuthError> {
        let url = utils::join_url(&config.api_base, "/login/qr/key");
        let timestamp = Utc::now().timestamp_millis().to_string();
        let response = http
            .get(&url)
            .query(&[("timestamp", timestamp.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AuthError::Transport(format!(
                "QR key request returned HTTP {}: {}",
                status.as_u16(),
                truncate_body(&body)
            )));
        }

        let key: KeyResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::Rejected(format!("unexpected QR key response ({e}): {}", truncate_body(&body)))
        })?;

        Ok(QrTicket {
            login_url: format!("{QR_LOGIN_URL}{}", key.data.unikey),
            login_key: key.data.unikey,
            qr_image: None,
            context: BTreeMap::new(),
        })
    }

    async fn check_status(
        &self,
        http: &Client,
        config: &ProviderConfig,
        session: &QrLoginSession,
    ) -> Result<PollOutcome, AuthError> {
        let url = utils::join_url(&config.api_base, "/login/qr/check");
        let timestamp = Utc::now().timestamp_millis().to_string();
        let response = http
            .get(&url)
            .query(&[
                ("key", session.login_key.as_str()),
                ("timestamp", timestamp.as_str()),
            ])
            .send()
            .await?;

        // the API answers 800/801/802 with non-2xx HTTP statuses on some versions,
        // so the JSON code is the source of truth
        let body = response.text().await?;
        let check: CheckResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::Rejected(format!("unexpected QR check response ({e}): {}", truncate_body(&body)))
        })?;

        debug!(provider = %config.provider_id, code = check.code, "QR status checked");
        Ok(Self::outcome(check))
    }
}
