use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{
    Client, RequestBuilder,
    header::{self, HeaderMap},
    redirect,
};
use serde_json::json;
use tracing::debug;

use crate::{
    auth::{PollOutcome, QrProtocol, QrTicket, SessionArtifacts},
    config,
    error::{AuthError, truncate_body},
    providers::DESKTOP_USER_AGENT,
    types::{ExpiryRule, ProviderConfig, QrLoginSession},
    utils,
};

const API_BASE: &str = "https://u.y.qq.com";
const MUSICU_ENDPOINT: &str = "/cgi-bin/musicu.fcg";

const PTLOGIN_BASE: &str = "https://ssl.ptlogin2.qq.com";
const APP_ID: &str = "716027609";
const DOMAIN_ID: &str = "383";

/// Cookie login against the unified `musicu.fcg` endpoint. The probe asks for
/// the user's base info; a `req.code` of 1000 means the cookie is no longer
/// accepted.
pub fn config() -> ProviderConfig {
    let probe = json!({
        "comm": { "ct": 19, "cv": 1859 },
        "req": {
            "module": "userInfo.BaseUserInfoServer",
            "method": "get_user_baseinfo_v2",
            "param": {}
        }
    });

    ProviderConfig::new("qqmusic")
        .with_api_base(API_BASE)
        .with_probe(MUSICU_ENDPOINT, Some(probe))
        .with_expiry_rule(ExpiryRule::new("/req/code", &[1000]))
        .with_header("Referer", "https://y.qq.com")
        .with_header("User-Agent", DESKTOP_USER_AGENT)
}

/// QR login through QQ's `ptlogin2` service.
///
/// `ptqrshow` returns the QR image and a `qrsig` cookie. Every `ptqrlogin`
/// check sends that cookie plus its [`hash33`] as `ptqrtoken`, and answers
/// with a `ptuiCB('<code>', ...)` callback:
///
/// | code | meaning |
/// |---|---|
/// | 66 | waiting for scan |
/// | 67 | scanned, waiting for confirmation |
/// | 65 | QR code expired |
/// | 0 | confirmed; the third argument is a redirect that sets the session cookies |
#[derive(Debug, Clone)]
pub struct QqQr {
    login_base: String,
}

impl QqQr {
    /// Talks to a ptlogin2-compatible server at `login_base`.
    pub fn new(login_base: impl Into<String>) -> Self {
        QqQr {
            login_base: login_base.into(),
        }
    }

    /// Collects the session cookies after a confirmed scan: the ones set by
    /// `ptqrlogin` itself and the ones set by its redirect target, which is
    /// requested once without following further redirects.
    async fn collect_session(
        &self,
        config: &ProviderConfig,
        mut jar: CookieJar,
        callback: &PtuiCallback,
    ) -> Result<SessionArtifacts, AuthError> {
        if let Some(redirect_url) = callback.redirect_url() {
            let no_redirect = Client::builder()
                .redirect(redirect::Policy::none())
                .timeout(config::http_timeout())
                .build()?;
            let response = with_headers(no_redirect.get(redirect_url), config)
                .header(header::COOKIE, jar.header())
                .send()
                .await?;
            debug!(provider = %config.provider_id, status = response.status().as_u16(), "followed login redirect");
            jar.absorb(response.headers());
        }

        let mut extra = BTreeMap::new();
        if let Some(nickname) = callback.nickname() {
            extra.insert("nickname".to_string(), nickname.to_string());
        }
        let cookie = jar.header();
        if let Some(uin) = utils::cookie_value(&cookie, "uin") {
            extra.insert("uin".to_string(), uin);
        }

        Ok(SessionArtifacts { cookie, extra })
    }
}

impl Default for QqQr {
    fn default() -> Self {
        Self::new(PTLOGIN_BASE)
    }
}

#[async_trait]
impl QrProtocol for QqQr {
    async fn request_login_key(
        &self,
        http: &Client,
        config: &ProviderConfig,
    ) -> Result<QrTicket, AuthError> {
        let url = utils::join_url(&self.login_base, "/ptqrshow");
        let cache_buster = rand::random::<f64>().to_string();
        let response = with_headers(http.get(&url), config)
            .query(&[
                ("appid", APP_ID),
                ("e", "2"),
                ("l", "M"),
                ("s", "3"),
                ("d", "72"),
                ("v", "4"),
                ("t", cache_buster.as_str()),
                ("daid", DOMAIN_ID),
                ("pt_3rd_aid", "100497308"),
            ])
            .send()
            .await?;

        let status = response.status();
        let mut jar = CookieJar::default();
        jar.absorb(response.headers());
        let image = response.bytes().await?;
        if !status.is_success() {
            return Err(AuthError::Transport(format!(
                "ptqrshow returned HTTP {}",
                status.as_u16()
            )));
        }

        let qrsig = jar
            .get("qrsig")
            .ok_or_else(|| AuthError::Rejected("ptqrshow did not set a qrsig cookie".to_string()))?
            .to_string();

        Ok(QrTicket {
            login_key: hash33(&qrsig).to_string(),
            login_url: url,
            qr_image: Some(image.to_vec()),
            context: BTreeMap::from([("qrsig".to_string(), qrsig)]),
        })
    }

    async fn check_status(
        &self,
        http: &Client,
        config: &ProviderConfig,
        session: &QrLoginSession,
    ) -> Result<PollOutcome, AuthError> {
        let qrsig = session
            .context
            .get("qrsig")
            .ok_or_else(|| AuthError::Rejected("QR session has no qrsig".to_string()))?;

        let url = utils::join_url(&self.login_base, "/ptqrlogin");
        let action = format!("0-0-{}", Utc::now().timestamp_millis());
        let response = with_headers(http.get(&url), config)
            .header(header::COOKIE, format!("qrsig={qrsig}"))
            .query(&[
                ("u1", "https://y.qq.com"),
                ("ptqrtoken", session.login_key.as_str()),
                ("ptredirect", "0"),
                ("h", "1"),
                ("t", "1"),
                ("g", "1"),
                ("from_ui", "1"),
                ("ptlang", "2052"),
                ("action", action.as_str()),
                ("js_ver", "20102616"),
                ("js_type", "1"),
                ("pt_uistyle", "40"),
                ("aid", APP_ID),
                ("daid", DOMAIN_ID),
            ])
            .send()
            .await?;

        let mut jar = CookieJar::default();
        jar.set("qrsig", qrsig);
        jar.absorb(response.headers());
        let body = response.text().await?;

        let callback = PtuiCallback::parse(&body).ok_or_else(|| {
            AuthError::Rejected(format!("unexpected ptqrlogin response: {}", truncate_body(&body)))
        })?;
        debug!(provider = %config.provider_id, code = callback.code(), "QR status checked");

        Ok(match callback.code() {
            "66" => PollOutcome::Pending,
            "67" => PollOutcome::Scanned,
            "65" => PollOutcome::Expired,
            "0" => PollOutcome::Confirmed(self.collect_session(config, jar, &callback).await?),
            other => PollOutcome::Unrecognized(match callback.message() {
                Some(message) => format!("{other} ({message})"),
                None => other.to_string(),
            }),
        })
    }
}

/// Token ptlogin2 derives from `qrsig`: a 33-multiplier string hash folded to
/// 31 bits.
pub fn hash33(value: &str) -> u32 {
    let hash = value.chars().fold(0u64, |hash, c| {
        hash.wrapping_add(hash << 5).wrapping_add(u64::from(c))
    });
    (hash & 0x7fff_ffff) as u32
}

fn with_headers(request: RequestBuilder, config: &ProviderConfig) -> RequestBuilder {
    config
        .default_headers
        .iter()
        .fold(request, |req, (name, value)| req.header(name, value))
}

/// Arguments of a `ptuiCB('a', 'b', ...)` callback body.
#[derive(Debug)]
struct PtuiCallback {
    args: Vec<String>,
}

impl PtuiCallback {
    fn parse(body: &str) -> Option<Self> {
        let start = body.find("ptuiCB(")? + "ptuiCB(".len();
        let inner = &body[start..];
        let inner = inner.rfind(')').map_or(inner, |end| &inner[..end]);
        // quoted arguments sit at the odd positions once split on quotes
        let args: Vec<String> = inner
            .split('\'')
            .skip(1)
            .step_by(2)
            .map(str::to_string)
            .collect();
        (!args.is_empty()).then_some(PtuiCallback { args })
    }

    fn arg(&self, index: usize) -> Option<&str> {
        self.args
            .get(index)
            .map(String::as_str)
            .filter(|arg| !arg.is_empty())
    }

    fn code(&self) -> &str {
        self.arg(0).unwrap_or_default()
    }

    fn redirect_url(&self) -> Option<&str> {
        self.arg(2)
            .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
    }

    fn message(&self) -> Option<&str> {
        self.arg(4)
    }

    fn nickname(&self) -> Option<&str> {
        self.arg(5)
    }
}

/// Cookies gathered across the login requests, in arrival order. A cookie
/// set to an empty value is dropped.
#[derive(Debug, Default)]
struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    fn set(&mut self, name: &str, value: &str) {
        self.cookies.retain(|(existing, _)| existing != name);
        if !value.is_empty() {
            self.cookies.push((name.to_string(), value.to_string()));
        }
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    fn absorb(&mut self, headers: &HeaderMap) {
        for line in headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
        {
            let pair = line.split(';').next().unwrap_or_default();
            if let Some((name, value)) = pair.split_once('=') {
                self.set(name.trim(), value.trim());
            }
        }
    }

    fn header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
