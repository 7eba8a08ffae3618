use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabled::Tabled;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialKind {
    #[serde(rename = "oauth_token")]
    OAuthToken,
    #[serde(rename = "session_cookie")]
    SessionCookie,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::OAuthToken => write!(f, "oauth"),
            CredentialKind::SessionCookie => write!(f, "cookie"),
        }
    }
}

/// A provider credential as persisted in `<provider>.json`.
///
/// OAuth credentials carry `access_token` (plus optional refresh token and
/// expiry); cookie credentials carry only `raw_cookie`. `extra` holds
/// provider-specific fields such as a csrf token or a user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub provider_id: String,
    pub kind: CredentialKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_cookie: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Credential {
    pub fn oauth(provider_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Credential {
            provider_id: provider_id.into(),
            kind: CredentialKind::OAuthToken,
            access_token: Some(access_token.into()),
            refresh_token: None,
            expires_at: None,
            raw_cookie: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn cookie(provider_id: impl Into<String>, raw_cookie: impl Into<String>) -> Self {
        Credential {
            provider_id: provider_id.into(),
            kind: CredentialKind::SessionCookie,
            access_token: None,
            refresh_token: None,
            expires_at: None,
            raw_cookie: Some(raw_cookie.into()),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_refresh(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// OAuth credentials expire once `now >= expires_at`. Cookies carry no
    /// expiry of their own; only a failed probe marks them expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.kind {
            CredentialKind::OAuthToken => self.expires_at.is_some_and(|at| now >= at),
            CredentialKind::SessionCookie => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Checks that exactly the fields matching `kind` are populated.
    pub fn check_shape(&self) -> Result<(), String> {
        let oauth_fields =
            self.access_token.is_some() || self.refresh_token.is_some() || self.expires_at.is_some();
        match self.kind {
            CredentialKind::OAuthToken if self.access_token.is_none() => {
                Err("oauth credential without access_token".to_string())
            }
            CredentialKind::OAuthToken if self.raw_cookie.is_some() => {
                Err("oauth credential also carries a cookie".to_string())
            }
            CredentialKind::SessionCookie if self.raw_cookie.is_none() => {
                Err("cookie credential without raw_cookie".to_string())
            }
            CredentialKind::SessionCookie if oauth_fields => {
                Err("cookie credential also carries oauth fields".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Marks a provider payload as "session expired" when the integer found at
/// `pointer` (a JSON pointer such as `/code`) is one of `codes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryRule {
    pub pointer: String,
    pub codes: Vec<i64>,
}

impl ExpiryRule {
    pub fn new(pointer: impl Into<String>, codes: &[i64]) -> Self {
        ExpiryRule {
            pointer: pointer.into(),
            codes: codes.to_vec(),
        }
    }

    pub fn matches(&self, body: &Value) -> bool {
        body.pointer(&self.pointer)
            .and_then(Value::as_i64)
            .is_some_and(|code| self.codes.contains(&code))
    }
}

/// Static description of a provider, supplied by its adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub auth_endpoint: String,
    pub token_endpoint: String,
    pub client_id: String,
    pub scopes: BTreeSet<String>,
    pub probe_endpoint: String,
    pub redirect_uri: String,
    pub api_base: String,
    pub probe_body: Option<Value>,
    pub expiry_rules: Vec<ExpiryRule>,
    pub default_headers: Vec<(String, String)>,
    /// Origin signed into a `SAPISIDHASH` authorization header on cookie
    /// requests (Google services only).
    pub sapisid_origin: Option<String>,
}

impl ProviderConfig {
    pub fn new(provider_id: impl Into<String>) -> Self {
        ProviderConfig {
            provider_id: provider_id.into(),
            auth_endpoint: String::new(),
            token_endpoint: String::new(),
            client_id: String::new(),
            scopes: BTreeSet::new(),
            probe_endpoint: String::new(),
            redirect_uri: String::new(),
            api_base: String::new(),
            probe_body: None,
            expiry_rules: Vec::new(),
            default_headers: Vec::new(),
            sapisid_origin: None,
        }
    }

    pub fn with_oauth(
        mut self,
        auth_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        self.auth_endpoint = auth_endpoint.into();
        self.token_endpoint = token_endpoint.into();
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_probe(mut self, probe_endpoint: impl Into<String>, body: Option<Value>) -> Self {
        self.probe_endpoint = probe_endpoint.into();
        self.probe_body = body;
        self
    }

    pub fn with_expiry_rule(mut self, rule: ExpiryRule) -> Self {
        self.expiry_rules.push(rule);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_sapisid_hash(mut self, origin: impl Into<String>) -> Self {
        self.sapisid_origin = Some(origin.into());
        self
    }

    /// Space-separated scope list as sent in the authorization URL.
    pub fn scope_param(&self) -> String {
        self.scopes
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// True when `body` is a JSON payload matching one of the provider's
    /// "session expired" rules. Non-JSON bodies never match.
    pub fn is_session_expired_payload(&self, body: &str) -> bool {
        if self.expiry_rules.is_empty() {
            return false;
        }
        match serde_json::from_str::<Value>(body) {
            Ok(json) => self.expiry_rules.iter().any(|rule| rule.matches(&json)),
            Err(_) => false,
        }
    }
}

/// In-memory state of one PKCE login; never persisted.
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub state: String,
    pub code_verifier: String,
    pub code_challenge: String,
    pub redirect_uri: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrStatus {
    Pending,
    Scanned,
    Confirmed,
    Expired,
}

impl fmt::Display for QrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QrStatus::Pending => "waiting for scan",
            QrStatus::Scanned => "scanned, waiting for confirmation",
            QrStatus::Confirmed => "confirmed",
            QrStatus::Expired => "expired",
        };
        write!(f, "{label}")
    }
}

/// In-memory state of one QR login.
///
/// `context` carries provider-specific values needed by later status checks.
#[derive(Debug, Clone)]
pub struct QrLoginSession {
    pub login_key: String,
    pub login_url: String,
    /// PNG image of the QR code when the provider serves one instead of a URL.
    pub qr_image: Option<Vec<u8>>,
    pub status: QrStatus,
    pub created_at: DateTime<Utc>,
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub context: BTreeMap<String, String>,
}

/// Result of probing a cookie credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Expired,
}

#[derive(Tabled)]
pub struct ProviderStatusRow {
    pub provider: String,
    pub kind: String,
    pub status: String,
    pub expires: String,
}
