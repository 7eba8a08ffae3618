use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha1::Sha1;
use sha2::{Digest, Sha256};

const CODE_VERIFIER_LENGTH: usize = 128;
const STATE_LENGTH: usize = 32;

pub fn generate_code_verifier() -> String {
    random_alphanumeric(CODE_VERIFIER_LENGTH)
}

pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

pub fn generate_state() -> String {
    random_alphanumeric(STATE_LENGTH)
}

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Joins a provider API base and an endpoint. Absolute endpoints are kept as is.
pub fn join_url(base: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    if base.is_empty() {
        return endpoint.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Extracts the cookie value from a pasted block of browser request headers.
///
/// Accepts either a bare cookie string (`a=1; b=2`) or a header dump that
/// contains a `cookie:` line; returns `None` for blank input.
pub fn extract_cookie(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let from_header = trimmed.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("cookie")
            .then(|| value.trim().to_string())
    });

    match from_header {
        Some(cookie) if !cookie.is_empty() => Some(cookie),
        Some(_) => None,
        None => Some(trimmed.lines().map(str::trim).collect::<Vec<_>>().join(" ")),
    }
}

/// Reads a single `name=value` pair out of a cookie string.
pub fn cookie_value(cookie: &str, name: &str) -> Option<String> {
    cookie.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// The `SAPISID` value Google signs requests with. Newer browser sessions
/// only carry the `__Secure-3PAPISID` copy.
pub fn sapisid(cookie: &str) -> Option<String> {
    cookie_value(cookie, "SAPISID").or_else(|| cookie_value(cookie, "__Secure-3PAPISID"))
}

/// `Authorization` value for Google cookie sessions:
/// `SAPISIDHASH <ts>_<hex sha1("<ts> <sapisid> <origin>")>`.
pub fn sapisid_hash(sapisid: &str, origin: &str, timestamp: i64) -> String {
    let digest = Sha1::digest(format!("{timestamp} {sapisid} {origin}").as_bytes());
    format!("SAPISIDHASH {timestamp}_{digest:x}")
}
