use serde_json::json;

use crate::{
    providers::DESKTOP_USER_AGENT,
    types::{ExpiryRule, ProviderConfig},
};

const ORIGIN: &str = "https://music.youtube.com";
const ACCOUNT_MENU_ENDPOINT: &str = "/youtubei/v1/account/account_menu?alt=json";
const CLIENT_VERSION: &str = "1.20241016.01.00";

/// Cookie login against the `youtubei/v1` API. Requests carry the cookie plus
/// a `SAPISIDHASH` signature derived from it; the account menu only answers
/// signed, logged-in requests and returns 401 otherwise.
pub fn config() -> ProviderConfig {
    let probe = json!({
        "context": {
            "client": { "clientName": "WEB_REMIX", "clientVersion": CLIENT_VERSION, "hl": "en" },
            "user": {}
        }
    });

    ProviderConfig::new("ytmusic")
        .with_api_base(ORIGIN)
        .with_probe(ACCOUNT_MENU_ENDPOINT, Some(probe))
        .with_expiry_rule(ExpiryRule::new("/error/code", &[401, 403]))
        .with_sapisid_hash(ORIGIN)
        .with_header("Origin", ORIGIN)
        .with_header("X-Origin", ORIGIN)
        .with_header("X-Goog-AuthUser", "0")
        .with_header("User-Agent", DESKTOP_USER_AGENT)
}
