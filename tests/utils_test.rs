use chrono::{Duration, Utc};
use earshot::error::truncate_body;
use earshot::types::{Credential, ExpiryRule, ProviderConfig};
use earshot::utils::*;
use serde_json::json;

#[test]
fn test_generate_code_verifier() {
    let verifier = generate_code_verifier();

    // Should be exactly 128 characters
    assert_eq!(verifier.len(), 128);

    // Should contain only alphanumeric characters
    assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric()));

    // Two generated verifiers should be different
    let verifier2 = generate_code_verifier();
    assert_ne!(verifier, verifier2);
}

#[test]
fn test_generate_code_challenge() {
    let verifier = "test_verifier_123";
    let challenge = generate_code_challenge(verifier);

    // Deterministic and 43 chars of unpadded base64url (sha256)
    assert_eq!(challenge, generate_code_challenge(verifier));
    assert_eq!(challenge.len(), 43);
    assert!(
        challenge
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    );

    assert_ne!(challenge, generate_code_challenge("different_verifier"));
}

#[test]
fn test_generate_state() {
    let state = generate_state();
    assert_eq!(state.len(), 32);
    assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
    assert_ne!(state, generate_state());
}

#[test]
fn test_join_url() {
    assert_eq!(
        join_url("https://api.spotify.com/v1", "/me"),
        "https://api.spotify.com/v1/me"
    );
    assert_eq!(
        join_url("https://api.spotify.com/v1/", "me/player"),
        "https://api.spotify.com/v1/me/player"
    );
    assert_eq!(
        join_url("https://api.spotify.com/v1", "https://other.example.com/x"),
        "https://other.example.com/x"
    );
    assert_eq!(join_url("", "/me"), "/me");
}

#[test]
fn test_extract_cookie_from_bare_string() {
    assert_eq!(
        extract_cookie("  SID=abc; HSID=def \n").as_deref(),
        Some("SID=abc; HSID=def")
    );
    assert_eq!(extract_cookie("   \n  "), None);
}

#[test]
fn test_extract_cookie_from_header_block() {
    let pasted = "accept: */*\n\
                  Cookie: SID=abc; __Secure-3PSID=xyz\n\
                  user-agent: Mozilla/5.0\n";
    assert_eq!(
        extract_cookie(pasted).as_deref(),
        Some("SID=abc; __Secure-3PSID=xyz")
    );

    assert_eq!(extract_cookie("accept: */*\ncookie:   \n"), None);
}

#[test]
fn test_cookie_value() {
    let cookie = "uin=o0123; qm_keyst=Q_H_L_abc=; p_skey=xyz";
    assert_eq!(cookie_value(cookie, "uin").as_deref(), Some("o0123"));
    assert_eq!(cookie_value(cookie, "qm_keyst").as_deref(), Some("Q_H_L_abc="));
    assert_eq!(cookie_value(cookie, "skey"), None);
}

#[test]
fn test_sapisid_hash() {
    assert_eq!(
        sapisid_hash("abc", "https://music.youtube.com", 1_700_000_000),
        "SAPISIDHASH 1700000000_2f3ec011e870f3fbd0238c090c2062c208cead32"
    );
}

#[test]
fn test_sapisid_prefers_the_plain_cookie() {
    assert_eq!(
        sapisid("SAPISID=plain; __Secure-3PAPISID=secure").as_deref(),
        Some("plain")
    );
    assert_eq!(
        sapisid("SID=1; __Secure-3PAPISID=secure").as_deref(),
        Some("secure")
    );
    assert_eq!(sapisid("SID=1; HSID=2"), None);
}

#[test]
fn test_oauth_expiry_boundary() {
    let now = Utc::now();
    let credential = Credential::oauth("spotify", "token").with_expiry(now);

    assert!(credential.is_expired_at(now));
    assert!(credential.is_expired_at(now + Duration::seconds(1)));
    assert!(!credential.is_expired_at(now - Duration::seconds(1)));

    // without an expiry the token is used until the provider rejects it
    assert!(!Credential::oauth("spotify", "token").is_expired());
}

#[test]
fn test_cookie_never_expires_by_clock() {
    let credential = Credential::cookie("qqmusic", "uin=1");
    assert!(!credential.is_expired_at(Utc::now() + Duration::days(3650)));
}

#[test]
fn test_check_shape() {
    assert!(Credential::oauth("spotify", "t").check_shape().is_ok());
    assert!(Credential::cookie("ytmusic", "SID=1").check_shape().is_ok());

    let mut mixed = Credential::cookie("ytmusic", "SID=1");
    mixed.access_token = Some("t".to_string());
    assert!(mixed.check_shape().is_err());

    let mut empty = Credential::oauth("spotify", "t");
    empty.access_token = None;
    assert!(empty.check_shape().is_err());
}

#[test]
fn test_expiry_rules() {
    let rule = ExpiryRule::new("/req/code", &[1000, 1001]);
    assert!(rule.matches(&json!({ "req": { "code": 1000 } })));
    assert!(!rule.matches(&json!({ "req": { "code": 0 } })));
    assert!(!rule.matches(&json!({ "req": { "code": "1000" } })));
    assert!(!rule.matches(&json!({ "code": 1000 })));

    let config = ProviderConfig::new("netease").with_expiry_rule(ExpiryRule::new("/code", &[301]));
    assert!(config.is_session_expired_payload(r#"{"code":301,"msg":"need login"}"#));
    assert!(!config.is_session_expired_payload(r#"{"code":200}"#));
    assert!(!config.is_session_expired_payload("<html>301</html>"));
    assert!(!ProviderConfig::new("spotify").is_session_expired_payload(r#"{"code":301}"#));
}

#[test]
fn test_truncate_body() {
    assert_eq!(truncate_body("short"), "short");

    let long = "é".repeat(400);
    let truncated = truncate_body(&long);
    assert!(truncated.starts_with(&"é".repeat(250)));
    assert!(truncated.contains("800 total bytes"));
}
