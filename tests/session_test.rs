mod common;

use std::time::Duration;

use axum::{
    Json, Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use common::{Counter, serve, temp_store};
use earshot::{
    auth::{Authenticator, CookieAuthenticator, PkceAuthenticator},
    error::{AuthError, StoreError},
    management::{CredentialStore, SessionManager},
    types::{Credential, ExpiryRule, ProviderConfig, Validation},
};
use reqwest::Client;
use serde_json::json;

/// Token endpoint that answers refresh requests with `status`.
async fn token_server(status: StatusCode, calls: Counter) -> String {
    let app = Router::new().route(
        "/token",
        post(move || {
            let calls = calls.clone();
            async move {
                let n = calls.hit();
                let body = json!({ "access_token": format!("access-{}", n + 1), "expires_in": 3600 });
                (status, Json(body)).into_response()
            }
        }),
    );
    serve(app).await
}

fn oauth_session(token_base: &str, store: CredentialStore) -> SessionManager {
    let config = ProviderConfig::new("spotify")
        .with_oauth(
            "https://accounts.example.com/authorize",
            format!("{token_base}/token"),
            "http://127.0.0.1:8989/login",
        )
        .with_client_id("client-123");
    let pkce = PkceAuthenticator::new(Client::new(), Duration::from_secs(1));
    SessionManager::new(config, Authenticator::Pkce(pkce), store)
}

fn expired_oauth() -> Credential {
    Credential::oauth("spotify", "access-1")
        .with_refresh("refresh-1")
        .with_expiry(Utc::now() - chrono::Duration::minutes(5))
}

#[tokio::test]
async fn test_missing_credential_is_not_logged_in() {
    let (_dir, store) = temp_store();
    let calls = Counter::default();
    let base = token_server(StatusCode::OK, calls.clone()).await;
    let mut session = oauth_session(&base, store);

    let result = session.get_valid_credential().await;

    assert!(matches!(result, Err(AuthError::NotLoggedIn(id)) if id == "spotify"));
    assert_eq!(calls.get(), 0);
}

#[tokio::test]
async fn test_fresh_credential_is_returned_without_refresh() {
    let (_dir, store) = temp_store();
    let credential = Credential::oauth("spotify", "access-1")
        .with_refresh("refresh-1")
        .with_expiry(Utc::now() + chrono::Duration::hours(1));
    store.save("spotify", &credential).await.unwrap();
    let calls = Counter::default();
    let base = token_server(StatusCode::OK, calls.clone()).await;
    let mut session = oauth_session(&base, store);

    assert_eq!(session.get_valid_credential().await.unwrap(), credential);
    assert_eq!(calls.get(), 0);
}

#[tokio::test]
async fn test_expired_credential_is_refreshed_once_and_persisted() {
    let (_dir, store) = temp_store();
    store.save("spotify", &expired_oauth()).await.unwrap();
    let calls = Counter::default();
    let base = token_server(StatusCode::OK, calls.clone()).await;
    let mut session = oauth_session(&base, store.clone());

    let credential = session.get_valid_credential().await.unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(credential.access_token.as_deref(), Some("access-2"));
    assert_eq!(credential.refresh_token.as_deref(), Some("refresh-1"));
    assert!(!credential.is_expired());
    assert_eq!(store.load("spotify").await.unwrap(), credential);
    assert_eq!(session.current_credential(), Some(&credential));

    // the refreshed copy is served from memory afterwards
    session.get_valid_credential().await.unwrap();
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn test_failed_refresh_means_not_logged_in() {
    let (_dir, store) = temp_store();
    let stale = expired_oauth();
    store.save("spotify", &stale).await.unwrap();
    let calls = Counter::default();
    let base = token_server(StatusCode::BAD_REQUEST, calls.clone()).await;
    let mut session = oauth_session(&base, store.clone());

    let result = session.get_valid_credential().await;

    assert!(matches!(result, Err(AuthError::NotLoggedIn(_))));
    assert_eq!(calls.get(), 1);
    assert_eq!(store.load("spotify").await.unwrap(), stale);
}

#[tokio::test]
async fn test_refresh_reports_the_token_endpoint_error() {
    let (_dir, store) = temp_store();
    store.save("spotify", &expired_oauth()).await.unwrap();
    let base = token_server(StatusCode::BAD_REQUEST, Counter::default()).await;
    let mut session = oauth_session(&base, store);

    let result = session.refresh().await;

    assert!(matches!(
        result,
        Err(AuthError::RefreshFailed { status: Some(400), .. })
    ));
}

#[tokio::test]
async fn test_corrupt_credential_is_not_logged_in() {
    let (_dir, store) = temp_store();
    std::fs::create_dir_all(store.root()).unwrap();
    std::fs::write(store.credential_path("spotify"), "garbage").unwrap();
    let base = token_server(StatusCode::OK, Counter::default()).await;
    let mut session = oauth_session(&base, store);

    assert!(matches!(
        session.get_valid_credential().await,
        Err(AuthError::NotLoggedIn(_))
    ));
}

#[tokio::test]
async fn test_invalidate_is_idempotent() {
    let (_dir, store) = temp_store();
    store
        .save("spotify", &Credential::oauth("spotify", "access-1"))
        .await
        .unwrap();
    let base = token_server(StatusCode::OK, Counter::default()).await;
    let mut session = oauth_session(&base, store.clone());
    session.get_valid_credential().await.unwrap();

    session.invalidate().await.unwrap();
    session.invalidate().await.unwrap();

    assert!(session.current_credential().is_none());
    assert!(matches!(
        store.load("spotify").await,
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        session.get_valid_credential().await,
        Err(AuthError::NotLoggedIn(_))
    ));
}

#[tokio::test]
async fn test_persist_requires_a_credential() {
    let (_dir, store) = temp_store();
    let base = token_server(StatusCode::OK, Counter::default()).await;
    let session = oauth_session(&base, store);

    assert!(matches!(
        session.persist().await,
        Err(AuthError::NotLoggedIn(_))
    ));
}

#[tokio::test]
async fn test_rejected_cookie_ends_the_session() {
    let app = Router::new().route("/status", get(|| async { Json(json!({ "code": 301 })) }));
    let base = serve(app).await;
    let (_dir, store) = temp_store();
    let config = ProviderConfig::new("netease")
        .with_api_base(&base)
        .with_probe("/status", None)
        .with_expiry_rule(ExpiryRule::new("/code", &[301]));
    let cookies = CookieAuthenticator::new(Client::new());
    let mut session = SessionManager::new(config, Authenticator::Cookie(cookies), store);

    session.login_with_cookie("MUSIC_U=old").await.unwrap();
    assert!(session.get_valid_credential().await.is_ok());

    assert_eq!(session.validate().await.unwrap(), Validation::Expired);
    assert_eq!(session.last_validation(), Some(Validation::Expired));

    // cookies cannot be refreshed, so the user has to log in again
    assert!(matches!(
        session.get_valid_credential().await,
        Err(AuthError::NotLoggedIn(_))
    ));
}

#[tokio::test]
async fn test_login_flow_must_match_the_authenticator() {
    let (_dir, store) = temp_store();
    let base = token_server(StatusCode::OK, Counter::default()).await;
    let mut session = oauth_session(&base, store);

    assert!(matches!(
        session.login_with_cookie("a=b").await,
        Err(AuthError::NotSupported)
    ));
    assert!(matches!(
        session.begin_qr_login().await,
        Err(AuthError::NotSupported)
    ));
}
