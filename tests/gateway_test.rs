mod common;

use std::time::Duration;

use axum::{
    Form, Json, Router,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use common::{Counter, serve, temp_store};
use earshot::{
    auth::{Authenticator, CookieAuthenticator, PkceAuthenticator},
    error::{ApiError, AuthError},
    gateway::{ApiGateway, RequestBody},
    management::{CredentialStore, SessionManager},
    providers::Provider,
    types::{Credential, ExpiryRule, ProviderConfig},
    utils,
};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Value, json};
use tempfile::TempDir;

/// How the mock API treats requests.
#[derive(Clone, Copy)]
enum Api {
    /// 401 unless the bearer token is `fresh`.
    AcceptsFreshToken,
    AlwaysUnauthorized,
    ServerError,
}

struct Mock {
    base: String,
    api_calls: Counter,
    token_calls: Counter,
}

async fn mock(api: Api, token_status: StatusCode) -> Mock {
    let api_calls = Counter::default();
    let token_calls = Counter::default();

    let (a, t) = (api_calls.clone(), token_calls.clone());
    let app = Router::new()
        .route(
            "/v1/me",
            get(move |headers: HeaderMap| {
                let a = a.clone();
                async move {
                    a.hit();
                    let bearer = headers
                        .get(header::AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("");
                    match api {
                        Api::AcceptsFreshToken if bearer == "Bearer fresh" => {
                            Json(json!({ "id": "user-1" })).into_response()
                        }
                        Api::ServerError => {
                            (StatusCode::INTERNAL_SERVER_ERROR, "upstream broke").into_response()
                        }
                        _ => (StatusCode::UNAUTHORIZED, "token expired").into_response(),
                    }
                }
            }),
        )
        .route(
            "/token",
            post(move || {
                let t = t.clone();
                async move {
                    t.hit();
                    let body = json!({ "access_token": "fresh", "expires_in": 3600 });
                    (token_status, Json(body)).into_response()
                }
            }),
        );

    Mock {
        base: serve(app).await,
        api_calls,
        token_calls,
    }
}

fn oauth_gateway(mock: &Mock) -> (TempDir, CredentialStore, ApiGateway) {
    let (dir, store) = temp_store();
    let config = ProviderConfig::new("spotify")
        .with_oauth(
            "https://accounts.example.com/authorize",
            format!("{}/token", mock.base),
            "http://127.0.0.1:8989/login",
        )
        .with_api_base(format!("{}/v1", mock.base));
    let http = Client::new();
    let pkce = PkceAuthenticator::new(http.clone(), Duration::from_secs(1));
    let session = SessionManager::new(config, Authenticator::Pkce(pkce), store.clone());
    (dir, store, ApiGateway::new(http, session))
}

async fn seed_stale_token(store: &CredentialStore) {
    // not expired by the clock, only rejected by the API
    store
        .save(
            "spotify",
            &Credential::oauth("spotify", "stale").with_refresh("refresh-1"),
        )
        .await
        .unwrap();
}

#[derive(Debug, Deserialize)]
struct Me {
    id: String,
}

#[tokio::test]
async fn test_unauthorized_call_is_refreshed_and_retried_once() {
    let mock = mock(Api::AcceptsFreshToken, StatusCode::OK).await;
    let (_dir, store, mut gateway) = oauth_gateway(&mock);
    seed_stale_token(&store).await;

    let response = gateway.get("/me").await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.json::<Me>().unwrap().id, "user-1");
    assert_eq!(mock.api_calls.get(), 2);
    assert_eq!(mock.token_calls.get(), 1);

    let stored = store.load("spotify").await.unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("fresh"));
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));

    // the next call goes straight through with the new token
    gateway.get("/me").await.unwrap();
    assert_eq!(mock.api_calls.get(), 3);
    assert_eq!(mock.token_calls.get(), 1);
}

#[tokio::test]
async fn test_second_unauthorized_is_returned_without_a_third_call() {
    let mock = mock(Api::AlwaysUnauthorized, StatusCode::OK).await;
    let (_dir, store, mut gateway) = oauth_gateway(&mock);
    seed_stale_token(&store).await;

    let result = gateway.get("/me").await;

    match result {
        Err(ApiError::Unauthorized { body }) => assert_eq!(body, "token expired"),
        other => panic!("expected Unauthorized, got {other:?}"),
    }
    assert_eq!(mock.api_calls.get(), 2);
    assert_eq!(mock.token_calls.get(), 1);
}

#[tokio::test]
async fn test_failed_refresh_is_unauthorized_without_retry() {
    let mock = mock(Api::AcceptsFreshToken, StatusCode::BAD_REQUEST).await;
    let (_dir, store, mut gateway) = oauth_gateway(&mock);
    seed_stale_token(&store).await;

    let result = gateway.get("/me").await;

    assert!(matches!(result, Err(ApiError::Unauthorized { .. })));
    assert_eq!(mock.api_calls.get(), 1);
    assert_eq!(mock.token_calls.get(), 1);
}

#[tokio::test]
async fn test_other_http_errors_are_not_retried() {
    let mock = mock(Api::ServerError, StatusCode::OK).await;
    let (_dir, store, mut gateway) = oauth_gateway(&mock);
    seed_stale_token(&store).await;

    let result = gateway.get("/me").await;

    match result {
        Err(ApiError::HttpStatus { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "upstream broke");
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
    assert_eq!(mock.api_calls.get(), 1);
    assert_eq!(mock.token_calls.get(), 0);
}

#[tokio::test]
async fn test_call_without_credential_is_not_logged_in() {
    let mock = mock(Api::AcceptsFreshToken, StatusCode::OK).await;
    let (_dir, _store, mut gateway) = oauth_gateway(&mock);

    let result = gateway.get("/me").await;

    assert!(matches!(
        result,
        Err(ApiError::Auth(AuthError::NotLoggedIn(_)))
    ));
    assert_eq!(mock.api_calls.get(), 0);
}

#[tokio::test]
async fn test_network_failure_is_reported_as_network_error() {
    let (_dir, store) = temp_store();
    store
        .save("spotify", &Credential::oauth("spotify", "token"))
        .await
        .unwrap();
    let config = ProviderConfig::new("spotify").with_api_base("http://127.0.0.1:1");
    let http = Client::new();
    let pkce = PkceAuthenticator::new(http.clone(), Duration::from_secs(1));
    let mut gateway = ApiGateway::new(
        http,
        SessionManager::new(config, Authenticator::Pkce(pkce), store),
    );

    assert!(matches!(gateway.get("/me").await, Err(ApiError::Network(_))));
}

/// Cookie provider whose API answers HTTP 200 with `{"code": 301}` once the
/// session is gone, and echoes everything else.
async fn cookie_gateway() -> (TempDir, ApiGateway, Counter) {
    let calls = Counter::default();
    let c = calls.clone();
    let app = Router::new()
        .route(
            "/playlist",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let c = c.clone();
                async move {
                    c.hit();
                    let cookie = headers
                        .get(header::COOKIE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    let client = headers
                        .get("x-client")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    if cookie == "MUSIC_U=gone" {
                        return Json(json!({ "code": 301, "msg": "need login" }));
                    }
                    Json(json!({ "code": 200, "cookie": cookie, "client": client, "body": body }))
                }
            }),
        )
        .route(
            "/like",
            post(|Form(form): Form<Vec<(String, String)>>| async move {
                Json(json!({ "code": 200, "form": form }))
            }),
        )
        .route("/empty", post(|| async { StatusCode::NO_CONTENT }));
    let base = serve(app).await;

    let (dir, store) = temp_store();
    let config = ProviderConfig::new("netease")
        .with_api_base(&base)
        .with_expiry_rule(ExpiryRule::new("/code", &[301]))
        .with_header("x-client", "earshot-test");
    let http = Client::new();
    let cookies = CookieAuthenticator::new(http.clone());
    let session = SessionManager::new(config, Authenticator::Cookie(cookies), store);
    (dir, ApiGateway::new(http, session), calls)
}

#[tokio::test]
async fn test_cookie_call_carries_cookie_headers_and_body() {
    let (_dir, mut gateway, calls) = cookie_gateway().await;
    gateway
        .session_mut()
        .login_with_cookie("MUSIC_U=live")
        .await
        .unwrap();

    let response = gateway
        .post_json("/playlist", json!({ "id": 42 }))
        .await
        .unwrap();

    let echoed: Value = response.json().unwrap();
    assert_eq!(echoed["cookie"], "MUSIC_U=live");
    assert_eq!(echoed["client"], "earshot-test");
    assert_eq!(echoed["body"]["id"], 42);
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn test_expired_cookie_payload_is_unauthorized_after_one_call() {
    let (_dir, mut gateway, calls) = cookie_gateway().await;
    gateway
        .session_mut()
        .login_with_cookie("MUSIC_U=gone")
        .await
        .unwrap();

    let result = gateway
        .post_json("/playlist", json!({ "id": 42 }))
        .await;

    match result {
        Err(ApiError::Unauthorized { body }) => assert!(body.contains("need login")),
        other => panic!("expected Unauthorized, got {other:?}"),
    }
    // cookies have no refresh, so there is nothing to retry with
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn test_form_and_empty_responses() {
    let (_dir, mut gateway, _) = cookie_gateway().await;
    gateway
        .session_mut()
        .login_with_cookie("MUSIC_U=live")
        .await
        .unwrap();

    let form = RequestBody::Form(vec![("id".to_string(), "7".to_string())]);
    let liked = gateway
        .call(Method::POST, "/like", Some(&form))
        .await
        .unwrap();
    let liked: Value = liked.json().unwrap();
    assert_eq!(liked["form"][0][0], "id");
    assert_eq!(liked["form"][0][1], "7");

    let empty = gateway.call(Method::POST, "/empty", None).await.unwrap();
    assert_eq!(empty.status, 204);
    assert!(empty.is_empty());
    assert!(matches!(
        empty.json::<Value>(),
        Err(ApiError::Malformed(_))
    ));
}

#[tokio::test]
async fn test_youtube_calls_are_signed_with_sapisidhash() {
    let app = Router::new().route(
        "/youtubei/v1/browse",
        post(|headers: HeaderMap| async move {
            let value = |name: header::HeaderName| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string()
            };
            Json(json!({
                "authorization": value(header::AUTHORIZATION),
                "cookie": value(header::COOKIE),
            }))
        }),
    );
    let base = serve(app).await;

    let (_dir, store) = temp_store();
    let config = Provider::YtMusic.config().await.with_api_base(&base);
    let http = Client::new();
    let cookies = CookieAuthenticator::new(http.clone());
    let session = SessionManager::new(config, Authenticator::Cookie(cookies), store);
    let mut gateway = ApiGateway::new(http, session);
    gateway
        .session_mut()
        .login_with_cookie("SID=s1; SAPISID=live-sapisid")
        .await
        .unwrap();

    let response = gateway
        .post_json("/youtubei/v1/browse", json!({ "browseId": "FEmusic_liked_playlists" }))
        .await
        .unwrap();

    let echoed: Value = response.json().unwrap();
    assert_eq!(echoed["cookie"], "SID=s1; SAPISID=live-sapisid");
    let authorization = echoed["authorization"].as_str().unwrap();
    let timestamp: i64 = authorization
        .strip_prefix("SAPISIDHASH ")
        .and_then(|rest| rest.split_once('_'))
        .map(|(ts, _)| ts.parse().unwrap())
        .unwrap();
    assert_eq!(
        authorization,
        utils::sapisid_hash("live-sapisid", "https://music.youtube.com", timestamp)
    );
}
