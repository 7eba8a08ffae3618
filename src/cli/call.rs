use reqwest::Method;
use serde_json::Value;

use crate::{
    cli::http_client,
    error,
    error::{ApiError, AuthError},
    gateway::{ApiGateway, RequestBody},
    providers::Provider,
};

pub async fn call(provider: Provider, endpoint: String, method: String, json: Option<String>) {
    let method = match Method::from_bytes(method.to_ascii_uppercase().as_bytes()) {
        Ok(m) => m,
        Err(_) => error!("Invalid HTTP method: {}", method),
    };

    let body = match json.as_deref().map(serde_json::from_str::<Value>) {
        None => None,
        Some(Ok(value)) => Some(RequestBody::Json(value)),
        Some(Err(e)) => error!("--json is not valid JSON. Err: {}", e),
    };

    let http = http_client();
    let session = provider.session(http.clone()).await;
    let mut gateway = ApiGateway::new(http, session);

    match gateway.call(method, &endpoint, body.as_ref()).await {
        Ok(response) if response.is_empty() => {}
        Ok(response) => match serde_json::from_str::<Value>(&response.body) {
            Ok(json) => println!(
                "{}",
                serde_json::to_string_pretty(&json).unwrap_or(response.body)
            ),
            Err(_) => println!("{}", response.body),
        },
        Err(ApiError::Auth(AuthError::NotLoggedIn(id))) => {
            error!("Not logged in to {}. Run: earshot login {}", id, id)
        }
        Err(ApiError::Unauthorized { .. }) => error!(
            "{} rejected the stored credential. Run: earshot login {}",
            provider, provider
        ),
        Err(e) => error!("Request failed. Err: {}", e),
    }
}
