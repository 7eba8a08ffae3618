use tabled::Table;

use crate::{
    cli::{http_client, spinner},
    error::StoreError,
    management::SessionManager,
    providers::Provider,
    types::{CredentialKind, ProviderStatusRow, Validation},
    warning,
};

pub async fn status(provider: Option<Provider>) {
    let providers = match provider {
        Some(p) => vec![p],
        None => Provider::all().to_vec(),
    };

    let http = http_client();
    let pb = spinner("Checking stored credentials...");
    let mut rows = Vec::with_capacity(providers.len());
    for provider in providers {
        let mut session = provider.session(http.clone()).await;
        rows.push(status_row(provider, &mut session).await);
    }
    pb.finish_and_clear();

    println!("{}", Table::new(rows));
}

async fn status_row(provider: Provider, session: &mut SessionManager) -> ProviderStatusRow {
    let mut row = ProviderStatusRow {
        provider: provider.to_string(),
        kind: "-".to_string(),
        status: "not logged in".to_string(),
        expires: "-".to_string(),
    };

    let credential = match session.store().load(provider.id()).await {
        Ok(credential) => credential,
        Err(StoreError::NotFound(_)) => return row,
        Err(e) => {
            warning!("{}", e);
            row.status = "unreadable".to_string();
            return row;
        }
    };

    row.kind = credential.kind.to_string();
    if let Some(expires_at) = credential.expires_at {
        row.expires = expires_at.format("%Y-%m-%d %H:%M UTC").to_string();
    }

    row.status = match credential.kind {
        CredentialKind::OAuthToken if credential.is_expired() => {
            if session.authenticator().supports_refresh() && credential.refresh_token.is_some() {
                "expired (refreshable)".to_string()
            } else {
                "expired".to_string()
            }
        }
        CredentialKind::OAuthToken => "logged in".to_string(),
        CredentialKind::SessionCookie => match session.validate().await {
            Ok(Validation::Valid) => "logged in".to_string(),
            Ok(Validation::Expired) => "expired".to_string(),
            Err(e) => format!("unknown ({e})"),
        },
    };
    row
}
