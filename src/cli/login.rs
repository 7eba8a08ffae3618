use tokio::io::AsyncReadExt;

use crate::{
    auth::Authenticator,
    cli::{http_client, spinner},
    config, error,
    error::AuthError,
    info,
    management::{SessionManager, write_private_file},
    providers::Provider,
    success,
    types::{Credential, QrStatus, Validation},
    utils, warning,
};

pub async fn login(provider: Provider, qr: bool) {
    let mut session = if qr {
        match provider.qr_session(http_client()).await {
            Some(session) => session,
            None => error!("{} has no QR login. Run: earshot login {}", provider, provider),
        }
    } else {
        provider.session(http_client()).await
    };

    let result = match session.authenticator() {
        Authenticator::Pkce(_) => login_oauth(&mut session).await,
        Authenticator::Polling(_) => login_qr(&mut session).await,
        Authenticator::Cookie(_) => login_cookie(&mut session).await,
    };

    match result {
        Ok(credential) => {
            success!("Logged in to {} ({})", provider, credential.kind);
            if let Some(expires_at) = credential.expires_at {
                info!("Access token valid until {}", expires_at.to_rfc3339());
            }
        }
        Err(AuthError::TimedOut) => error!("Login to {} timed out. Run the command again.", provider),
        Err(AuthError::Expired) => error!("The QR code expired before it was confirmed. Run the command again."),
        Err(e) => error!("Login to {} failed. Err: {}", provider, e),
    }
}

async fn login_oauth(session: &mut SessionManager) -> Result<Credential, AuthError> {
    if session.config().client_id.trim().is_empty() {
        error!("No Spotify client id configured. Run: earshot config --client-id <CLIENT_ID>");
    }

    let pending = session.begin_pkce_login().await?;
    let url = pending.authorize_url().to_string();

    if webbrowser::open(&url).is_err() {
        warning!(
            "Failed to open browser. Please navigate to the following URL manually:\n{}",
            url
        );
    } else {
        info!("Opened the authorization page in your browser. If nothing happened, open:\n{}", url);
    }

    let pb = spinner(format!(
        "Waiting for the redirect on {}...",
        pending.listener_addr()
    ));
    let result = session.complete_pkce_login(pending).await;
    pb.finish_and_clear();
    result
}

async fn login_qr(session: &mut SessionManager) -> Result<Credential, AuthError> {
    let qr = session.begin_qr_login().await?;

    let image_path = match &qr.qr_image {
        Some(image) => {
            let path = config::config_dir().join(format!("{}-qr.png", session.config().provider_id));
            write_private_file(&path, image)
                .await
                .map_err(|e| AuthError::Store(e.into()))?;
            info!("QR code saved to: {}\nScan it with the mobile app.", path.display());
            if webbrowser::open(&path.to_string_lossy()).is_err() {
                warning!("Failed to open the QR image. Please open it manually.");
            }
            Some(path)
        }
        None => {
            info!("Scan this login link as a QR code with the mobile app:\n{}", qr.login_url);
            None
        }
    };

    let pb = spinner(qr.status.to_string());
    let progress = pb.clone();
    let result = session
        .await_qr_login(qr, move |status: QrStatus| progress.set_message(status.to_string()))
        .await;
    pb.finish_and_clear();

    if let Some(path) = image_path {
        let _ = async_fs::remove_file(path).await;
    }
    result
}

async fn login_cookie(session: &mut SessionManager) -> Result<Credential, AuthError> {
    info!(
        "Paste the cookie for {} (or the browser request headers containing it), then press Ctrl-D:",
        session.config().provider_id
    );

    let mut input = String::new();
    if let Err(e) = tokio::io::stdin().read_to_string(&mut input).await {
        error!("Cannot read from stdin. Err: {}", e);
    }

    let Some(cookie) = utils::extract_cookie(&input) else {
        return Err(AuthError::Rejected("no cookie was pasted".to_string()));
    };

    let credential = session.login_with_cookie(&cookie).await?;

    let pb = spinner("Checking the cookie...");
    let validation = session.validate().await;
    pb.finish_and_clear();
    match validation {
        Ok(Validation::Valid) => {}
        Ok(Validation::Expired) => {
            warning!("The provider did not accept this cookie; it was stored anyway.")
        }
        Err(e) => warning!("Could not check the cookie. Err: {}", e),
    }

    Ok(credential)
}
