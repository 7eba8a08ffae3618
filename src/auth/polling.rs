use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::{debug, info};

use crate::{
    error::AuthError,
    management::CredentialStore,
    types::{Credential, ProviderConfig, QrLoginSession, QrStatus},
};

/// What a provider hands out when a QR login starts.
#[derive(Debug, Clone)]
pub struct QrTicket {
    pub login_key: String,
    /// Payload to render as a QR code (rendering is the caller's job).
    pub login_url: String,
    /// Ready-made QR image, for providers that only hand out a picture.
    pub qr_image: Option<Vec<u8>>,
    pub context: BTreeMap<String, String>,
}

/// Session artifacts collected once the user confirms the login.
#[derive(Debug, Clone, Default)]
pub struct SessionArtifacts {
    pub cookie: String,
    pub extra: BTreeMap<String, String>,
}

/// One status check mapped from the provider's own response codes.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    Pending,
    Scanned,
    Confirmed(SessionArtifacts),
    Expired,
    /// A code the adapter does not know; the login keeps waiting.
    Unrecognized(String),
}

/// Provider side of a QR login: how to obtain a login key and how to read
/// one status check. Implemented by each QR-capable adapter.
#[async_trait]
pub trait QrProtocol: Send + Sync {
    async fn request_login_key(
        &self,
        http: &Client,
        config: &ProviderConfig,
    ) -> Result<QrTicket, AuthError>;

    async fn check_status(
        &self,
        http: &Client,
        config: &ProviderConfig,
        session: &QrLoginSession,
    ) -> Result<PollOutcome, AuthError>;
}

/// Drives a scan-and-confirm QR login.
///
/// ```text
/// Pending --scan--> Scanned --confirm--> Confirmed
/// Pending | Scanned --provider expires code--> Expired
/// any non-terminal --max_attempts exhausted--> TimedOut
/// ```
///
/// Polling is sequential sleep-then-check; one session is polled at a time.
#[derive(Clone)]
pub struct PollingLoginAuthenticator {
    http: Client,
    protocol: Arc<dyn QrProtocol>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl PollingLoginAuthenticator {
    /// `max_attempts` is raised to 1 so that a login always checks at least once.
    pub fn new(
        http: Client,
        protocol: Arc<dyn QrProtocol>,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Self {
        PollingLoginAuthenticator {
            http,
            protocol,
            poll_interval,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub async fn begin_qr_login(&self, config: &ProviderConfig) -> Result<QrLoginSession, AuthError> {
        let ticket = self.protocol.request_login_key(&self.http, config).await?;
        debug!(provider = %config.provider_id, "obtained QR login key");

        Ok(QrLoginSession {
            login_key: ticket.login_key,
            login_url: ticket.login_url,
            qr_image: ticket.qr_image,
            status: QrStatus::Pending,
            created_at: Utc::now(),
            poll_interval: self.poll_interval,
            max_attempts: self.max_attempts,
            context: ticket.context,
        })
    }

    /// Polls until the login is confirmed, the code expires or the attempt cap
    /// is reached. `on_status` is called on every status change.
    ///
    /// On confirmation the collected cookie is stored as the provider's
    /// credential and returned.
    pub async fn await_completion<F>(
        &self,
        config: &ProviderConfig,
        mut session: QrLoginSession,
        store: &CredentialStore,
        mut on_status: F,
    ) -> Result<Credential, AuthError>
    where
        F: FnMut(QrStatus) + Send,
    {
        for attempt in 1..=session.max_attempts.max(1) {
            tokio::time::sleep(session.poll_interval).await;

            let next = match self
                .protocol
                .check_status(&self.http, config, &session)
                .await?
            {
                PollOutcome::Pending => QrStatus::Pending,
                PollOutcome::Scanned => QrStatus::Scanned,
                PollOutcome::Unrecognized(code) => {
                    debug!(provider = %config.provider_id, attempt, code = %code, "unrecognized QR status, still waiting");
                    session.status
                }
                PollOutcome::Expired => {
                    session.status = QrStatus::Expired;
                    on_status(QrStatus::Expired);
                    info!(provider = %config.provider_id, "QR code expired");
                    return Err(AuthError::Expired);
                }
                PollOutcome::Confirmed(artifacts) => {
                    session.status = QrStatus::Confirmed;
                    on_status(QrStatus::Confirmed);
                    return self.finish(config, artifacts, store).await;
                }
            };

            if next != session.status {
                debug!(provider = %config.provider_id, from = %session.status, to = %next, "QR status changed");
                session.status = next;
                on_status(next);
            }
        }

        info!(provider = %config.provider_id, attempts = session.max_attempts, "QR login timed out");
        Err(AuthError::TimedOut)
    }

    async fn finish(
        &self,
        config: &ProviderConfig,
        artifacts: SessionArtifacts,
        store: &CredentialStore,
    ) -> Result<Credential, AuthError> {
        if artifacts.cookie.trim().is_empty() {
            return Err(AuthError::Rejected(
                "login confirmed but the provider returned no session cookie".to_string(),
            ));
        }

        let mut credential = Credential::cookie(&config.provider_id, artifacts.cookie);
        credential.extra = artifacts.extra;
        store.save(&config.provider_id, &credential).await?;

        info!(provider = %config.provider_id, "QR login completed");
        Ok(credential)
    }
}
