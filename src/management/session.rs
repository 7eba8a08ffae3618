use tracing::{debug, warn};

use crate::{
    auth::{Authenticator, CookieAuthenticator, PendingAuthorization},
    error::{AuthError, StoreError},
    management::CredentialStore,
    types::{Credential, CredentialKind, ProviderConfig, QrLoginSession, QrStatus, Validation},
};

/// Per-provider session: the provider's config, its authenticator, its
/// credential store and the in-memory credential.
///
/// One instance is built per CLI invocation and passed to whoever needs it;
/// it is the only component that writes a credential back to the store.
pub struct SessionManager {
    config: ProviderConfig,
    authenticator: Authenticator,
    store: CredentialStore,
    credential: Option<Credential>,
    validation: Option<Validation>,
}

impl SessionManager {
    pub fn new(config: ProviderConfig, authenticator: Authenticator, store: CredentialStore) -> Self {
        SessionManager {
            config,
            authenticator,
            store,
            credential: None,
            validation: None,
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn current_credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Outcome of the last [`SessionManager::validate`] call, if any.
    pub fn last_validation(&self) -> Option<Validation> {
        self.validation
    }

    /// Returns a usable credential, refreshing it once if it is stale.
    ///
    /// Stale means past `expires_at` for OAuth tokens, or a failed probe for
    /// cookies. A missing, corrupt or unrefreshable credential yields
    /// `NotLoggedIn`; an interactive login is never started from here.
    pub async fn get_valid_credential(&mut self) -> Result<Credential, AuthError> {
        let credential = self.load().await?;
        if !self.is_stale(&credential) {
            return Ok(credential);
        }

        debug!(provider = %self.config.provider_id, "credential is stale, refreshing once");
        self.refresh().await.map_err(|e| {
            warn!(provider = %self.config.provider_id, "refresh failed: {}", e);
            AuthError::NotLoggedIn(self.config.provider_id.clone())
        })
    }

    /// Performs exactly one refresh through the authenticator and persists
    /// the result.
    pub async fn refresh(&mut self) -> Result<Credential, AuthError> {
        let current = self.load().await?;
        let refreshed = match self.authenticator.refresh(&self.config, &current).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                if current.kind == CredentialKind::SessionCookie {
                    self.validation = Some(Validation::Expired);
                }
                return Err(e);
            }
        };

        self.adopt(refreshed.clone());
        self.persist().await?;
        Ok(refreshed)
    }

    /// Probes the provider with the current credential and remembers the result.
    pub async fn validate(&mut self) -> Result<Validation, AuthError> {
        let credential = self.load().await?;
        let prober = CookieAuthenticator::new(self.authenticator.http().clone());
        let validation = prober.validate(&credential, &self.config).await?;
        self.validation = Some(validation);
        Ok(validation)
    }

    /// Deletes the stored credential. Logging out twice is not an error.
    pub async fn invalidate(&mut self) -> Result<(), AuthError> {
        self.credential = None;
        self.validation = None;
        match self.store.delete(&self.config.provider_id).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound(_)) => {
                debug!(provider = %self.config.provider_id, "nothing to invalidate");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the in-memory credential back to the store.
    pub async fn persist(&self) -> Result<(), AuthError> {
        let credential = self
            .credential
            .as_ref()
            .ok_or_else(|| AuthError::NotLoggedIn(self.config.provider_id.clone()))?;
        self.store.save(&self.config.provider_id, credential).await?;
        Ok(())
    }

    /// Starts an OAuth login; the caller shows the returned URL to the user.
    pub async fn begin_pkce_login(&self) -> Result<PendingAuthorization, AuthError> {
        match &self.authenticator {
            Authenticator::Pkce(pkce) => pkce.begin(&self.config).await,
            _ => Err(AuthError::NotSupported),
        }
    }

    pub async fn complete_pkce_login(
        &mut self,
        pending: PendingAuthorization,
    ) -> Result<Credential, AuthError> {
        let credential = pending.complete(&self.store).await?;
        self.adopt(credential.clone());
        Ok(credential)
    }

    /// Starts a QR login; the caller renders `login_url` as a QR code.
    pub async fn begin_qr_login(&self) -> Result<QrLoginSession, AuthError> {
        match &self.authenticator {
            Authenticator::Polling(polling) => polling.begin_qr_login(&self.config).await,
            _ => Err(AuthError::NotSupported),
        }
    }

    pub async fn await_qr_login<F>(
        &mut self,
        session: QrLoginSession,
        on_status: F,
    ) -> Result<Credential, AuthError>
    where
        F: FnMut(QrStatus) + Send,
    {
        let Authenticator::Polling(polling) = &self.authenticator else {
            return Err(AuthError::NotSupported);
        };
        let credential = polling
            .await_completion(&self.config, session, &self.store, on_status)
            .await?;
        self.adopt(credential.clone());
        Ok(credential)
    }

    /// Stores a pasted cookie as the provider's credential.
    pub async fn login_with_cookie(&mut self, raw: &str) -> Result<Credential, AuthError> {
        let Authenticator::Cookie(cookie) = &self.authenticator else {
            return Err(AuthError::NotSupported);
        };
        let credential = cookie.accept_and_store(&self.config, raw, &self.store).await?;
        self.adopt(credential.clone());
        Ok(credential)
    }

    fn adopt(&mut self, credential: Credential) {
        self.credential = Some(credential);
        self.validation = None;
    }

    fn is_stale(&self, credential: &Credential) -> bool {
        match credential.kind {
            CredentialKind::OAuthToken => credential.is_expired(),
            CredentialKind::SessionCookie => self.validation == Some(Validation::Expired),
        }
    }

    /// In-memory credential, loading it from the store on first use.
    async fn load(&mut self) -> Result<Credential, AuthError> {
        if let Some(credential) = &self.credential {
            return Ok(credential.clone());
        }

        match self.store.load(&self.config.provider_id).await {
            Ok(credential) => {
                self.credential = Some(credential.clone());
                Ok(credential)
            }
            Err(StoreError::NotFound(_)) => {
                Err(AuthError::NotLoggedIn(self.config.provider_id.clone()))
            }
            Err(StoreError::CorruptCredential { provider, reason }) => {
                warn!(provider = %provider, "ignoring unreadable credential: {}", reason);
                Err(AuthError::NotLoggedIn(provider))
            }
            Err(e) => Err(e.into()),
        }
    }
}
