use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use axum::{Extension, Router, routing::get};
use reqwest::Url;
use tokio::{
    net::TcpListener,
    sync::oneshot,
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    api::{self, CallbackParams, CallbackSlot},
    error::AuthError,
};

/// How long a stopping listener may drain open connections before it is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Local redirect listener bound to `127.0.0.1` for a single OAuth redirect.
///
/// Serves one route (the redirect URI's path) and delivers the first request's
/// query parameters. The listener is stopped by [`CallbackServer::wait`] on
/// every outcome, and by `Drop` if the value is discarded early, so the port is
/// never left held.
pub struct CallbackServer {
    local_addr: SocketAddr,
    receiver: Option<oneshot::Receiver<CallbackParams>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Binds `127.0.0.1:<port>` taken from `redirect_uri` and starts serving
    /// its path on a separate task. `expected_state` only decides which page
    /// the browser is shown; the caller still checks the delivered params.
    pub async fn bind(redirect_uri: &str, expected_state: &str) -> Result<Self, AuthError> {
        let url = Url::parse(redirect_uri)
            .map_err(|e| AuthError::Listener(format!("invalid redirect uri {redirect_uri}: {e}")))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| AuthError::Listener(format!("redirect uri {redirect_uri} has no port")))?;
        let path = url.path().to_string();

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                AuthError::Listener(format!(
                    "port {port} is already in use; close the other program listening on it and retry"
                ))
            } else {
                AuthError::Listener(format!("cannot bind redirect port {port}: {e}"))
            }
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AuthError::Listener(e.to_string()))?;

        let (sender, receiver) = oneshot::channel();
        let slot = CallbackSlot::new(sender, expected_state);
        let app = Router::new().route(&path, get(api::callback).layer(Extension(slot)));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = served.await {
                warn!("redirect listener failed: {}", e);
            }
        });

        debug!(addr = %local_addr, path = %path, "redirect listener started");
        Ok(CallbackServer {
            local_addr,
            receiver: Some(receiver),
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the first redirect or until `timeout` elapses, then stops the
    /// listener regardless of the outcome.
    pub async fn wait(mut self, timeout: Duration) -> Result<CallbackParams, AuthError> {
        let outcome = match self.receiver.take() {
            Some(receiver) => tokio::time::timeout(timeout, receiver).await,
            None => {
                self.stop().await;
                return Err(AuthError::Listener("redirect already consumed".to_string()));
            }
        };
        self.stop().await;

        match outcome {
            Ok(Ok(params)) => Ok(params),
            Ok(Err(_)) => Err(AuthError::Listener(
                "redirect listener stopped unexpectedly".to_string(),
            )),
            Err(_) => Err(AuthError::TimedOut),
        }
    }

    /// Stops the listener and waits for its task to finish.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                task.abort();
                let _ = task.await;
            }
        }
        debug!(addr = %self.local_addr, "redirect listener stopped");
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
