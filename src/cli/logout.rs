use crate::{cli::http_client, error, providers::Provider, success};

pub async fn logout(provider: Provider) {
    let mut session = provider.session(http_client()).await;
    if let Err(e) = session.invalidate().await {
        error!("Cannot remove credential for {}. Err: {}", provider, e);
    }
    success!("Logged out of {}", provider);
}
