use std::{collections::HashMap, sync::Arc};

use axum::{Extension, extract::Query, response::Html};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, warn};

/// Query parameters delivered by the provider's redirect.
pub type CallbackParams = HashMap<String, String>;

/// One-shot slot the first redirect request takes its sender from, together
/// with the `state` the login generated.
#[derive(Clone)]
pub struct CallbackSlot {
    sender: Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>,
    expected_state: Arc<str>,
}

impl CallbackSlot {
    pub fn new(sender: oneshot::Sender<CallbackParams>, expected_state: &str) -> Self {
        CallbackSlot {
            sender: Arc::new(Mutex::new(Some(sender))),
            expected_state: Arc::from(expected_state),
        }
    }
}

const SUCCESS_PAGE: &str =
    "<html><body><h2>Login successful.</h2><p>You may close this browser window.</p></body></html>";
const DENIED_PAGE: &str =
    "<html><body><h2>Login was not completed.</h2><p>Return to the terminal for details.</p></body></html>";
const ALREADY_HANDLED_PAGE: &str =
    "<html><body><h4>This login has already been handled.</h4></body></html>";

pub async fn callback(
    Query(params): Query<CallbackParams>,
    Extension(slot): Extension<CallbackSlot>,
) -> Html<&'static str> {
    let Some(sender) = slot.sender.lock().await.take() else {
        debug!("ignoring repeated redirect request");
        return Html(ALREADY_HANDLED_PAGE);
    };

    // only picks the page; the login flow re-checks the params
    let state_matches = params
        .get("state")
        .is_some_and(|state| state.as_str() == &*slot.expected_state);
    let page = if state_matches && params.contains_key("code") && !params.contains_key("error") {
        SUCCESS_PAGE
    } else {
        DENIED_PAGE
    };

    if sender.send(params).is_err() {
        warn!("redirect arrived after the login flow stopped waiting");
    }
    Html(page)
}
