//! # API Module
//!
//! HTTP endpoints served by the short-lived redirect listener that completes
//! an OAuth authorization-code login.
//!
//! - [`callback`] - receives the provider's redirect, hands the `code` and
//!   `state` query parameters to the waiting login flow exactly once, and
//!   answers with a static page.
//!
//! The listener lifecycle itself lives in [`crate::server`].

mod callback;

pub use callback::{CallbackParams, CallbackSlot, callback};
