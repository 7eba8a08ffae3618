mod session;
mod store;

pub use session::SessionManager;
pub use store::{CredentialStore, write_private_file};
