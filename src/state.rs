use std::sync::Arc;

use crate::{config::ServerConfig, credentials::CredentialStore, render::PageRenderer};

/// Shared by every request. The credential store is read-only once the
/// server is running.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub credentials: Arc<CredentialStore>,
    pub renderer: Arc<PageRenderer>,
}
