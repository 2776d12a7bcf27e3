//! Scoped panel session
//!
//! A [`PanelSession`] is opened by logging in and must be closed with
//! [`PanelSession::close`]. [`with_session`] wraps the open/run/close sequence
//! so the logout happens on every return path.

use common::PanelConfig;
use errors::{SyncError, SyncResult};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

use super::client::AmpClient;

/// Logged-in controller session
pub struct PanelSession {
    client: AmpClient,
    closed: bool,
}

impl PanelSession {
    /// Log into the panel described by `config`
    pub async fn login(config: &PanelConfig) -> SyncResult<Self> {
        let mut client = AmpClient::new(&config.url, &config.username, &config.password)
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        client.login().await.map_err(SyncError::LoginFailed)?;
        debug!("Logged into {}", client.base_url());
        Ok(Self {
            client,
            closed: false,
        })
    }

    pub fn client(&self) -> &AmpClient {
        &self.client
    }

    /// Log out; failures are logged, never raised
    pub async fn close(mut self) {
        if let Err(e) = self.client.logout().await {
            warn!("Logout failed: {}", e);
        }
        self.closed = true;
    }
}

impl Drop for PanelSession {
    fn drop(&mut self) {
        if !self.closed && self.client.is_logged_in() {
            warn!(
                "Panel session for {} dropped without logout",
                self.client.base_url()
            );
        }
    }
}

/// Future borrowing the session's client
pub type SessionFuture<'c, T> = Pin<Box<dyn Future<Output = SyncResult<T>> + 'c>>;

/// Log in, run `f` against the session's client, then always log out
pub async fn with_session<T, F>(config: &PanelConfig, f: F) -> SyncResult<T>
where
    F: for<'c> FnOnce(&'c AmpClient) -> SessionFuture<'c, T>,
{
    let session = PanelSession::login(config).await?;
    let result = f(session.client()).await;
    session.close().await;
    result
}
