//! Credentials for the sync session.
//!
//! A [`Credential`] is an opaque bearer token sent in the `authenticate`
//! message. It can be supplied statically or lazily through a
//! [`DynamicAuthProvider`], which is asked again on every reconnect.
//!
//! ```rust,no_run
//! use atlas_link::{Credential, DynamicAuthProvider};
//!
//! struct TokenStore;
//!
//! #[async_trait::async_trait]
//! impl DynamicAuthProvider for TokenStore {
//!     async fn get_credential(&self) -> atlas_link::Result<Credential> {
//!         // fetch / refresh token here
//!         Ok(Credential::new("fresh-token"))
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::connection::WeakConnectionManager;
use crate::error::{AtlasLinkError, Result};

/// Opaque session credential. `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, for building the `authenticate` message.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<redacted {} chars>)", self.0.len())
    }
}

impl From<&str> for Credential {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Credential {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── Dynamic (async) auth provider ────────────────────────────────────────────

/// Async credential source called on every connect or reconnect.
#[async_trait::async_trait]
pub trait DynamicAuthProvider: Send + Sync + 'static {
    /// Return the current (or freshly refreshed) credential.
    async fn get_credential(&self) -> Result<Credential>;
}

/// A boxed, reference-counted [`DynamicAuthProvider`].
pub type ArcDynAuthProvider = Arc<dyn DynamicAuthProvider>;

/// Where the manager gets the credential for the next handshake.
#[derive(Clone, Default)]
pub enum ResolvedAuth {
    /// Nothing supplied yet; `reconnect()` fails until `connect()` is called.
    #[default]
    None,
    /// The credential from the last `connect()` call.
    Static(Credential),
    /// Dynamic provider called before every handshake.
    Dynamic(ArcDynAuthProvider),
}

impl ResolvedAuth {
    /// Obtain effective credentials, calling the dynamic provider if present.
    pub async fn resolve(&self) -> Result<Credential> {
        let credential = match self {
            Self::None => {
                return Err(AtlasLinkError::ConfigurationError(
                    "No credential available; call connect() first".to_string(),
                ))
            },
            Self::Static(c) => c.clone(),
            Self::Dynamic(provider) => provider.get_credential().await?,
        };
        if credential.is_empty() {
            return Err(AtlasLinkError::AuthenticationError("Empty credential".to_string()));
        }
        Ok(credential)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "ResolvedAuth::None"),
            Self::Static(c) => write!(f, "ResolvedAuth::Static({:?})", c),
            Self::Dynamic(_) => write!(f, "ResolvedAuth::Dynamic(<fn>)"),
        }
    }
}

impl From<Credential> for ResolvedAuth {
    fn from(c: Credential) -> Self {
        Self::Static(c)
    }
}

impl From<ArcDynAuthProvider> for ResolvedAuth {
    fn from(p: ArcDynAuthProvider) -> Self {
        Self::Dynamic(p)
    }
}

// ── Credential watcher ───────────────────────────────────────────────────────

/// Follow an external credential source.
///
/// `None` (logout / revocation) disconnects the session. A new `Some` value
/// replaces the session credential via `connect()`, unless the client was
/// closed by the application rather than by an earlier revocation. Runs until
/// the sender or the client is dropped.
pub(crate) async fn watch_credentials(
    mut rx: watch::Receiver<Option<Credential>>,
    manager: WeakConnectionManager,
) {
    let mut revoked = false;
    loop {
        if rx.changed().await.is_err() {
            log::debug!("[atlas-link] Credential source closed; watcher exiting");
            return;
        }
        let next = rx.borrow_and_update().clone();
        let Some(manager) = manager.upgrade() else {
            return;
        };
        match next {
            None => {
                log::info!("[atlas-link] Credential revoked; disconnecting");
                revoked = true;
                manager.disconnect().await;
            },
            Some(credential) => {
                if !revoked && manager.status().state == crate::models::ConnectionState::Closed {
                    continue;
                }
                revoked = false;
                log::info!("[atlas-link] Credential changed; re-authenticating");
                if let Err(e) = manager.connect(credential).await {
                    log::warn!("[atlas-link] Re-authentication failed: {}", e);
                }
            },
        }
    }
}
