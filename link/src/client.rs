//! Main atlas-link client with builder pattern.
//!
//! [`AtlasLinkClientBuilder::build`] is the composition root: it wires the
//! event router, the cache synchronizer and the connection manager together
//! explicitly. There is no process-wide instance.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{
    auth::{watch_credentials, ArcDynAuthProvider, Credential, ResolvedAuth},
    cache::{CacheSynchronizer, DataCache, InMemoryCache, DEFAULT_COLLECTION},
    connection::{ConnectionManager, Connector, SessionId, WebSocketConnector},
    error::{AtlasLinkError, Result},
    event_router::{EventRouter, HandlerId, HandlerRegistration},
    models::{ConnectionOptions, ConnectionStatus, EventEnvelope, RegionBounds, SubscriptionInfo},
    timeouts::LinkTimeouts,
};

/// Real-time sync client.
///
/// Use [`AtlasLinkClientBuilder`] to construct instances.
///
/// # Examples
///
/// ```rust,no_run
/// use atlas_link::{AtlasLinkClient, RegionBounds, topics};
///
/// # async fn example() -> atlas_link::Result<()> {
/// let client = AtlasLinkClient::builder()
///     .base_url("https://sync.example.com")
///     .build()?;
///
/// client.on(topics::CONNECTION_STATUS, |event| {
///     println!("status: {}", event.payload);
///     Ok(())
/// });
///
/// client.subscribe(RegionBounds::new(10.0, 0.0, 10.0, 0.0)).await?;
/// client.connect("token-a").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AtlasLinkClient {
    manager: ConnectionManager,
    router: Arc<EventRouter>,
    cache: Arc<dyn DataCache>,
    synchronizer: Arc<CacheSynchronizer>,
    timeouts: LinkTimeouts,
    connection_options: ConnectionOptions,
}

impl std::fmt::Debug for AtlasLinkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlasLinkClient")
            .field("manager", &self.manager)
            .field("router", &self.router)
            .field("synchronizer", &self.synchronizer)
            .finish()
    }
}

impl AtlasLinkClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> AtlasLinkClientBuilder {
        AtlasLinkClientBuilder::new()
    }

    // ── Connection ──────────────────────────────────────────────────────────

    /// Authenticate and establish the session.
    pub async fn connect(&self, credential: impl Into<Credential>) -> Result<SessionId> {
        self.manager.connect(credential.into()).await
    }

    /// Resume after retries were exhausted or after `disconnect()`.
    pub async fn reconnect(&self) -> Result<SessionId> {
        self.manager.reconnect().await
    }

    pub async fn disconnect(&self) {
        self.manager.disconnect().await
    }

    /// Disconnect and stop the background task. The client is unusable
    /// afterwards.
    pub async fn shutdown(&self) {
        self.manager.shutdown().await
    }

    pub fn status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.manager.watch_status()
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Follow an external credential source: `None` disconnects, a new
    /// credential re-authenticates. The returned task ends when the sender
    /// or the client is dropped.
    pub fn watch_credentials(&self, rx: watch::Receiver<Option<Credential>>) -> JoinHandle<()> {
        tokio::spawn(watch_credentials(rx, self.manager.downgrade()))
    }

    // ── Subscriptions ───────────────────────────────────────────────────────

    /// Subscribe to a region. Kept across reconnects until unsubscribed.
    pub async fn subscribe(&self, bounds: RegionBounds) -> Result<()> {
        self.manager.subscribe(bounds).await
    }

    pub async fn unsubscribe(&self, bounds: RegionBounds) -> Result<()> {
        self.manager.unsubscribe(bounds).await
    }

    /// Snapshot of every registry entry, inactive ones included.
    pub async fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.manager.list_subscriptions().await
    }

    // ── Events ──────────────────────────────────────────────────────────────

    /// Register a handler on `topic`. See [`EventRouter::on`].
    pub fn on<F>(&self, topic: &str, handler: F) -> HandlerRegistration
    where
        F: Fn(&EventEnvelope) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.router.on(topic, handler)
    }

    pub fn off(&self, topic: &str, id: Option<HandlerId>) -> usize {
        self.router.off(topic, id)
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    // ── Cache ───────────────────────────────────────────────────────────────

    pub fn cache(&self) -> &Arc<dyn DataCache> {
        &self.cache
    }

    /// Collection name the synchronizer writes entities under.
    pub fn cache_collection(&self) -> &str {
        self.synchronizer.collection()
    }

    pub fn timeouts(&self) -> &LinkTimeouts {
        &self.timeouts
    }

    pub fn connection_options(&self) -> &ConnectionOptions {
        &self.connection_options
    }
}

/// Builder for configuring [`AtlasLinkClient`] instances.
pub struct AtlasLinkClientBuilder {
    base_url: Option<String>,
    connector: Option<Arc<dyn Connector>>,
    auth_provider: Option<ArcDynAuthProvider>,
    cache: Option<Arc<dyn DataCache>>,
    collection: String,
    timeouts: LinkTimeouts,
    connection_options: ConnectionOptions,
}

impl AtlasLinkClientBuilder {
    fn new() -> Self {
        Self {
            base_url: None,
            connector: None,
            auth_provider: None,
            cache: None,
            collection: DEFAULT_COLLECTION.to_string(),
            timeouts: LinkTimeouts::default(),
            connection_options: ConnectionOptions::default(),
        }
    }

    /// Server endpoint (`http(s)://` or `ws(s)://`).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Use a custom transport instead of the WebSocket one. Takes precedence
    /// over `base_url`.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Credential source consulted before every reconnect.
    pub fn auth_provider(mut self, provider: ArcDynAuthProvider) -> Self {
        self.auth_provider = Some(provider);
        self
    }

    /// Cache the synchronizer writes to. Defaults to an [`InMemoryCache`].
    pub fn cache(mut self, cache: Arc<dyn DataCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn timeouts(mut self, timeouts: LinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    /// Build the client and start its connection task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<AtlasLinkClient> {
        let connector: Arc<dyn Connector> = match (self.connector, self.base_url) {
            (Some(connector), _) => connector,
            (None, Some(url)) => Arc::new(WebSocketConnector::new(url)?),
            (None, None) => {
                return Err(AtlasLinkError::ConfigurationError(
                    "base_url or connector is required".into(),
                ))
            },
        };
        if self.collection.trim().is_empty() {
            return Err(AtlasLinkError::ConfigurationError(
                "cache collection must not be empty".into(),
            ));
        }

        let router = Arc::new(EventRouter::new());
        let cache: Arc<dyn DataCache> =
            self.cache.unwrap_or_else(|| Arc::new(InMemoryCache::new()));
        let synchronizer = Arc::new(CacheSynchronizer::with_collection(
            cache.clone(),
            self.collection,
        ));
        // Lives as long as the router.
        synchronizer.clone().register(&router);

        let auth = match self.auth_provider {
            Some(provider) => ResolvedAuth::Dynamic(provider),
            None => ResolvedAuth::None,
        };
        let manager = ConnectionManager::spawn(
            connector,
            router.clone(),
            self.connection_options.clone(),
            self.timeouts.clone(),
            auth,
        );

        log::debug!("[atlas-link] Client built ({:?})", self.connection_options.transport);
        Ok(AtlasLinkClient {
            manager,
            router,
            cache,
            synchronizer,
            timeouts: self.timeouts,
            connection_options: self.connection_options,
        })
    }
}
