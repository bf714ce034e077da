//! Application root: constructs the state objects and wires the components.
//!
//! Nothing here is a singleton; a test or embedder can hold several
//! independent sessions against different servers.

use std::sync::Arc;

use inkframe_api_client::{ApiClient, ApiClientConfig};

use crate::config::CoreConfig;
use crate::error::Result;
use crate::router::MessageRouter;
use crate::store::{ConnectionFlag, ImageStore, PromptStore};
use crate::tracker::{JobTracker, StatusSource};
use crate::transport::{TransportClient, TransportConfig};

pub struct Session {
    config: CoreConfig,
    api: Arc<ApiClient>,
    connection: Arc<ConnectionFlag>,
    prompts: Arc<PromptStore>,
    images: Arc<ImageStore>,
    tracker: Arc<JobTracker>,
    router: Arc<MessageRouter>,
    transport: Arc<TransportClient>,
}

impl Session {
    pub fn new(config: CoreConfig) -> Result<Self> {
        let api = Arc::new(ApiClient::new(ApiClientConfig::new(
            config.api_base_url.clone(),
        ))?);
        let connection = Arc::new(ConnectionFlag::default());
        let prompts = Arc::new(PromptStore::new(Arc::clone(&api), config.history_limit));
        let tracker = Arc::new(JobTracker::new(
            Arc::clone(&api) as Arc<dyn StatusSource>,
            config.poll_interval,
        ));
        let images = Arc::new(ImageStore::new(
            Arc::clone(&api),
            Arc::clone(&tracker),
            config.gallery_limit,
        ));
        let router = Arc::new(MessageRouter::new(Arc::clone(&prompts)));
        let transport = Arc::new(TransportClient::new(
            TransportConfig {
                url: config.ws_url.clone(),
                reconnect_delay: config.reconnect_delay,
                connect_timeout: config.connect_timeout,
            },
            Arc::clone(&router),
            Arc::clone(&connection),
        )?);

        Ok(Self {
            config,
            api,
            connection,
            prompts,
            images,
            tracker,
            router,
            transport,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(CoreConfig::from_env()?)
    }

    /// Open the realtime channel; idempotent.
    pub fn connect(&self) {
        self.transport.connect();
    }

    /// Stop polling and permanently tear down the realtime channel.
    pub async fn shutdown(&self) {
        self.tracker.stop_polling();
        self.transport.disconnect().await;
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn connection(&self) -> &ConnectionFlag {
        &self.connection
    }

    pub fn prompts(&self) -> &PromptStore {
        &self.prompts
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn transport(&self) -> &Arc<TransportClient> {
        &self.transport
    }
}
