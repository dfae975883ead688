use std::sync::Arc;

use printsort_core::{Config, DeviceLink, JobStore, PollLoop, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    store: Arc<dyn JobStore>,
    link: Arc<DeviceLink>,
    poll_loop: Option<Arc<PollLoop>>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn JobStore>,
        link: Arc<DeviceLink>,
        poll_loop: Option<Arc<PollLoop>>,
    ) -> Self {
        Self {
            config,
            store,
            link,
            poll_loop,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn store(&self) -> &dyn JobStore {
        self.store.as_ref()
    }

    pub fn link(&self) -> &DeviceLink {
        self.link.as_ref()
    }

    /// `None` when the orchestrator is disabled in config.
    pub fn poll_loop(&self) -> Option<&PollLoop> {
        self.poll_loop.as_deref()
    }
}
