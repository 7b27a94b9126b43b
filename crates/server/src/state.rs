use std::sync::Arc;

use courier_core::{Config, JobStore, TransferOrchestrator};

/// Shared application state
pub struct AppState {
    config: Config,
    store: Arc<dyn JobStore>,
    orchestrator: Arc<TransferOrchestrator>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn JobStore>,
        orchestrator: Arc<TransferOrchestrator>,
    ) -> Self {
        Self {
            config,
            store,
            orchestrator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &dyn JobStore {
        self.store.as_ref()
    }

    pub fn orchestrator(&self) -> &TransferOrchestrator {
        self.orchestrator.as_ref()
    }
}
