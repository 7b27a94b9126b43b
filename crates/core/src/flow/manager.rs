use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{DataFlowController, FlowGateway, FlowOutcome};
use crate::job::TransferRequest;

/// Routes each request to the first registered controller that can handle it.
#[derive(Default)]
pub struct DataFlowManager {
    controllers: Vec<Arc<dyn DataFlowController>>,
}

impl DataFlowManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller. Controllers are consulted in registration order.
    pub fn register(&mut self, controller: Arc<dyn DataFlowController>) {
        self.controllers.push(controller);
    }

    pub fn with_controller(mut self, controller: Arc<dyn DataFlowController>) -> Self {
        self.register(controller);
        self
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

#[async_trait]
impl FlowGateway for DataFlowManager {
    async fn initiate(&self, request: &TransferRequest) -> FlowOutcome {
        match self.controllers.iter().find(|c| c.can_handle(request)) {
            Some(controller) => {
                debug!("Routing request {} to data flow controller {}", request.id, controller.name());
                controller.initiate(request).await
            }
            None => FlowOutcome::Fatal(format!(
                "no data flow controller for destination kind '{}'",
                request.destination.kind
            )),
        }
    }
}
