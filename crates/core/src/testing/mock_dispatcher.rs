//! Mock remote dispatcher for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::dispatch::{DispatchError, RemoteDispatcher};
use crate::job::{JobState, JobStore, TransferRequest};

/// A recorded send for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSend {
    /// The request that was sent.
    pub request: TransferRequest,
    /// The initiating job id.
    pub process_id: String,
    /// Stored state of the job when `send` was called (needs a store).
    pub state_at_send: Option<JobState>,
}

/// A recorded acknowledgment for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAcknowledgment {
    pub callback_address: String,
    pub process_id: String,
}

/// Mock implementation of the RemoteDispatcher trait.
///
/// # Example
///
/// ```rust,ignore
/// use courier_core::testing::MockDispatcher;
///
/// let dispatcher = MockDispatcher::new();
/// dispatcher.fail_next("connection refused").await;
/// ```
#[derive(Default)]
pub struct MockDispatcher {
    sends: Arc<RwLock<Vec<RecordedSend>>>,
    acknowledgments: Arc<RwLock<Vec<RecordedAcknowledgment>>>,
    /// Consulted at call time to record the persisted job state.
    store: Option<Arc<dyn JobStore>>,
    /// If set, the next send fails with this transport error.
    next_error: Arc<RwLock<Option<String>>>,
}

impl MockDispatcher {
    /// Create a new mock dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the stored job state each time `send` is called.
    pub fn with_store(store: Arc<dyn JobStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }

    /// Get all recorded sends.
    pub async fn recorded_sends(&self) -> Vec<RecordedSend> {
        self.sends.read().await.clone()
    }

    /// Get the number of sends attempted.
    pub async fn send_count(&self) -> usize {
        self.sends.read().await.len()
    }

    /// Get all recorded acknowledgments.
    pub async fn recorded_acknowledgments(&self) -> Vec<RecordedAcknowledgment> {
        self.acknowledgments.read().await.clone()
    }

    /// Make the next send fail with a transport error.
    pub async fn fail_next(&self, message: impl Into<String>) {
        *self.next_error.write().await = Some(message.into());
    }
}

#[async_trait]
impl RemoteDispatcher for MockDispatcher {
    async fn send(&self, request: &TransferRequest, process_id: &str) -> Result<(), DispatchError> {
        let state_at_send = self
            .store
            .as_ref()
            .and_then(|store| store.get(process_id).ok().flatten())
            .map(|job| job.state);

        self.sends.write().await.push(RecordedSend {
            request: request.clone(),
            process_id: process_id.to_string(),
            state_at_send,
        });

        match self.next_error.write().await.take() {
            Some(message) => Err(DispatchError::Transport(message)),
            None => Ok(()),
        }
    }

    async fn acknowledge(
        &self,
        callback_address: &str,
        process_id: &str,
    ) -> Result<(), DispatchError> {
        self.acknowledgments.write().await.push(RecordedAcknowledgment {
            callback_address: callback_address.to_string(),
            process_id: process_id.to_string(),
        });
        Ok(())
    }
}
