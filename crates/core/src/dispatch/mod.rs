//! Remote dispatch of transfer requests to a peer.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::TransferRequest;

pub use http::HttpDispatcher;

/// Errors that can occur while dispatching a request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request has no peer address to send to.
    #[error("request {0} has no connector address")]
    MissingAddress(String),

    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer answered with a non-success status.
    #[error("peer rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Message delivered to the peer for an initiated transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundTransfer {
    pub request: TransferRequest,
    /// Id of the initiating job, for correlating the peer's acknowledgment.
    pub process_id: String,
    /// Base address where the initiator accepts acknowledgments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_address: Option<String>,
}

/// Sends a job's request to a remote peer, and acknowledgments back.
#[async_trait]
pub trait RemoteDispatcher: Send + Sync {
    /// Deliver `request`; `process_id` is the initiating job's id.
    async fn send(&self, request: &TransferRequest, process_id: &str) -> Result<(), DispatchError>;

    /// Tell the initiator at `callback_address` that job `process_id` was
    /// accepted.
    async fn acknowledge(&self, callback_address: &str, process_id: &str)
        -> Result<(), DispatchError>;
}
