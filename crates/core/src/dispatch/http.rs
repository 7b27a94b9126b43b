use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{DispatchError, InboundTransfer, RemoteDispatcher};
use crate::job::TransferRequest;
use crate::metrics;

/// Path on the peer that accepts inbound transfers.
pub const INBOUND_PATH: &str = "/api/v1/transfers/inbound";

/// Dispatches requests as JSON over HTTP to the peer's inbound endpoint.
pub struct HttpDispatcher {
    client: reqwest::Client,
    callback_address: Option<String>,
}

impl HttpDispatcher {
    /// Create a dispatcher with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            callback_address: None,
        })
    }

    /// Advertise `address` to peers as the place to acknowledge transfers.
    pub fn with_callback_address(mut self, address: Option<String>) -> Self {
        self.callback_address = address;
        self
    }

    fn inbound_url(address: &str) -> String {
        format!("{}{}", address.trim_end_matches('/'), INBOUND_PATH)
    }

    fn acknowledge_url(address: &str, process_id: &str) -> String {
        format!(
            "{}/api/v1/transfers/{}/acknowledge",
            address.trim_end_matches('/'),
            process_id
        )
    }

    /// POST `body` (if any) to `url`, counting the result under `metric`.
    async fn post<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: Option<&T>,
        metric: &prometheus::IntCounterVec,
    ) -> Result<(), DispatchError> {
        let mut request = self.client.post(url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                metric.with_label_values(&["error"]).inc();
                return Err(DispatchError::Transport(e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            metric.with_label_values(&["rejected"]).inc();
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        metric.with_label_values(&["success"]).inc();
        Ok(())
    }
}

#[async_trait]
impl RemoteDispatcher for HttpDispatcher {
    async fn send(&self, request: &TransferRequest, process_id: &str) -> Result<(), DispatchError> {
        if request.connector_address.is_empty() {
            return Err(DispatchError::MissingAddress(request.id.clone()));
        }

        let url = Self::inbound_url(&request.connector_address);
        let body = InboundTransfer {
            request: request.clone(),
            process_id: process_id.to_string(),
            callback_address: self.callback_address.clone(),
        };

        debug!("Dispatching request {} to {}", request.id, url);
        self.post(&url, Some(&body), &metrics::DISPATCH_REQUESTS)
            .await
    }

    async fn acknowledge(
        &self,
        callback_address: &str,
        process_id: &str,
    ) -> Result<(), DispatchError> {
        if callback_address.is_empty() {
            return Err(DispatchError::MissingAddress(process_id.to_string()));
        }

        let url = Self::acknowledge_url(callback_address, process_id);
        debug!("Acknowledging job {} at {}", process_id, url);
        self.post::<()>(&url, None, &metrics::ACKNOWLEDGMENTS).await
    }
}
