//! Cairn Worker Client
//!
//! Client for the resource API exposed by every worker in the fleet.
//!
//! The collectors talk to workers through the [`WorkerApi`] trait so that
//! sweeps can be exercised without a live fleet. [`HttpWorkerClient`] is the
//! production implementation.
//!
//! # Example
//!
//! ```no_run
//! use cairn_client::{HttpWorkerClient, WorkerApi};
//! use cairn_core::domain::worker::{Worker, WorkerState};
//! use std::time::Duration;
//!
//! # async fn example() -> cairn_client::Result<()> {
//! let client = HttpWorkerClient::new(Duration::from_secs(10))?;
//! let worker = Worker {
//!     name: "worker-1".to_string(),
//!     address: "http://10.0.0.5:7777".to_string(),
//!     state: WorkerState::Running,
//! };
//!
//! let outcome = client.delete_container(&worker, "c-1234").await;
//! println!("delete finished: {:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod error;
mod containers;
mod volumes;

pub use error::{ClientError, Result};

use async_trait::async_trait;
use cairn_core::domain::worker::Worker;
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;

/// Result of asking a worker to delete a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Worker deleted the resource
    Deleted,

    /// Worker has no such handle (already purged)
    NotFound,

    /// Volume is still mounted somewhere
    InUse,

    /// Worker could not be reached
    Unreachable(String),

    /// Worker did not answer within the deadline
    TimedOut,

    /// Worker answered with an unexpected status
    Rejected { status: u16, message: String },
}

impl DeleteOutcome {
    /// Whether the resource no longer exists on the worker
    ///
    /// `NotFound` counts as gone: deletion is idempotent.
    pub fn is_gone(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted | DeleteOutcome::NotFound)
    }
}

/// Resource API exposed by a worker
#[async_trait]
pub trait WorkerApi: Send + Sync {
    /// Delete a container by handle on the given worker
    async fn delete_container(&self, worker: &Worker, handle: &str) -> DeleteOutcome;

    /// Delete a volume by handle on the given worker
    async fn delete_volume(&self, worker: &Worker, handle: &str) -> DeleteOutcome;
}

/// HTTP implementation of [`WorkerApi`]
#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    client: Client,
}

impl HttpWorkerClient {
    /// Create a client whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// URL of one resource on a worker
    ///
    /// The handle is opaque, so it is pushed as a single percent-encoded
    /// path segment after any base path the worker address carries.
    fn resource_url(worker: &Worker, collection: &str, handle: &str) -> Result<Url> {
        let mut url = Url::parse(&worker.address)
            .map_err(|e| ClientError::InvalidAddress(format!("{}: {}", worker.address, e)))?;

        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidAddress(worker.address.clone()))?
            .pop_if_empty()
            .push(collection)
            .push(handle);

        Ok(url)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle the response of a DELETE call
    ///
    /// 404 and 409 get their own variants so callers can tell idempotent
    /// and transient outcomes apart from real failures.
    async fn handle_delete_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        match status {
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(error_text)),
            StatusCode::CONFLICT => Err(ClientError::Conflict(error_text)),
            _ => Err(ClientError::api_error(status.as_u16(), error_text)),
        }
    }
}

#[async_trait]
impl WorkerApi for HttpWorkerClient {
    async fn delete_container(&self, worker: &Worker, handle: &str) -> DeleteOutcome {
        match self.destroy_container(worker, handle).await {
            Ok(()) => DeleteOutcome::Deleted,
            Err(e) => {
                tracing::debug!(worker = %worker.name, handle, "container delete failed: {}", e);
                e.into()
            }
        }
    }

    async fn delete_volume(&self, worker: &Worker, handle: &str) -> DeleteOutcome {
        match self.destroy_volume(worker, handle).await {
            Ok(()) => DeleteOutcome::Deleted,
            Err(ClientError::Conflict(_)) => DeleteOutcome::InUse,
            Err(e) => {
                tracing::debug!(worker = %worker.name, handle, "volume delete failed: {}", e);
                e.into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::domain::worker::WorkerState;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn worker(address: &str) -> Worker {
        Worker {
            name: "worker-1".to_string(),
            address: address.to_string(),
            state: WorkerState::Running,
        }
    }

    #[test]
    fn test_resource_url_trims_trailing_slash() {
        let url =
            HttpWorkerClient::resource_url(&worker("http://w:7777/"), "volumes", "v-1").unwrap();
        assert_eq!(url.as_str(), "http://w:7777/volumes/v-1");
    }

    #[test]
    fn test_resource_url_encodes_handle_as_one_segment() {
        let url = HttpWorkerClient::resource_url(
            &worker("http://w:7777/garden"),
            "containers",
            "build#42/step?x=%",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "http://w:7777/garden/containers/build%2342%2Fstep%3Fx=%25"
        );
    }

    #[tokio::test]
    async fn test_malformed_address_is_unreachable() {
        let client = HttpWorkerClient::new(Duration::from_secs(2)).unwrap();
        let outcome = client.delete_volume(&worker("10.0.0.5 port 7777"), "v-1").await;

        assert!(matches!(outcome, DeleteOutcome::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_delete_request_targets_the_exact_handle() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 204 No Content\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            let text = String::from_utf8_lossy(&request).to_string();
            text.lines().next().unwrap_or_default().to_string()
        });

        let client = HttpWorkerClient::new(Duration::from_secs(5)).unwrap();
        let outcome = client.delete_container(&worker(&address), "build#42/a").await;

        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert_eq!(
            server.await.unwrap(),
            "DELETE /containers/build%2342%2Fa HTTP/1.1"
        );
    }

    #[test]
    fn test_gone_outcomes() {
        assert!(DeleteOutcome::Deleted.is_gone());
        assert!(DeleteOutcome::NotFound.is_gone());
        assert!(!DeleteOutcome::InUse.is_gone());
        assert!(!DeleteOutcome::TimedOut.is_gone());
        assert!(!DeleteOutcome::Unreachable("refused".to_string()).is_gone());
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = HttpWorkerClient::new(Duration::from_secs(2)).unwrap();
        let outcome = client.delete_container(&worker(&address), "c-1").await;

        assert!(matches!(
            outcome,
            DeleteOutcome::Unreachable(_) | DeleteOutcome::TimedOut
        ));
    }
}
