//! Container endpoints of the worker resource API

use crate::HttpWorkerClient;
use crate::error::Result;
use cairn_core::domain::worker::Worker;

impl HttpWorkerClient {
    /// Destroy a container on a worker
    ///
    /// # Arguments
    /// * `worker` - The worker hosting the container
    /// * `handle` - The container handle
    pub async fn destroy_container(&self, worker: &Worker, handle: &str) -> Result<()> {
        let url = Self::resource_url(worker, "containers", handle)?;
        let response = self.client.delete(url).send().await?;

        self.handle_delete_response(response).await
    }
}
