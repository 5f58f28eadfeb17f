//! Volume endpoints of the worker resource API

use crate::HttpWorkerClient;
use crate::error::Result;
use cairn_core::domain::worker::Worker;

impl HttpWorkerClient {
    /// Destroy a volume on a worker
    ///
    /// A volume that is still mounted is answered with 409 and surfaces
    /// as [`crate::ClientError::Conflict`].
    ///
    /// # Arguments
    /// * `worker` - The worker hosting the volume
    /// * `handle` - The volume handle
    pub async fn destroy_volume(&self, worker: &Worker, handle: &str) -> Result<()> {
        let url = Self::resource_url(worker, "volumes", handle)?;
        let response = self.client.delete(url).send().await?;

        self.handle_delete_response(response).await
    }
}
