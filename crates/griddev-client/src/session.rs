//! Composition root: wires the queue, dispatch worker, release drainer,
//! transport and supervisor into one [`Session`].
//!
//! # Architecture
//!
//! ```text
//! callers ──► RequestQueue ──► DispatchWorker ──► Transport ──► grid server
//!                ▲                   │
//!   ReleaseQueue ┘ (drainer)         └─ on failure: ServerSupervisor::probe
//! ```

use std::sync::Arc;

use griddev_core::{DeviceRequest, Opcode, WireEncoder};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::context_cache::ReleaseQueue;
use crate::application::dispatch_worker::{DispatchWorker, ServerSupervisor, Transport};
use crate::application::remote_device::RemoteDevice;
use crate::application::request_queue::RequestQueue;
use crate::error::ClientError;
use crate::infrastructure::storage::config::ClientConfig;
use crate::infrastructure::supervisor::{locate_server_executable, ExecutableLauncher, ProcessSupervisor};
use crate::infrastructure::transport::HttpTransport;

/// Device id the server answers when it cannot render the requested format.
const UNSUPPORTED_DEVICE_ID: i32 = -1;

/// One connection to a grid server, shared by every device it opens.
///
/// Must be created inside a Tokio runtime.
pub struct Session {
    queue: RequestQueue,
    releases: Arc<ReleaseQueue>,
    supervisor: Arc<dyn ServerSupervisor>,
    worker: JoinHandle<()>,
    drainer: DrainerTask,
}

/// The release drainer, aborted when dropped.
///
/// The drainer holds a queue sender, so while it runs the dispatch worker
/// cannot see the queue close.  A session dropped without
/// [`Session::shutdown`] still lets the worker finish this way.
struct DrainerTask(JoinHandle<()>);

impl DrainerTask {
    async fn stop(&mut self) {
        self.0.abort();
        let _ = (&mut self.0).await;
    }
}

impl Drop for DrainerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Session {
    /// Starts a session that talks HTTP to the configured port and launches
    /// the server executable on demand.
    ///
    /// The server is not started here; the first request that fails to
    /// connect triggers the launch.
    ///
    /// # Errors
    ///
    /// [`ClientError::Supervisor`] if the server executable cannot be found,
    /// [`ClientError::TransportSetup`] if the HTTP client cannot be built.
    pub fn start(config: &ClientConfig) -> Result<Self, ClientError> {
        let executable = match &config.server_executable {
            Some(path) => path.clone(),
            None => locate_server_executable()?,
        };
        info!(executable = %executable.display(), port = config.port, "starting grid session");

        let transport = HttpTransport::new(config.port).map_err(ClientError::TransportSetup)?;
        let launcher = Arc::new(ExecutableLauncher::new(executable, config.port));
        let supervisor = ProcessSupervisor::new(launcher, config.port, config.retry.policy());
        Ok(Self::with_parts(Arc::new(transport), Arc::new(supervisor)))
    }

    /// Builds a session around injected collaborators.
    pub fn with_parts(transport: Arc<dyn Transport>, supervisor: Arc<dyn ServerSupervisor>) -> Self {
        let (queue, rx) = RequestQueue::channel();
        let worker = DispatchWorker::new(rx, transport, Arc::clone(&supervisor)).spawn();
        let releases = ReleaseQueue::new();
        let drainer = DrainerTask(tokio::spawn(Arc::clone(&releases).run_drainer(queue.clone())));
        Self {
            queue,
            releases,
            supervisor,
            worker,
            drainer,
        }
    }

    /// Opens an image device writing `filename` in `file_type` format.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotSupportedImageFormat`] if the server cannot render
    /// `file_type`.
    pub async fn open_image(
        &self,
        filename: &str,
        file_type: &str,
        width: i32,
        height: i32,
    ) -> Result<RemoteDevice, ClientError> {
        self.open(DeviceRequest::image(filename, file_type, width, height))
            .await
    }

    /// Opens an on-screen window device.
    pub async fn open_window(&self, width: i32, height: i32) -> Result<RemoteDevice, ClientError> {
        self.open(DeviceRequest::window(width, height)).await
    }

    async fn open(&self, request: DeviceRequest) -> Result<RemoteDevice, ClientError> {
        let mut encoder = WireEncoder::new();
        encoder.write_byte(Opcode::CreateImage as u8);
        request.encode(&mut encoder);
        let device_id = self
            .queue
            .submit_for_reply(encoder.reset_write())?
            .wait()
            .await?
            .read_int()?;
        if device_id == UNSUPPORTED_DEVICE_ID {
            return Err(ClientError::NotSupportedImageFormat(
                request.file_type.unwrap_or_default(),
            ));
        }
        info!(device_id, device_type = ?request.device_type, "device opened");
        Ok(RemoteDevice::new(
            device_id,
            self.queue.clone(),
            Arc::clone(&self.releases),
        ))
    }

    /// Queues a release for every context dropped since the last drain and
    /// returns how many were queued.
    pub fn drain_pending_releases(&self) -> usize {
        self.releases.drain_into(&self.queue)
    }

    /// Context ids dropped but not yet queued for release.
    pub fn pending_releases(&self) -> usize {
        self.releases.pending()
    }

    /// Sends pending releases, waits for every queued request to go out and
    /// stops the background tasks.
    ///
    /// Devices still held by the caller keep the worker alive; close or drop
    /// them first.  Dropping a session without calling this stops the
    /// drainer but does not wait for queued requests.
    pub async fn shutdown(self) {
        self.releases.drain_into(&self.queue);
        let mut drainer = self.drainer;
        drainer.stop().await;
        drop(self.queue);
        if let Err(e) = self.worker.await {
            warn!(error = %e, "dispatch worker ended abnormally");
        }
        info!("grid session stopped");
    }

    /// Kills the server process this session started, if any.
    pub async fn destroy_server(&self) {
        self.supervisor.destroy().await;
    }
}
