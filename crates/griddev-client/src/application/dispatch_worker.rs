//! The single background task that puts requests on the wire.
//!
//! The worker pops requests in FIFO order and posts each one through a
//! [`Transport`].  When a post fails it asks the [`ServerSupervisor`] to make
//! the server reachable again (which may mean starting a new server process)
//! and resends the same request.  If the server cannot be brought back, the
//! request is finished with a synthetic `SERVER_ERROR` reply carrying the
//! transport error, and the worker moves on to the next one.
//!
//! Resending after a reconnect gives at-least-once delivery: a request whose
//! reply was lost in flight may be applied twice.

use std::sync::Arc;

use async_trait::async_trait;
use griddev_core::Status;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::request_queue::{Request, RequestState};

/// Resends allowed for one request while the server keeps answering probes
/// but failing the request itself.
///
/// Without this cap a server that accepts connections but rejects one
/// request (HTTP 500, say) would pin the worker on that request forever.
/// Once the cap is hit the request fails as if the probe had failed.
pub const MAX_RESENDS: u32 = 3;

/// Failure to complete one HTTP exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connecting, sending or reading the body failed.
    #[error("request failed: {0}")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The server answered with a non-200 HTTP status.
    #[error("server answered HTTP {0}")]
    Status(u16),
}

/// Carries one encoded request to the server and returns the reply body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, body: &[u8]) -> Result<Vec<u8>, TransportError>;
}

/// Keeps a server process reachable.
#[async_trait]
pub trait ServerSupervisor: Send + Sync {
    /// Makes the server reachable, starting it if needed.  Returns `false`
    /// once every attempt has failed.
    async fn probe(&self) -> bool;

    /// Stops the tracked server process, if any.
    async fn destroy(&self);
}

/// Consumes the request queue and drives the transport.
pub struct DispatchWorker {
    rx: mpsc::UnboundedReceiver<Request>,
    transport: Arc<dyn Transport>,
    supervisor: Arc<dyn ServerSupervisor>,
}

impl DispatchWorker {
    pub fn new(
        rx: mpsc::UnboundedReceiver<Request>,
        transport: Arc<dyn Transport>,
        supervisor: Arc<dyn ServerSupervisor>,
    ) -> Self {
        Self {
            rx,
            transport,
            supervisor,
        }
    }

    /// Runs the worker on the current Tokio runtime.
    ///
    /// The task ends once every [`RequestQueue`](super::request_queue::RequestQueue)
    /// clone has been dropped and the queue is empty.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        debug!("dispatch worker started");
        while let Some(mut request) = self.rx.recv().await {
            self.dispatch(&mut request).await;
        }
        info!("dispatch worker stopped");
    }

    /// Posts `request` until it gets a reply.  After a failed post the
    /// request is resent only if the probe succeeds, and at most
    /// [`MAX_RESENDS`] times even when every probe succeeds.
    async fn dispatch(&self, request: &mut Request) {
        let mut resends = 0;
        loop {
            request.set_state(RequestState::InFlight);
            let error = match self.transport.post(request.body()).await {
                Ok(body) => {
                    if body.first() != Some(&(Status::Ok as u8)) && !request.opcode().expects_result() {
                        warn!(opcode = ?request.opcode(), "server rejected fire-and-forget request");
                    }
                    request.finish(body, None);
                    return;
                }
                Err(e) => e,
            };

            warn!(opcode = ?request.opcode(), error = %error, "request failed, probing server");
            if resends < MAX_RESENDS && self.supervisor.probe().await {
                resends += 1;
                request.set_state(RequestState::Retry);
                debug!(opcode = ?request.opcode(), attempt = resends, "server reachable, resending");
                continue;
            }

            error!(opcode = ?request.opcode(), error = %error, "grid server unreachable, giving up on request");
            self.supervisor.destroy().await;
            request.finish(vec![Status::ServerError as u8], Some(error));
            return;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::application::request_queue::RequestQueue;
    use crate::error::ClientError;
    use griddev_core::Opcode;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // ── Test doubles ─────────────────────────────────────────────────────────

    /// Replays scripted outcomes and records every body it was given.
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl ScriptedTransport {
        fn with(script: Vec<Result<Vec<u8>, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                sent: Mutex::default(),
            })
        }

        fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post(&self, body: &[u8]) -> Result<Vec<u8>, TransportError> {
            self.sent.lock().unwrap().push(body.to_vec());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(vec![Status::Ok as u8]))
        }
    }

    pub(crate) struct FixedSupervisor {
        reachable: bool,
        checks: AtomicUsize,
        destroys: AtomicUsize,
    }

    impl FixedSupervisor {
        pub(crate) fn new(reachable: bool) -> Arc<Self> {
            Arc::new(Self {
                reachable,
                checks: AtomicUsize::new(0),
                destroys: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ServerSupervisor for FixedSupervisor {
        async fn probe(&self) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.reachable
        }

        async fn destroy(&self) {
            self.destroys.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Answers every request with `[OK]` followed by the request's tag.
    #[derive(Default)]
    struct EchoTransport {
        wire: Mutex<Vec<i32>>,
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn post(&self, body: &[u8]) -> Result<Vec<u8>, TransportError> {
            let tag = i32::from_be_bytes([body[1], body[2], body[3], body[4]]);
            self.wire.lock().unwrap().push(tag);
            let mut reply = vec![Status::Ok as u8];
            reply.extend_from_slice(&tag.to_be_bytes());
            Ok(reply)
        }
    }

    fn refused() -> Result<Vec<u8>, TransportError> {
        Err(TransportError::Request("connection refused".into()))
    }

    fn start(transport: Arc<ScriptedTransport>, supervisor: Arc<FixedSupervisor>) -> RequestQueue {
        let (queue, rx) = RequestQueue::channel();
        DispatchWorker::new(rx, transport, supervisor).spawn();
        queue
    }

    // ── Tests ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_wire_order_matches_enqueue_order() {
        // Arrange
        let transport = ScriptedTransport::with(vec![]);
        let queue = start(transport.clone(), FixedSupervisor::new(true));

        // Act
        queue.submit(vec![Opcode::Hold as u8, 1]).unwrap();
        queue.submit(vec![Opcode::Flush as u8, 2]).unwrap();
        queue
            .submit_for_reply(vec![Opcode::GetWidth as u8, 3])
            .unwrap()
            .wait()
            .await
            .unwrap();

        // Assert
        assert_eq!(
            transport.sent(),
            vec![
                vec![Opcode::Hold as u8, 1],
                vec![Opcode::Flush as u8, 2],
                vec![Opcode::GetWidth as u8, 3]
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_post_is_resent_once_server_is_reachable() {
        // Arrange
        let transport = ScriptedTransport::with(vec![refused(), Ok(vec![Status::Ok as u8, 0, 0, 0, 9])]);
        let supervisor = FixedSupervisor::new(true);
        let queue = start(transport.clone(), supervisor.clone());

        // Act
        let mut decoder = queue
            .submit_for_reply(vec![Opcode::GetNativeWidth as u8])
            .unwrap()
            .wait()
            .await
            .unwrap();

        // Assert
        assert_eq!(decoder.read_int().unwrap(), 9);
        assert_eq!(transport.sent().len(), 2);
        assert_eq!(supervisor.checks.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.destroys.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unrecoverable_failure_surfaces_cause_and_destroys_server() {
        // Arrange
        let transport = ScriptedTransport::with(vec![refused()]);
        let supervisor = FixedSupervisor::new(false);
        let queue = start(transport, supervisor.clone());

        // Act
        let result = queue
            .submit_for_reply(vec![Opcode::GetHeight as u8])
            .unwrap()
            .wait()
            .await;

        // Assert
        assert!(matches!(
            result,
            Err(ClientError::Unreachable {
                opcode: Opcode::GetHeight,
                ..
            })
        ));
        assert_eq!(supervisor.destroys.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_worker_continues_after_giving_up_on_a_request() {
        let transport = ScriptedTransport::with(vec![refused()]);
        let queue = start(transport.clone(), FixedSupervisor::new(false));

        queue.submit(vec![Opcode::Hold as u8]).unwrap();
        let reply = queue.submit_for_reply(vec![Opcode::GetWidth as u8]).unwrap();

        assert!(reply.wait().await.is_ok());
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_resends_are_bounded_while_server_stays_reachable() {
        // Arrange: the server is reachable but every post fails
        let transport = ScriptedTransport::with((0..10).map(|_| Err(TransportError::Status(500))).collect());
        let supervisor = FixedSupervisor::new(true);
        let queue = start(transport.clone(), supervisor.clone());

        // Act
        let result = queue
            .submit_for_reply(vec![Opcode::GetWidth as u8])
            .unwrap()
            .wait()
            .await;

        // Assert
        assert!(result.is_err());
        assert_eq!(transport.sent().len(), MAX_RESENDS as usize + 1);
        assert_eq!(supervisor.checks.load(Ordering::SeqCst), MAX_RESENDS as usize);
    }

    #[tokio::test]
    async fn test_concurrent_callers_are_answered_in_enqueue_order() {
        // Arrange
        let transport = Arc::new(EchoTransport::default());
        let (queue, rx) = RequestQueue::channel();
        DispatchWorker::new(rx, transport.clone(), FixedSupervisor::new(true)).spawn();
        let enqueued = Arc::new(Mutex::new(Vec::new()));
        let completed = Arc::new(Mutex::new(Vec::new()));

        // Act
        let callers: Vec<_> = (1..=16)
            .map(|tag: i32| {
                let queue = queue.clone();
                let enqueued = Arc::clone(&enqueued);
                let completed = Arc::clone(&completed);
                tokio::spawn(async move {
                    let mut body = vec![Opcode::GetNativeWidth as u8];
                    body.extend_from_slice(&tag.to_be_bytes());
                    let reply = {
                        let mut order = enqueued.lock().unwrap();
                        let reply = queue.submit_for_reply(body).unwrap();
                        order.push(tag);
                        reply
                    };
                    let echoed = reply.wait().await.unwrap().read_int().unwrap();
                    assert_eq!(echoed, tag);
                    completed.lock().unwrap().push(tag);
                })
            })
            .collect();
        for caller in callers {
            caller.await.unwrap();
        }

        // Assert
        let enqueued = enqueued.lock().unwrap().clone();
        assert_eq!(enqueued.len(), 16);
        assert_eq!(*transport.wire.lock().unwrap(), enqueued);
        assert_eq!(*completed.lock().unwrap(), enqueued);
    }
}
