//! FIFO of encoded requests shared by every caller of one session.
//!
//! # Calling conventions (for beginners)
//!
//! Every request body starts with its opcode byte.  Bit `0x40` of that byte
//! tells both sides whether a reply payload is expected:
//!
//! - **Fire-and-forget** (`0x40` clear, e.g. DRAW_RECT): [`RequestQueue::submit`]
//!   enqueues the body and returns at once.  Failures are only logged.
//! - **Result-bearing** (`0x40` set, e.g. GET_WIDTH):
//!   [`RequestQueue::submit_for_reply`] enqueues the body and hands back a
//!   [`PendingReply`].  Awaiting it yields a decoder positioned just after the
//!   status byte.
//!
//! Because a single worker drains the queue in order, a result-bearing call
//! also acts as a barrier: once its reply arrives, every request the same
//! caller enqueued before it has been sent.

use griddev_core::{Opcode, Status, WireDecoder};
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::application::dispatch_worker::TransportError;
use crate::error::ClientError;

/// Lifecycle of a single request.
///
/// ```text
/// Created ─► Enqueued ─► InFlight ─┬─► FinishedOk
///                          ▲       ├─► FinishedError
///                          └─ Retry ◄┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Created,
    Enqueued,
    InFlight,
    Retry,
    FinishedOk,
    FinishedError,
}

impl RequestState {
    pub fn is_finished(self) -> bool {
        matches!(self, RequestState::FinishedOk | RequestState::FinishedError)
    }
}

/// What the dispatch worker hands back to a waiting caller.
#[derive(Debug)]
pub(crate) struct RequestOutcome {
    pub(crate) body: Vec<u8>,
    pub(crate) cause: Option<TransportError>,
}

/// One encoded request travelling from a caller to the dispatch worker.
#[derive(Debug)]
pub struct Request {
    opcode: Opcode,
    body: Vec<u8>,
    state: RequestState,
    completion: Option<oneshot::Sender<RequestOutcome>>,
}

impl Request {
    fn new(body: Vec<u8>, completion: Option<oneshot::Sender<RequestOutcome>>) -> Result<Self, ClientError> {
        let raw = *body
            .first()
            .ok_or_else(|| ClientError::InvalidRequest("empty request body".to_string()))?;
        let opcode = Opcode::try_from(raw)
            .map_err(|_| ClientError::InvalidRequest(format!("unknown opcode 0x{raw:02X}")))?;
        Ok(Self {
            opcode,
            body,
            state: RequestState::Created,
            completion,
        })
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Encoded body, opcode byte included.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: RequestState) {
        trace!(opcode = ?self.opcode, from = ?self.state, to = ?state, "request state");
        self.state = state;
    }

    /// Completes the request and wakes the waiting caller, if any.
    pub(crate) fn finish(&mut self, body: Vec<u8>, cause: Option<TransportError>) {
        let ok = cause.is_none() && body.first() == Some(&(Status::Ok as u8));
        self.set_state(if ok {
            RequestState::FinishedOk
        } else {
            RequestState::FinishedError
        });
        if let Some(completion) = self.completion.take() {
            // The caller may have stopped waiting; nothing to do then.
            let _ = completion.send(RequestOutcome { body, cause });
        }
    }
}

/// Reply handle for a result-bearing request.
#[derive(Debug)]
pub struct PendingReply {
    opcode: Opcode,
    rx: oneshot::Receiver<RequestOutcome>,
}

impl PendingReply {
    /// Waits for the reply and checks its status byte.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Unreachable`] if the server could not be reached.
    /// - [`ClientError::Communication`] if the server answered `SERVER_ERROR`.
    /// - [`ClientError::WorkerStopped`] if the worker exited first.
    pub async fn wait(self) -> Result<WireDecoder, ClientError> {
        let outcome = self.rx.await.map_err(|_| ClientError::WorkerStopped)?;
        if let Some(source) = outcome.cause {
            return Err(ClientError::Unreachable {
                opcode: self.opcode,
                source,
            });
        }
        let mut decoder = WireDecoder::new(outcome.body);
        match Status::try_from(decoder.read_byte()?) {
            Ok(Status::Ok) => Ok(decoder),
            _ => Err(ClientError::Communication(self.opcode)),
        }
    }
}

/// Cloneable producer side of the request FIFO.
#[derive(Debug, Clone)]
pub struct RequestQueue {
    tx: mpsc::UnboundedSender<Request>,
}

impl RequestQueue {
    /// Creates a queue and the receiver the dispatch worker drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Request>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueues a fire-and-forget request.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidRequest`] if the opcode expects a result.
    pub fn submit(&self, body: Vec<u8>) -> Result<(), ClientError> {
        let request = Request::new(body, None)?;
        if request.opcode.expects_result() {
            return Err(ClientError::InvalidRequest(format!(
                "{:?} returns a result and cannot be sent fire-and-forget",
                request.opcode
            )));
        }
        self.enqueue(request)
    }

    /// Enqueues a result-bearing request.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidRequest`] if the opcode does not expect a result.
    pub fn submit_for_reply(&self, body: Vec<u8>) -> Result<PendingReply, ClientError> {
        let (tx, rx) = oneshot::channel();
        let request = Request::new(body, Some(tx))?;
        if !request.opcode.expects_result() {
            return Err(ClientError::InvalidRequest(format!(
                "{:?} has no result; use submit",
                request.opcode
            )));
        }
        let opcode = request.opcode;
        self.enqueue(request)?;
        Ok(PendingReply { opcode, rx })
    }

    /// `true` once the dispatch worker has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn enqueue(&self, mut request: Request) -> Result<(), ClientError> {
        request.set_state(RequestState::Enqueued);
        self.tx.send(request).map_err(|_| ClientError::WorkerStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_rejects_result_bearing_opcode() {
        let (queue, _rx) = RequestQueue::channel();
        let err = queue.submit(vec![Opcode::GetWidth as u8, 0, 0, 0, 1]).unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }

    #[test]
    fn test_submit_for_reply_rejects_fire_and_forget_opcode() {
        let (queue, _rx) = RequestQueue::channel();
        let err = queue.submit_for_reply(vec![Opcode::Flush as u8]).unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }

    #[test]
    fn test_empty_and_unknown_bodies_are_rejected() {
        let (queue, _rx) = RequestQueue::channel();
        assert!(matches!(queue.submit(Vec::new()), Err(ClientError::InvalidRequest(_))));
        assert!(matches!(queue.submit(vec![0x3F]), Err(ClientError::InvalidRequest(_))));
    }

    #[test]
    fn test_enqueued_requests_keep_fifo_order() {
        // Arrange
        let (queue, mut rx) = RequestQueue::channel();

        // Act
        queue.submit(vec![Opcode::Hold as u8]).unwrap();
        let _reply = queue.submit_for_reply(vec![Opcode::GetWidth as u8]).unwrap();
        queue.submit(vec![Opcode::Flush as u8]).unwrap();

        // Assert
        let order: Vec<Opcode> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|r| {
                assert_eq!(r.state(), RequestState::Enqueued);
                r.opcode()
            })
            .collect();
        assert_eq!(order, vec![Opcode::Hold, Opcode::GetWidth, Opcode::Flush]);
    }

    #[test]
    fn test_submit_after_worker_stopped_fails() {
        let (queue, rx) = RequestQueue::channel();
        drop(rx);
        assert!(matches!(
            queue.submit(vec![Opcode::Hold as u8]),
            Err(ClientError::WorkerStopped)
        ));
    }

    #[tokio::test]
    async fn test_wait_returns_payload_after_ok_status() {
        // Arrange
        let (queue, mut rx) = RequestQueue::channel();
        let reply = queue.submit_for_reply(vec![Opcode::GetNativeWidth as u8]).unwrap();
        let mut request = rx.recv().await.unwrap();

        // Act
        request.finish(vec![Status::Ok as u8, 0, 0, 1, 0], None);
        let mut decoder = reply.wait().await.unwrap();

        // Assert
        assert_eq!(request.state(), RequestState::FinishedOk);
        assert_eq!(decoder.read_int().unwrap(), 256);
    }

    #[test]
    fn test_wait_stays_pending_until_worker_finishes_request() {
        use tokio_test::{assert_pending, assert_ready, task};

        // Arrange
        let (queue, mut rx) = RequestQueue::channel();
        let reply = queue.submit_for_reply(vec![Opcode::GetNativeHeight as u8]).unwrap();
        let mut request = rx.try_recv().unwrap();
        let mut wait = task::spawn(reply.wait());

        // Act / Assert
        assert_pending!(wait.poll());
        request.finish(vec![Status::Ok as u8, 0, 0, 0, 9], None);
        assert!(wait.is_woken());
        let mut decoder = assert_ready!(wait.poll()).unwrap();
        assert_eq!(decoder.read_int().unwrap(), 9);
    }

    #[tokio::test]
    async fn test_wait_maps_server_error_status() {
        let (queue, mut rx) = RequestQueue::channel();
        let reply = queue.submit_for_reply(vec![Opcode::GetWidth as u8]).unwrap();
        let mut request = rx.recv().await.unwrap();

        request.finish(vec![Status::ServerError as u8], None);

        assert_eq!(request.state(), RequestState::FinishedError);
        assert!(matches!(
            reply.wait().await,
            Err(ClientError::Communication(Opcode::GetWidth))
        ));
    }

    #[tokio::test]
    async fn test_wait_surfaces_transport_cause() {
        let (queue, mut rx) = RequestQueue::channel();
        let reply = queue.submit_for_reply(vec![Opcode::GetHeight as u8]).unwrap();
        let mut request = rx.recv().await.unwrap();

        request.finish(vec![Status::ServerError as u8], Some(TransportError::Status(503)));

        let err = reply.wait().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Unreachable {
                opcode: Opcode::GetHeight,
                source: TransportError::Status(503)
            }
        ));
    }

    #[tokio::test]
    async fn test_wait_after_request_dropped_reports_worker_stopped() {
        let (queue, mut rx) = RequestQueue::channel();
        let reply = queue.submit_for_reply(vec![Opcode::GetHeight as u8]).unwrap();
        drop(rx.recv().await.unwrap());
        assert!(matches!(reply.wait().await, Err(ClientError::WorkerStopped)));
    }
}
