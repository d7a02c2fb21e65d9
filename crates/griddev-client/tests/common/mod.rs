//! Shared test doubles for the client integration tests.
//!
//! [`Loopback`] plays both the transport and the supervisor: requests go
//! straight into an in-process [`CommandRouter`], "killing" the server drops
//! the router, and a probe builds a fresh one the way a restarted server
//! process would start with empty registries.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use griddev_client::{ServerSupervisor, Session, Transport, TransportError};
use griddev_core::Opcode;
use griddev_server::infrastructure::devices::recording::RecordingDeviceFactory;
use griddev_server::{CommandRouter, Disposition};

pub struct Loopback {
    factory: Arc<RecordingDeviceFactory>,
    router: Mutex<Option<Arc<CommandRouter>>>,
    restartable: AtomicBool,
    launches: AtomicUsize,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl Loopback {
    pub fn new() -> Arc<Self> {
        Self::with_factory(RecordingDeviceFactory::new())
    }

    pub fn with_factory(factory: RecordingDeviceFactory) -> Arc<Self> {
        let factory = Arc::new(factory);
        let router = CommandRouter::new(Arc::clone(&factory) as _);
        Arc::new(Self {
            factory,
            router: Mutex::new(Some(Arc::new(router))),
            restartable: AtomicBool::new(true),
            launches: AtomicUsize::new(0),
            sent: Mutex::default(),
        })
    }

    pub fn session(self: &Arc<Self>) -> Session {
        Session::with_parts(Arc::clone(self) as _, Arc::clone(self) as _)
    }

    /// The running router.  Panics if the server is down.
    pub fn router(&self) -> Arc<CommandRouter> {
        self.router
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .expect("loopback server is not running")
    }

    pub fn factory(&self) -> &RecordingDeviceFactory {
        &self.factory
    }

    pub fn is_running(&self) -> bool {
        self.router
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn kill(&self) {
        *self.router.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn refuse_restarts(&self) {
        self.restartable.store(false, Ordering::SeqCst);
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Opcodes of every body that reached a running router, in wire order.
    pub fn sent_opcodes(&self) -> Vec<Opcode> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|body| Opcode::try_from(body[0]).unwrap())
            .collect()
    }

    pub fn count_sent(&self, opcode: Opcode) -> usize {
        self.sent_opcodes().into_iter().filter(|o| *o == opcode).count()
    }
}

#[async_trait]
impl Transport for Loopback {
    async fn post(&self, body: &[u8]) -> Result<Vec<u8>, TransportError> {
        let router = self
            .router
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| TransportError::Request("connection refused".into()))?;

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(body.to_vec());
        let response = router.handle(body.to_vec());
        if response.disposition != Disposition::Continue {
            self.kill();
        }
        Ok(response.body)
    }
}

#[async_trait]
impl ServerSupervisor for Loopback {
    async fn probe(&self) -> bool {
        let mut router = self.router.lock().unwrap_or_else(PoisonError::into_inner);
        if router.is_some() {
            return true;
        }
        if !self.restartable.load(Ordering::SeqCst) {
            return false;
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        *router = Some(Arc::new(CommandRouter::new(Arc::clone(&self.factory) as _)));
        true
    }

    async fn destroy(&self) {
        self.kill();
    }
}
