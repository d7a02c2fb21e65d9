//! Client side of the drawing-context cache.
//!
//! # How contexts are released (for beginners)
//!
//! The server keeps one reference count per distinct style.  The client
//! takes a reference the first time a [`DrawingContext`] is used on a device
//! (CREATE_DRAWING_CONTEXT) and must give it back exactly once.  Two things
//! can give it back:
//!
//! 1. **Every context holding the id is dropped.**  The shared ticket's
//!    `Drop` pushes the id onto the [`ReleaseQueue`]; a drainer task later
//!    sends one RELEASE_DRAWING_CONTEXT per id.
//! 2. **The device is closed.**  CLOSE carries the ids of every context the
//!    device registered, and the server releases them in one batch.
//!
//! Each registration is a [`ContextTicket`] holding the id, owned by the
//! contexts drawn with it and watched weakly by the device.  Whichever path
//! runs first swaps the id out of the ticket; the other path then finds the
//! sentinel and does nothing, so an id is never released twice.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use griddev_core::{DrawingContextValue, Opcode, WireEncoder};
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::request_queue::RequestQueue;

/// Ticket value once its id has been consumed.
const RELEASED: i32 = -1;

// ── Release queue ─────────────────────────────────────────────────────────────

/// Context ids waiting for a RELEASE_DRAWING_CONTEXT request.
#[derive(Debug, Default)]
pub struct ReleaseQueue {
    ids: Mutex<VecDeque<i32>>,
    notify: Notify,
}

impl ReleaseQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, ctx_id: i32) {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(ctx_id);
        self.notify.notify_one();
    }

    /// Number of ids not yet sent.
    pub fn pending(&self) -> usize {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Sends one fire-and-forget RELEASE per queued id and returns how many
    /// were sent.  Stops early if the dispatch worker has gone away.
    pub fn drain_into(&self, queue: &RequestQueue) -> usize {
        let ids: Vec<i32> = self
            .ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let mut encoder = WireEncoder::with_capacity(8);
        let mut sent = 0;
        for ctx_id in ids {
            encoder.write_byte(Opcode::ReleaseDrawingContext as u8);
            encoder.write_int(ctx_id);
            if let Err(e) = queue.submit(encoder.reset_write()) {
                warn!(ctx_id, error = %e, "could not queue context release");
                break;
            }
            debug!(ctx_id, "context release queued");
            sent += 1;
        }
        sent
    }

    /// Drains the queue every time an id is pushed.  Runs until the dispatch
    /// worker stops accepting requests.
    pub async fn run_drainer(self: Arc<Self>, queue: RequestQueue) {
        loop {
            self.notify.notified().await;
            self.drain_into(&queue);
            if queue.is_closed() {
                debug!("release drainer stopped");
                return;
            }
        }
    }
}

// ── Tickets and contexts ──────────────────────────────────────────────────────

/// One server-side reference to a context on one device.
///
/// Shared by every `DrawingContext` that has been drawn with on that device
/// under this id.  When the last of them is dropped the id goes to the
/// [`ReleaseQueue`], unless a device close consumed it first.
#[derive(Debug)]
pub struct ContextTicket {
    id: AtomicI32,
    releases: Arc<ReleaseQueue>,
}

impl ContextTicket {
    fn new(ctx_id: i32, releases: Arc<ReleaseQueue>) -> Arc<Self> {
        Arc::new(Self {
            id: AtomicI32::new(ctx_id),
            releases,
        })
    }

    /// Current id, or `None` once consumed.
    pub fn id(&self) -> Option<i32> {
        Some(self.id.load(Ordering::Acquire)).filter(|id| *id > 0)
    }

    /// Consumes the id.  Returns it to exactly one caller.
    pub fn take(&self) -> Option<i32> {
        Some(self.id.swap(RELEASED, Ordering::AcqRel)).filter(|id| *id > 0)
    }
}

impl Drop for ContextTicket {
    fn drop(&mut self) {
        if let Some(ctx_id) = self.take() {
            self.releases.push(ctx_id);
        }
    }
}

struct ContextCell {
    value: DrawingContextValue,
    tickets: Mutex<Vec<Arc<ContextTicket>>>,
}

impl ContextCell {
    /// Keeps `ticket` alive for as long as this context is.
    fn hold(&self, ticket: &Arc<ContextTicket>) {
        let mut tickets = self.tickets.lock().unwrap_or_else(PoisonError::into_inner);
        tickets.retain(|t| t.id().is_some());
        if !tickets.iter().any(|t| Arc::ptr_eq(t, ticket)) {
            tickets.push(Arc::clone(ticket));
        }
    }
}

/// A shareable, immutable drawing style.
///
/// Cloning is cheap and every clone is the same context: it is registered
/// with the server once per device, and released when the last clone is
/// dropped or the device is closed.
#[derive(Clone)]
pub struct DrawingContext {
    cell: Arc<ContextCell>,
}

impl DrawingContext {
    pub fn new(value: DrawingContextValue) -> Self {
        Self {
            cell: Arc::new(ContextCell {
                value,
                tickets: Mutex::default(),
            }),
        }
    }

    pub fn value(&self) -> &DrawingContextValue {
        &self.cell.value
    }
}

impl From<DrawingContextValue> for DrawingContext {
    fn from(value: DrawingContextValue) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for DrawingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DrawingContext").field(&self.cell.value).finish()
    }
}

// ── Per-device registrations ──────────────────────────────────────────────────

/// Map from the context values used on one device to their server ids.
///
/// Keyed by value: a second handle with an equal style reuses the id
/// already registered and from then on keeps it alive too.  The map only
/// holds weak references, so it never delays a release.
#[derive(Default)]
pub struct ContextRegistrations {
    entries: HashMap<DrawingContextValue, Weak<ContextTicket>>,
}

impl ContextRegistrations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id registered on this device for a context equal to `ctx`.
    ///
    /// On a hit `ctx` becomes a holder of the id, so the id stays live until
    /// `ctx` is dropped as well.
    pub fn lookup(&self, ctx: &DrawingContext) -> Option<i32> {
        let ticket = self.entries.get(ctx.value())?.upgrade()?;
        let ctx_id = ticket.id()?;
        ctx.cell.hold(&ticket);
        Some(ctx_id)
    }

    /// Records that `ctx` is known to the server as `ctx_id`.
    pub fn register(&mut self, ctx: &DrawingContext, ctx_id: i32, releases: Arc<ReleaseQueue>) {
        self.entries.retain(|_, ticket| ticket.strong_count() > 0);

        let ticket = ContextTicket::new(ctx_id, releases);
        ctx.cell.hold(&ticket);
        self.entries.insert(ctx.value().clone(), Arc::downgrade(&ticket));
    }

    /// Number of registrations whose id is still owned by this device.
    pub fn live(&self) -> usize {
        self.entries
            .values()
            .filter_map(Weak::upgrade)
            .filter(|ticket| ticket.id().is_some())
            .count()
    }

    /// Consumes every id still owned by this device, for the CLOSE batch.
    pub fn take_all_for_close(&mut self) -> Vec<i32> {
        self.entries
            .drain()
            .filter_map(|(_, ticket)| ticket.upgrade())
            .filter_map(|ticket| ticket.take())
            .collect()
    }
}

impl fmt::Debug for ContextRegistrations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextRegistrations")
            .field("live", &self.live())
            .finish()
    }
}
