//! Request and traffic counters shown on the status page.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free traffic counters updated on every command request.
#[derive(Debug, Default)]
pub struct ServerStats {
    requests: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl ServerStats {
    pub fn record_request(&self, body_len: usize) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(body_len as u64, Ordering::Relaxed);
    }

    pub fn record_response(&self, body_len: usize) {
        self.bytes_written.fetch_add(body_len as u64, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of the server, rendered by the `/status` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub devices_created: i32,
    pub devices_active: usize,
    pub contexts_created: i32,
    pub contexts_active: usize,
    pub requests: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Total devices created: {}, active: {}",
            self.devices_created, self.devices_active
        )?;
        writeln!(
            f,
            "Total DrawingContexts created: {}, active: {}",
            self.contexts_created, self.contexts_active
        )?;
        writeln!(f, "Total requests serviced: {}", self.requests)?;
        write!(
            f,
            "Total bytes read: {}, written: {}",
            self.bytes_read, self.bytes_written
        )
    }
}
