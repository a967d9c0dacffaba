use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Live counters for a running scan. Cheap to clone; all clones share the same counters.
#[derive(Clone, Debug, Default)]
pub struct ScanProgress {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    probes_total: AtomicU64,
    probes_done: AtomicU64,
    open_found: AtomicU64,
    hosts_total: AtomicU64,
    hosts_done: AtomicU64,
}

/// Point-in-time copy of [`ScanProgress`].
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub probes_total: u64,
    pub probes_done: u64,
    pub open_found: u64,
    pub hosts_total: u64,
    pub hosts_done: u64,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin(&self, hosts: u64, ports_per_host: u64) {
        self.inner.hosts_total.store(hosts, Ordering::Relaxed);
        self.inner
            .probes_total
            .store(hosts * ports_per_host, Ordering::Relaxed);
    }

    pub(crate) fn record_probe(&self, is_open: bool) {
        self.inner.probes_done.fetch_add(1, Ordering::Relaxed);
        if is_open {
            self.inner.open_found.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_host(&self) {
        self.inner.hosts_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let c = &self.inner;
        ProgressSnapshot {
            probes_total: c.probes_total.load(Ordering::Relaxed),
            probes_done: c.probes_done.load(Ordering::Relaxed),
            open_found: c.open_found.load(Ordering::Relaxed),
            hosts_total: c.hosts_total.load(Ordering::Relaxed),
            hosts_done: c.hosts_done.load(Ordering::Relaxed),
        }
    }
}
