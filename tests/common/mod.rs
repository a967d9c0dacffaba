#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleetprobe::Connector;

/// Deterministic in-memory network: a port is open iff it is listed for the host.
#[derive(Default)]
pub struct FakeNet {
    open: HashMap<String, HashSet<u16>>,
    host_delay: HashMap<String, Duration>,
    delay: Duration,
    attempts: Mutex<HashMap<(String, u16), u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    active_hosts: Mutex<HashMap<String, usize>>,
    max_active_hosts: AtomicUsize,
}

impl FakeNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(mut self, host: &str, ports: impl IntoIterator<Item = u16>) -> Self {
        self.open.entry(host.to_string()).or_default().extend(ports);
        self
    }

    /// Every connection attempt takes `delay` before it resolves.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Attempts against `host` take `delay` instead of the global delay.
    pub fn host_delay(mut self, host: &str, delay: Duration) -> Self {
        self.host_delay.insert(host.to_string(), delay);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn attempts(&self, host: &str, port: u16) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(&(host.to_string(), port))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }

    pub fn max_attempts_per_port(&self) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .values()
            .copied()
            .max()
            .unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn max_active_hosts(&self) -> usize {
        self.max_active_hosts.load(Ordering::SeqCst)
    }
}

struct InFlight<'a> {
    net: &'a FakeNet,
    host: String,
}

impl<'a> InFlight<'a> {
    fn enter(net: &'a FakeNet, host: &str) -> Self {
        let now = net.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        net.max_in_flight.fetch_max(now, Ordering::SeqCst);
        {
            let mut hosts = net.active_hosts.lock().unwrap();
            *hosts.entry(host.to_string()).or_default() += 1;
            net.max_active_hosts.fetch_max(hosts.len(), Ordering::SeqCst);
        }
        Self {
            net,
            host: host.to_string(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.net.in_flight.fetch_sub(1, Ordering::SeqCst);
        let mut hosts = self.net.active_hosts.lock().unwrap();
        if let Some(n) = hosts.get_mut(&self.host) {
            *n -= 1;
            if *n == 0 {
                hosts.remove(&self.host);
            }
        }
    }
}

#[async_trait]
impl Connector for FakeNet {
    async fn connect(&self, host: &str, port: u16) -> io::Result<()> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry((host.to_string(), port))
            .or_default() += 1;

        let _guard = InFlight::enter(self, host);
        let delay = self.host_delay.get(host).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.open.get(host).is_some_and(|ports| ports.contains(&port)) {
            Ok(())
        } else {
            Err(io::Error::from(io::ErrorKind::ConnectionRefused))
        }
    }
}

/// Accepts every connection, but only after `after` has elapsed.
pub struct SlowAccept {
    pub after: Duration,
}

#[async_trait]
impl Connector for SlowAccept {
    async fn connect(&self, _host: &str, _port: u16) -> io::Result<()> {
        tokio::time::sleep(self.after).await;
        Ok(())
    }
}
