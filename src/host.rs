use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ScanError;
use crate::probe::{probe, Connector, TcpConnector};
use crate::progress::ScanProgress;
use crate::types::{HostResult, ProbeOutcome, Protocol};

/// Probes every port of one target and keeps the ones that answered.
///
/// - At most `port_concurrency` probes are in flight (unbounded when `None`).
/// - Returns only after every launched probe finished.
/// - Probe tasks hand their outcome back through the `JoinSet`; the collector
///   loop in [`HostScanner::scan`] is the only writer of `open_ports`.
#[derive(Clone)]
pub struct HostScanner {
    connector: Arc<dyn Connector>,
    protocol: Protocol,
    timeout: Duration,
    port_concurrency: Option<usize>,
    cancel: CancellationToken,
    progress: Option<ScanProgress>,
}

impl HostScanner {
    pub fn new(protocol: Protocol, timeout: Duration) -> Self {
        Self {
            connector: Arc::new(TcpConnector),
            protocol,
            timeout,
            port_concurrency: None,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_port_concurrency(mut self, limit: Option<usize>) -> Self {
        self.port_concurrency = limit.map(|n| n.clamp(1, Semaphore::MAX_PERMITS));
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ScanProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Scan `ports` on `target`. Duplicate ports are probed once.
    ///
    /// The only error is [`ScanError::Cancelled`]; unreachable targets simply
    /// produce an empty result.
    pub async fn scan(&self, target: &str, ports: &[u16]) -> Result<HostResult, ScanError> {
        let mut ports = ports.to_vec();
        ports.sort_unstable();
        ports.dedup();

        let host: Arc<str> = Arc::from(target);
        let limiter = self.port_concurrency.map(|n| Arc::new(Semaphore::new(n)));
        let mut set = JoinSet::new();

        for port in ports {
            if self.cancel.is_cancelled() {
                break;
            }
            let permit = match &limiter {
                Some(sem) => tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    permit = sem.clone().acquire_owned() => match permit {
                        Ok(p) => Some(p),
                        // The semaphore belongs to this call and is never closed.
                        Err(_) => break,
                    },
                },
                None => None,
            };

            let connector = self.connector.clone();
            let host = host.clone();
            let cancel = self.cancel.clone();
            let progress = self.progress.clone();
            let (protocol, timeout) = (self.protocol, self.timeout);

            set.spawn(async move {
                let _permit = permit;
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return None,
                    outcome = probe(connector.as_ref(), protocol, &host, port, timeout) => outcome,
                };
                if let Some(p) = &progress {
                    p.record_probe(outcome.is_open);
                }
                Some(outcome)
            });
        }

        let mut result = HostResult::new(target, self.protocol);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(ProbeOutcome { port, is_open: true })) => result.open_ports.push(port),
                Ok(_) => {}
                Err(e) => warn!(host = target, error = %e, "probe task failed"),
            }
        }

        if self.cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        result.open_ports.sort_unstable();
        debug!(host = target, open = result.open_ports.len(), "host scan finished");
        Ok(result)
    }
}

/// Scan one host over TCP connect with no cancellation.
pub async fn scan_host(
    target: &str,
    protocol: Protocol,
    ports: &[u16],
    timeout: Duration,
    port_concurrency: Option<usize>,
) -> HostResult {
    let scanner = HostScanner::new(protocol, timeout).with_port_concurrency(port_concurrency);
    match scanner.scan(target, ports).await {
        Ok(result) => result,
        // Nothing can cancel a token that never left this function.
        Err(_) => HostResult::new(target, protocol),
    }
}
