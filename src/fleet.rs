use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{EmptyHostPolicy, ScanConfig};
use crate::error::{ConfigError, ScanError};
use crate::host::HostScanner;
use crate::probe::{Connector, TcpConnector};
use crate::progress::ScanProgress;
use crate::types::{HostResult, ScanReport};

/// Runs one [`HostScanner`] per target and assembles the [`ScanReport`].
///
/// Every call owns its own task set and limiters, so one `FleetScanner` can
/// serve several scans at once. The report lists hosts in the order they were
/// given, not the order they finished in.
#[derive(Clone)]
pub struct FleetScanner {
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
    progress: Option<ScanProgress>,
}

impl Default for FleetScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetScanner {
    pub fn new() -> Self {
        Self {
            connector: Arc::new(TcpConnector),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Cancelling `cancel` stops launching probes, abandons in-flight ones and
    /// makes [`FleetScanner::scan`] return [`ScanError::Cancelled`].
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ScanProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn scan<S: AsRef<str>>(
        &self,
        targets: &[S],
        config: &ScanConfig,
    ) -> Result<ScanReport, ScanError> {
        let targets = validate_targets(targets)?;
        let ports: Arc<[u16]> = config.validate()?.into();

        if let Some(p) = &self.progress {
            p.begin(targets.len() as u64, ports.len() as u64);
        }
        info!(
            hosts = targets.len(),
            ports = ports.len(),
            timeout_ms = config.timeout.as_millis() as u64,
            "fleet scan starting"
        );
        let started = Instant::now();

        let mut host_scanner = HostScanner::new(config.protocol, config.timeout)
            .with_connector(self.connector.clone())
            .with_port_concurrency(config.max_concurrent_ports_per_host)
            .with_cancel(self.cancel.clone());
        if let Some(p) = &self.progress {
            host_scanner = host_scanner.with_progress(p.clone());
        }

        let limiter = config
            .max_concurrent_hosts
            .map(|n| Arc::new(Semaphore::new(n)));
        let mut set = JoinSet::new();

        for (idx, target) in targets.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            let permit = match &limiter {
                Some(sem) => tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    permit = sem.clone().acquire_owned() => match permit {
                        Ok(p) => Some(p),
                        Err(_) => break,
                    },
                },
                None => None,
            };

            let scanner = host_scanner.clone();
            let ports = ports.clone();
            let progress = self.progress.clone();
            set.spawn(async move {
                let _permit = permit;
                let res = scanner.scan(&target, &ports).await;
                if let Some(p) = &progress {
                    p.record_host();
                }
                (idx, res)
            });
        }

        let mut finished: Vec<(usize, HostResult)> = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, Ok(result))) => finished.push((idx, result)),
                Ok((_, Err(_))) => {}
                Err(e) => warn!(error = %e, "host scan task failed"),
            }
        }

        if self.cancel.is_cancelled() {
            info!(elapsed_ms = started.elapsed().as_millis() as u64, "fleet scan cancelled");
            return Err(ScanError::Cancelled);
        }

        finished.sort_unstable_by_key(|(idx, _)| *idx);
        let results: Vec<HostResult> = finished
            .into_iter()
            .map(|(_, result)| result)
            .filter(|r| match config.empty_hosts {
                EmptyHostPolicy::Drop => r.has_open_ports(),
                EmptyHostPolicy::Keep => true,
            })
            .collect();

        let report = ScanReport::new(results);
        info!(
            hosts_reported = report.len(),
            open_ports = report.open_port_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fleet scan finished"
        );
        Ok(report)
    }
}

/// Scan `targets` over TCP connect with the given configuration.
pub async fn scan_fleet<S: AsRef<str>>(
    targets: &[S],
    config: &ScanConfig,
) -> Result<ScanReport, ScanError> {
    FleetScanner::new().scan(targets, config).await
}

/// Trimmed targets, first occurrence wins so each host is scanned once.
fn validate_targets<S: AsRef<str>>(targets: &[S]) -> Result<Vec<String>, ConfigError> {
    if targets.is_empty() {
        return Err(ConfigError::NoTargets);
    }
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(targets.len());
    for t in targets {
        let t = t.as_ref().trim();
        if t.is_empty() || t.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidTarget(t.to_string()));
        }
        if seen.insert(t) {
            out.push(t.to_string());
        }
    }
    Ok(out)
}
