use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::ConfigError;
use crate::types::Protocol;

/// Default per-connection deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Which ports to probe on every host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PortSpec {
    /// Inclusive range.
    Range { low: u16, high: u16 },
    /// Explicit ports; duplicates are probed once.
    Set(Vec<u16>),
}

impl PortSpec {
    /// Validated, ascending, duplicate-free list of ports.
    pub fn resolve(&self) -> Result<Vec<u16>, ConfigError> {
        match self {
            PortSpec::Range { low, high } => {
                if *low == 0 {
                    return Err(ConfigError::PortOutOfRange(0));
                }
                if low > high {
                    return Err(ConfigError::InvertedRange {
                        low: *low,
                        high: *high,
                    });
                }
                Ok((*low..=*high).collect())
            }
            PortSpec::Set(ports) => {
                if ports.is_empty() {
                    return Err(ConfigError::EmptyPorts);
                }
                if ports.contains(&0) {
                    return Err(ConfigError::PortOutOfRange(0));
                }
                let mut out = ports.clone();
                out.sort_unstable();
                out.dedup();
                Ok(out)
            }
        }
    }
}

impl Default for PortSpec {
    fn default() -> Self {
        ScanScope::Quick.ports()
    }
}

/// Named port ranges: quick covers the well-known ports, wide runs up to the dynamic range.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScanScope {
    #[default]
    Quick,
    Wide,
}

impl ScanScope {
    pub fn ports(self) -> PortSpec {
        match self {
            ScanScope::Quick => PortSpec::Range { low: 1, high: 1024 },
            ScanScope::Wide => PortSpec::Range { low: 1, high: 49152 },
        }
    }
}

/// What to do with hosts that answered on no port.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyHostPolicy {
    /// Leave them out of the report; only hosts with something open show up.
    #[default]
    Drop,
    /// Report them with an empty port list.
    Keep,
}

/// Settings for one fleet scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub ports: PortSpec,
    #[serde(rename = "timeout_ms", with = "duration_ms", default = "default_timeout")]
    pub timeout: Duration,
    /// `None` means every host is scanned at once.
    #[serde(default)]
    pub max_concurrent_hosts: Option<usize>,
    /// `None` means every port of a host is probed at once.
    #[serde(default)]
    pub max_concurrent_ports_per_host: Option<usize>,
    #[serde(default)]
    pub empty_hosts: EmptyHostPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Tcp,
            ports: PortSpec::default(),
            timeout: DEFAULT_TIMEOUT,
            max_concurrent_hosts: None,
            max_concurrent_ports_per_host: None,
            empty_hosts: EmptyHostPolicy::Drop,
        }
    }
}

impl ScanConfig {
    pub fn new(ports: PortSpec) -> Self {
        Self {
            ports,
            ..Default::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_concurrent_hosts(mut self, limit: usize) -> Self {
        self.max_concurrent_hosts = Some(limit);
        self
    }

    pub fn max_concurrent_ports_per_host(mut self, limit: usize) -> Self {
        self.max_concurrent_ports_per_host = Some(limit);
        self
    }

    pub fn empty_hosts(mut self, policy: EmptyHostPolicy) -> Self {
        self.empty_hosts = policy;
        self
    }

    /// Check everything that can be checked without touching the network.
    /// Returns the resolved port list on success.
    pub fn validate(&self) -> Result<Vec<u16>, ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        check_limit("max_concurrent_hosts", self.max_concurrent_hosts)?;
        check_limit(
            "max_concurrent_ports_per_host",
            self.max_concurrent_ports_per_host,
        )?;
        self.ports.resolve()
    }
}

/// A concurrency cap must fit in a tokio semaphore.
fn check_limit(name: &'static str, limit: Option<usize>) -> Result<(), ConfigError> {
    match limit {
        Some(0) => Err(ConfigError::ZeroConcurrency(name)),
        Some(n) if n > Semaphore::MAX_PERMITS => Err(ConfigError::ConcurrencyTooLarge {
            name,
            max: Semaphore::MAX_PERMITS,
        }),
        _ => Ok(()),
    }
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
