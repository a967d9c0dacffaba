//! Concurrent TCP reachability prober.
//!
//! [`scan_fleet`] probes every configured port on every target with bounded
//! concurrency and returns a [`ScanReport`] of the ports that accepted a
//! connection within the deadline.
pub mod config;
pub mod error;
pub mod fleet;
pub mod host;
pub mod logging;
pub mod netdetect;
pub mod ports;
pub mod probe;
pub mod progress;
pub mod server;
pub mod targets;
pub mod types;

pub use config::{EmptyHostPolicy, PortSpec, ScanConfig, ScanScope};
pub use error::{ConfigError, ScanError};
pub use fleet::{scan_fleet, FleetScanner};
pub use host::{scan_host, HostScanner};
pub use probe::{probe, Connector, TcpConnector};
pub use progress::{ProgressSnapshot, ScanProgress};
pub use types::{HostResult, ProbeOutcome, Protocol, ScanReport};
