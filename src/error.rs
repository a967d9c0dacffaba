use std::path::PathBuf;

use thiserror::Error;

/// Problems with the scan request itself. Always reported before any probe is sent.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no targets given")]
    NoTargets,

    #[error("invalid target: {0:?}")]
    InvalidTarget(String),

    #[error("unsupported protocol: {0} (only tcp is supported)")]
    UnsupportedProtocol(String),

    #[error("port set is empty")]
    EmptyPorts,

    #[error("port out of range: {0}")]
    PortOutOfRange(u32),

    #[error("invalid port range {low}-{high} (low > high)")]
    InvertedRange { low: u16, high: u16 },

    #[error("invalid port spec {spec:?}: {reason}")]
    InvalidPortSpec { spec: String, reason: String },

    #[error("connect timeout must be greater than zero")]
    ZeroTimeout,

    #[error("{0} must be at least 1 when set")]
    ZeroConcurrency(&'static str),

    #[error("{name} must be at most {max}")]
    ConcurrencyTooLarge { name: &'static str, max: usize },

    #[error("targets expand to more than {limit} hosts")]
    TooManyTargets { limit: usize },

    #[error("failed to read {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors a scan can end with. Connection failures are never errors; they are closed ports.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("scan cancelled")]
    Cancelled,
}
