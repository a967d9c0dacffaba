use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Transport used for probing. TCP connect is the only supported one.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            _ => Err(ConfigError::UnsupportedProtocol(s.trim().to_string())),
        }
    }
}

/// Outcome of a single probe. Lives only until the host collector folds it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub port: u16,
    pub is_open: bool,
}

impl ProbeOutcome {
    pub fn open(port: u16) -> Self {
        Self { port, is_open: true }
    }

    pub fn closed(port: u16) -> Self {
        Self { port, is_open: false }
    }
}

/// Open ports found on one target.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostResult {
    pub target: String,
    #[serde(rename = "proto")]
    pub protocol: Protocol,
    /// Sorted ascending, no duplicates.
    #[serde(rename = "ports")]
    pub open_ports: Vec<u16>,
}

impl HostResult {
    pub fn new(target: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            target: target.into(),
            protocol,
            open_ports: Vec::new(),
        }
    }

    pub fn has_open_ports(&self) -> bool {
        !self.open_ports.is_empty()
    }
}

/// The aggregate result of one fleet scan. Read-only once built.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    results: Vec<HostResult>,
}

impl ScanReport {
    pub(crate) fn new(results: Vec<HostResult>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[HostResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<HostResult> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Result for `target`, if it made it into the report.
    pub fn get(&self, target: &str) -> Option<&HostResult> {
        self.results.iter().find(|r| r.target == target)
    }

    pub fn open_port_count(&self) -> usize {
        self.results.iter().map(|r| r.open_ports.len()).sum()
    }
}
