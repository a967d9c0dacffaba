use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::config::PortSpec;
use crate::error::ConfigError;

/// Parse a command-line port spec.
///
/// Accepted forms: `80`, `22,80,443`, `1-1024`, `22,8000-8010`.
/// A single range stays a [`PortSpec::Range`]; anything else becomes a
/// deduplicated [`PortSpec::Set`] in order of first appearance.
pub fn parse_port_spec(spec: &str) -> Result<PortSpec, ConfigError> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyPorts);
    }

    if !trimmed.contains(',') {
        if let Some((low, high)) = parse_range(trimmed, spec)? {
            return Ok(PortSpec::Range { low, high });
        }
    }

    let mut ports = Vec::new();
    let mut seen = HashSet::new();
    for part in trimmed.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(invalid(spec, "empty list element"));
        }
        push_token(part, spec, &mut ports, &mut seen)?;
    }
    Ok(PortSpec::Set(ports))
}

/// Parse a ports file into a deduplicated list of TCP ports (1..=65535).
///
/// One port (`80`) or inclusive range (`8000-8010`) per line. Everything after
/// `#` is a comment; blank lines are skipped.
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>, ConfigError> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }
        push_token(line, line, &mut out, &mut seen).map_err(|e| match e {
            ConfigError::InvalidPortSpec { spec, reason } => ConfigError::InvalidPortSpec {
                spec,
                reason: format!("line {}: {reason}", idx + 1),
            },
            other => other,
        })?;
    }

    Ok(out)
}

/// Load a ports file. Fails if the file cannot be read, does not parse, or lists no ports.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<Vec<u16>, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::File {
        path: path.to_path_buf(),
        source,
    })?;
    let ports = parse_ports_str(&content)?;
    if ports.is_empty() {
        return Err(ConfigError::EmptyPorts);
    }
    Ok(ports)
}

fn push_token(
    token: &str,
    spec: &str,
    out: &mut Vec<u16>,
    seen: &mut HashSet<u16>,
) -> Result<(), ConfigError> {
    if let Some((low, high)) = parse_range(token, spec)? {
        for p in low..=high {
            if seen.insert(p) {
                out.push(p);
            }
        }
    } else {
        let p = parse_port(token, spec)?;
        if seen.insert(p) {
            out.push(p);
        }
    }
    Ok(())
}

/// `Ok(None)` when `token` is not a range at all.
fn parse_range(token: &str, spec: &str) -> Result<Option<(u16, u16)>, ConfigError> {
    let Some((a, b)) = token.split_once('-') else {
        return Ok(None);
    };
    let low = parse_port(a.trim(), spec)?;
    let high = parse_port(b.trim(), spec)?;
    if low > high {
        return Err(ConfigError::InvertedRange { low, high });
    }
    Ok(Some((low, high)))
}

fn parse_port(s: &str, spec: &str) -> Result<u16, ConfigError> {
    let val: u32 = s
        .parse()
        .map_err(|e| invalid(spec, format!("{s:?} is not a port number ({e})")))?;
    if val == 0 || val > u32::from(u16::MAX) {
        return Err(ConfigError::PortOutOfRange(val));
    }
    Ok(val as u16)
}

fn invalid(spec: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidPortSpec {
        spec: spec.to_string(),
        reason: reason.into(),
    }
}
