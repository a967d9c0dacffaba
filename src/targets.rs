use std::collections::HashSet;
use std::fs;
use std::path::Path;

use ipnet::IpNet;

use crate::error::ConfigError;
use crate::netdetect;

/// Turn user-supplied target specs into a flat, deduplicated list of hosts.
///
/// Each spec may be an IPv4 CIDR (expanded to its host addresses), a path to
/// a targets file (one spec per line, `#` comments), or a host name / IP
/// literal that is passed through unchanged.
pub fn expand_targets<S: AsRef<str>>(specs: &[S]) -> Result<Vec<String>, ConfigError> {
    expand(specs, true, None)
}

/// Most hosts a network-supplied request may expand to: a /16 worth.
pub const MAX_INLINE_TARGETS: usize = 1 << 16;

/// Like [`expand_targets`] but never reads files and refuses to expand past
/// [`MAX_INLINE_TARGETS`]. Used for specs that arrive over the network.
pub fn expand_inline_targets<S: AsRef<str>>(specs: &[S]) -> Result<Vec<String>, ConfigError> {
    expand(specs, false, Some(MAX_INLINE_TARGETS))
}

fn expand<S: AsRef<str>>(
    specs: &[S],
    allow_files: bool,
    limit: Option<usize>,
) -> Result<Vec<String>, ConfigError> {
    let mut acc = Accumulator {
        out: Vec::new(),
        seen: HashSet::new(),
        limit,
    };
    for spec in specs {
        expand_one(spec.as_ref(), &mut acc, allow_files)?;
    }
    Ok(acc.out)
}

struct Accumulator {
    out: Vec<String>,
    seen: HashSet<String>,
    limit: Option<usize>,
}

impl Accumulator {
    /// Checked before a block is expanded so an oversized CIDR is never materialized.
    fn reserve(&self, additional: u64) -> Result<(), ConfigError> {
        match self.limit {
            Some(limit) if self.out.len() as u64 + additional > limit as u64 => {
                Err(ConfigError::TooManyTargets { limit })
            }
            _ => Ok(()),
        }
    }

    fn push(&mut self, target: String) -> Result<(), ConfigError> {
        if self.seen.contains(&target) {
            return Ok(());
        }
        self.reserve(1)?;
        self.seen.insert(target.clone());
        self.out.push(target);
        Ok(())
    }
}

fn expand_one(spec: &str, acc: &mut Accumulator, allow_file: bool) -> Result<(), ConfigError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Ok(());
    }

    if spec.contains('/') {
        if let Ok(net) = spec.parse::<IpNet>() {
            let IpNet::V4(v4) = net else {
                return Err(ConfigError::InvalidTarget(format!(
                    "{spec} (IPv6 blocks are not expanded)"
                )));
            };
            acc.reserve(block_hosts(v4.prefix_len()))?;
            for ip in netdetect::expand_cidr_to_ips(net) {
                acc.push(ip.to_string())?;
            }
            return Ok(());
        }
    }

    let path = Path::new(spec);
    if allow_file && path.is_file() {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::File {
            path: path.to_path_buf(),
            source,
        })?;
        for line in content.lines() {
            let line = line.split('#').next().map(str::trim).unwrap_or("");
            // Files may not include further files.
            expand_one(line, acc, false)?;
        }
        return Ok(());
    }

    if spec.chars().any(char::is_whitespace) || spec.contains('/') {
        return Err(ConfigError::InvalidTarget(spec.to_string()));
    }
    acc.push(spec.to_string())
}

/// Addresses a /`prefix` block expands to; /31 and /32 keep every address.
fn block_hosts(prefix: u8) -> u64 {
    let size = 1u64 << (32 - u32::from(prefix.min(32)));
    if prefix >= 31 {
        size
    } else {
        size - 2
    }
}
