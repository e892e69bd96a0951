use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::warn;

/// How a reversed range such as `1024-1` is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangePolicy {
    /// Swap the endpoints and keep the range.
    #[default]
    Tolerant,
    /// Reject the token (logged and omitted).
    Strict,
}

/// Parse a port specification into a strictly ascending list of TCP ports (1..=65535).
///
/// Supported tokens, separated by commas or newlines:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
/// - comments: everything after `#` on a line is ignored
///
/// Malformed or out-of-range tokens are logged and skipped. Only a specification
/// that yields no valid port at all is an error.
pub fn parse_port_spec(spec: &str, policy: RangePolicy) -> Result<Vec<u16>> {
    let mut ports = BTreeSet::new();

    for raw_line in spec.lines() {
        let line = raw_line.split('#').next().unwrap_or("");
        for token in line.split(',').map(str::trim) {
            if token.is_empty() {
                continue;
            }
            match parse_token(token, policy) {
                Ok((start, end)) => ports.extend(start..=end),
                Err(e) => warn!("ignoring port token {token:?}: {e}"),
            }
        }
    }

    if ports.is_empty() {
        bail!("port specification {:?} contains no valid ports", spec.trim());
    }
    Ok(ports.into_iter().collect())
}

/// Load a port specification from a file path. Errors if the file cannot be read
/// or contains no valid ports.
pub fn load_ports_from_path(path: impl AsRef<Path>, policy: RangePolicy) -> Result<Vec<u16>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    parse_port_spec(&content, policy)
        .with_context(|| format!("invalid ports file: {}", path.as_ref().display()))
}

fn parse_token(token: &str, policy: RangePolicy) -> Result<(u16, u16)> {
    let Some((a, b)) = token.split_once('-') else {
        let p = parse_port_str(token)?;
        return Ok((p, p));
    };

    let start = parse_port_str(a.trim()).context("invalid range start")?;
    let end = parse_port_str(b.trim()).context("invalid range end")?;
    if start <= end {
        return Ok((start, end));
    }
    match policy {
        RangePolicy::Tolerant => Ok((end, start)),
        RangePolicy::Strict => bail!("reversed range {start}-{end}"),
    }
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s
        .parse::<u32>()
        .map_err(|e| anyhow::anyhow!("{s:?} is not a number ({e})"))?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}
