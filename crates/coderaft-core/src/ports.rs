//! Port specification parsing
//!
//! Parses `host:container[/proto]` entries from the project configuration's
//! `ports` list into create-parameters understood by the engine adapter.

use std::fmt;

/// A single host-to-container port binding request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    /// Host port to bind.
    pub host_port: u16,
    /// Container port to expose.
    pub container_port: u16,
    /// Protocol, lowercase (`tcp` or `udp`).
    pub protocol: String,
}

impl fmt::Display for PortBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}",
            self.host_port, self.container_port, self.protocol
        )
    }
}

/// Parse a single `host:container[/proto]` port specification.
///
/// Malformed entries are rejected by returning `None` rather than aborting
/// container creation — the caller is expected to drop them silently.
pub fn parse_port_spec(spec: &str) -> Option<PortBinding> {
    let (ports_part, protocol) = match spec.split_once('/') {
        Some((p, proto)) => (p, proto.to_lowercase()),
        None => (spec, "tcp".to_string()),
    };

    if protocol != "tcp" && protocol != "udp" {
        return None;
    }

    let (host_str, container_str) = ports_part.split_once(':')?;
    let host_port: u16 = host_str.trim().parse().ok()?;
    let container_port: u16 = container_str.trim().parse().ok()?;

    Some(PortBinding {
        host_port,
        container_port,
        protocol,
    })
}

/// Parse an ordered list of port specifications, dropping malformed entries.
pub fn parse_port_specs(specs: &[String]) -> Vec<PortBinding> {
    specs.iter().filter_map(|s| parse_port_spec(s)).collect()
}
