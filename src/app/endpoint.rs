use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Serial,
    Network,
}

/// Identifier of a device reachable through the bridge: either a USB serial or `IPv4:port`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct DeviceEndpoint(String);

impl DeviceEndpoint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn network(address: &str, port: u16) -> Self {
        Self(format!("{address}:{port}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> EndpointKind {
        classify(&self.0)
    }

}

impl fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceEndpoint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

fn network_shape() -> &'static Regex {
    static SHAPE: OnceLock<Regex> = OnceLock::new();
    SHAPE.get_or_init(|| {
        Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3}):(\d+)$")
            .unwrap_or_else(|err| panic!("invalid endpoint pattern: {err}"))
    })
}

fn bare_ipv4_shape() -> &'static Regex {
    static SHAPE: OnceLock<Regex> = OnceLock::new();
    SHAPE.get_or_init(|| {
        Regex::new(r"^(\d{1,3})\.(\d{1,3})\.(\d{1,3})\.(\d{1,3})$")
            .unwrap_or_else(|err| panic!("invalid address pattern: {err}"))
    })
}

fn octets_in_range(caps: &regex::Captures<'_>) -> bool {
    (1..=4).all(|index| {
        caps.get(index)
            .and_then(|octet| octet.as_str().parse::<u16>().ok())
            .is_some_and(|value| value <= 255)
    })
}

/// Structural check only: `a.b.c.d:port` with every octet in 0..=255 and a positive port.
/// The port is not range-checked against TCP limits.
pub fn is_network_endpoint(value: &str) -> bool {
    let Some(caps) = network_shape().captures(value) else {
        return false;
    };
    let port_positive = caps
        .get(5)
        .is_some_and(|port| port.as_str().bytes().any(|digit| digit != b'0'));
    port_positive && octets_in_range(&caps)
}

pub fn is_ipv4_address(value: &str) -> bool {
    bare_ipv4_shape()
        .captures(value)
        .is_some_and(|caps| octets_in_range(&caps))
}

pub fn classify(value: &str) -> EndpointKind {
    if is_network_endpoint(value) {
        EndpointKind::Network
    } else {
        EndpointKind::Serial
    }
}

/// Normalises user input for add-by-address. A bare IPv4 address gets `default_port`.
pub fn parse_manual_address(input: &str, default_port: u16) -> Option<DeviceEndpoint> {
    let trimmed = input.trim();
    if is_network_endpoint(trimmed) {
        return Some(DeviceEndpoint::new(trimmed));
    }
    if is_ipv4_address(trimmed) {
        return Some(DeviceEndpoint::network(trimmed, default_port));
    }
    None
}
