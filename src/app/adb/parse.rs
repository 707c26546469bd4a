use std::net::Ipv4Addr;
use std::sync::OnceLock;

use regex::Regex;

use crate::app::endpoint::is_ipv4_address;
use crate::app::models::{BridgeOutput, ConnectOutcome};

const READY_STATE: &str = "device";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLine {
    pub serial: String,
    pub state: String,
}

impl DeviceLine {
    pub fn is_ready(&self) -> bool {
        self.state == READY_STATE
    }
}

/// Parses `adb devices`. The header line is dropped, as is daemon chatter (`* daemon ...`).
/// Lines without a serial and a state column are ignored.
pub fn parse_adb_devices(output: &str) -> Vec<DeviceLine> {
    output
        .lines()
        .filter(|line| !line.trim_start().starts_with('*'))
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let serial = tokens.next()?;
            let state = tokens.next()?;
            Some(DeviceLine {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

fn inet_line() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| {
        Regex::new(r"\binet\s+(\d{1,3}(?:\.\d{1,3}){3})(?:/\d+)?")
            .unwrap_or_else(|err| panic!("invalid inet pattern: {err}"))
    })
}

fn is_usable_address(candidate: &str) -> bool {
    if !is_ipv4_address(candidate) {
        return false;
    }
    match candidate.parse::<Ipv4Addr>() {
        Ok(addr) => !addr.is_loopback() && !addr.is_link_local() && !addr.is_unspecified(),
        // Leading-zero octets pass the shape check but not std's parser; skip them.
        Err(_) => false,
    }
}

/// First non-loopback, non-link-local IPv4 address in `ip -f inet addr show` output.
pub fn parse_inet_address(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| inet_line().captures(line))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .find(|candidate| is_usable_address(candidate))
}

/// `getprop <prop>` prints the bare value; an unset property prints an empty line.
pub fn parse_getprop_address(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .filter(|value| is_usable_address(value))
        .map(str::to_string)
}

pub fn parse_connect_outcome(output: &BridgeOutput) -> ConnectOutcome {
    let combined = output.combined().to_lowercase();
    if combined.contains("already connected") {
        ConnectOutcome::AlreadyConnected
    } else if combined.contains("connected") {
        ConnectOutcome::Connected
    } else {
        let detail = output.detail();
        ConnectOutcome::Failed(if detail.is_empty() {
            "no response from adb".to_string()
        } else {
            detail
        })
    }
}
