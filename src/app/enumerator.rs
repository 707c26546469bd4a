use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::adb::args;
use crate::app::adb::parse::{
    parse_adb_devices, parse_connect_outcome, parse_getprop_address, parse_inet_address,
};
use crate::app::adb::runner::AdbBridge;
use crate::app::config::BridgeSettings;
use crate::app::endpoint::{parse_manual_address, DeviceEndpoint, EndpointKind};
use crate::app::error::AppError;
use crate::app::models::{BridgeInfo, ConnectOutcome, ReconciledDeviceList, ReconnectSummary};
use crate::app::scheduler::run_bounded;
use crate::app::state_store::StateStore;

/// Finds attached devices, promotes USB devices to wireless endpoints and keeps the
/// [`StateStore`] in step with every network endpoint seen.
pub struct DeviceEnumerator {
    bridge: Arc<dyn AdbBridge>,
    store: Arc<StateStore>,
    max_parallel_promotions: usize,
    port: u16,
    wifi_interface: String,
    settle_delay: Duration,
}

impl DeviceEnumerator {
    pub fn new(
        bridge: Arc<dyn AdbBridge>,
        store: Arc<StateStore>,
        settings: &BridgeSettings,
        max_parallel_promotions: usize,
    ) -> Self {
        Self {
            bridge,
            store,
            max_parallel_promotions,
            port: settings.wireless_port,
            wifi_interface: settings.wifi_interface.clone(),
            settle_delay: settings.settle_delay(),
        }
    }

    /// Ready devices reported by `adb devices`, in listing order.
    pub fn list_attached(&self, trace_id: &str) -> Result<Vec<DeviceEndpoint>, AppError> {
        let output = self.bridge.run(&args::devices(), trace_id);
        if !output.launched {
            return Err(AppError::bridge_unavailable(
                format!("adb is not available: {}", output.detail()),
                trace_id,
            ));
        }

        let mut seen = HashSet::new();
        let mut ready = Vec::new();
        for line in parse_adb_devices(&output.stdout) {
            if !line.is_ready() {
                debug!(trace_id = %trace_id, serial = %line.serial, state = %line.state, "skipping device that is not ready");
                continue;
            }
            if seen.insert(line.serial.clone()) {
                ready.push(DeviceEndpoint::new(line.serial));
            }
        }
        Ok(ready)
    }

    pub fn discover_network_address(&self, serial: &str, trace_id: &str) -> Option<String> {
        let output = self
            .bridge
            .run(&args::inet_addr_show(serial, &self.wifi_interface), trace_id);
        if let Some(address) = parse_inet_address(&output.stdout) {
            return Some(address);
        }

        let prop = format!("dhcp.{}.ipaddress", self.wifi_interface);
        let output = self.bridge.run(&args::getprop(serial, &prop), trace_id);
        let address = parse_getprop_address(&output.stdout);
        if address.is_none() {
            let err = AppError::discovery(format!("no wireless address found for {serial}"), trace_id);
            warn!(trace_id = %trace_id, serial = %serial, error = %err, "network address discovery failed");
        }
        address
    }

    /// Enables the device's network listener and connects to it. `None` on any failure.
    pub fn promote_to_network(&self, serial: &str, trace_id: &str) -> Option<DeviceEndpoint> {
        let address = self.discover_network_address(serial, trace_id)?;

        let output = self.bridge.run(&args::tcpip(serial, self.port), trace_id);
        if output.exit_code != Some(0) {
            warn!(
                trace_id = %trace_id,
                serial = %serial,
                error = %output.detail(),
                "failed to enable tcpip listener"
            );
            return None;
        }
        if !self.settle_delay.is_zero() {
            thread::sleep(self.settle_delay);
        }

        let endpoint = DeviceEndpoint::network(&address, self.port);
        match self.connect_network(&endpoint, trace_id) {
            outcome if outcome.is_success() => {
                info!(trace_id = %trace_id, serial = %serial, endpoint = %endpoint, "promoted device to wireless");
                Some(endpoint)
            }
            ConnectOutcome::Failed(detail) => {
                let err = AppError::discovery(format!("connect to {endpoint} failed: {detail}"), trace_id);
                warn!(trace_id = %trace_id, serial = %serial, error = %err, "promotion failed");
                None
            }
            _ => None,
        }
    }

    /// Lists devices, promotes every USB serial in parallel, then records all network
    /// endpoints seen this cycle.
    pub fn reconcile(&self, trace_id: &str) -> Result<ReconciledDeviceList, AppError> {
        let attached = self.list_attached(trace_id)?;
        let (serials, already_network): (Vec<_>, Vec<_>) = attached
            .into_iter()
            .partition(|endpoint| endpoint.kind() == EndpointKind::Serial);

        let promoted = run_bounded(&serials, self.max_parallel_promotions, |serial| {
            self.promote_to_network(serial.as_str(), trace_id)
        })
        .into_iter()
        .zip(&serials)
        .filter_map(|(outcome, serial)| match outcome {
            Some(endpoint) => endpoint,
            None => {
                warn!(trace_id = %trace_id, serial = %serial, "promotion worker panicked");
                None
            }
        })
        .collect::<Vec<_>>();

        let mut seen = HashSet::new();
        let mut devices = Vec::new();
        for endpoint in serials.iter().chain(&already_network).chain(&promoted) {
            if seen.insert(endpoint.clone()) {
                devices.push(endpoint.clone());
            }
        }

        let seen_network = already_network
            .iter()
            .chain(&promoted)
            .cloned()
            .collect::<Vec<_>>();
        let saved = match self.store.merge(&seen_network, trace_id) {
            Ok(_) => true,
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "failed to persist known endpoints");
                false
            }
        };

        info!(
            trace_id = %trace_id,
            devices = devices.len(),
            promoted = promoted.len(),
            saved,
            "device refresh complete"
        );
        Ok(ReconciledDeviceList {
            devices,
            promoted,
            saved,
        })
    }

    fn connect_network(&self, endpoint: &DeviceEndpoint, trace_id: &str) -> ConnectOutcome {
        let output = self.bridge.run(&args::connect(endpoint.as_str()), trace_id);
        parse_connect_outcome(&output)
    }

    pub fn connect_to(&self, endpoint: &DeviceEndpoint, trace_id: &str) -> ConnectOutcome {
        match endpoint.kind() {
            EndpointKind::Serial => ConnectOutcome::AlreadyConnected,
            EndpointKind::Network => self.connect_network(endpoint, trace_id),
        }
    }

    /// Tries every persisted endpoint. Failures stay in the store.
    pub fn reconnect_known(&self, trace_id: &str) -> ReconnectSummary {
        let attempted = self.store.load(trace_id);
        let mut reconnected = Vec::new();
        for endpoint in &attempted {
            match self.connect_to(endpoint, trace_id) {
                ConnectOutcome::Failed(detail) => {
                    warn!(trace_id = %trace_id, endpoint = %endpoint, error = %detail, "reconnect failed");
                }
                _ => reconnected.push(endpoint.clone()),
            }
        }
        info!(
            trace_id = %trace_id,
            attempted = attempted.len(),
            reconnected = reconnected.len(),
            "reconnect known devices complete"
        );
        ReconnectSummary {
            attempted,
            reconnected,
        }
    }

    /// Validates user input, connects, and remembers the endpoint on success.
    pub fn add_by_address(&self, input: &str, trace_id: &str) -> Result<DeviceEndpoint, AppError> {
        let endpoint = parse_manual_address(input, self.port).ok_or_else(|| {
            AppError::validation(
                format!("'{}' is not an IPv4 address or IPv4:port endpoint", input.trim()),
                trace_id,
            )
        })?;
        if let ConnectOutcome::Failed(detail) = self.connect_network(&endpoint, trace_id) {
            return Err(AppError::discovery(
                format!("Failed to connect to {endpoint}: {detail}"),
                trace_id,
            ));
        }
        self.store.merge(std::slice::from_ref(&endpoint), trace_id)?;
        Ok(endpoint)
    }

    /// kill-server, start-server, then reconnect everything known.
    pub fn restart_server(&self, trace_id: &str) -> Result<ReconnectSummary, AppError> {
        for command in [args::kill_server(), args::start_server()] {
            let output = self.bridge.run(&command, trace_id);
            if !output.launched {
                return Err(AppError::bridge_unavailable(
                    format!("adb is not available: {}", output.detail()),
                    trace_id,
                ));
            }
            debug!(trace_id = %trace_id, command = ?command, exit_code = ?output.exit_code, "adb server command");
        }
        Ok(self.reconnect_known(trace_id))
    }

    pub fn check_bridge(&self, trace_id: &str) -> BridgeInfo {
        let output = self.bridge.run(&args::version(), trace_id);
        let available = output.launched && output.exit_code == Some(0);
        BridgeInfo {
            available,
            version_output: output.stdout.trim().to_string(),
            command_path: self.bridge.program().to_string(),
            error: (!available).then(|| output.detail()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::BridgeOutput;
    use crate::app::test_utils::ScriptedBridge;

    fn enumerator(bridge: Arc<ScriptedBridge>, dir: &std::path::Path) -> DeviceEnumerator {
        let store = Arc::new(StateStore::new(dir.join("known_devices.json")));
        let settings = BridgeSettings {
            tcpip_settle_ms: 0,
            ..BridgeSettings::default()
        };
        DeviceEnumerator::new(bridge, store, &settings, 4)
    }

    fn strings(values: &[DeviceEndpoint]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn list_attached_keeps_ready_devices_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bridge = Arc::new(ScriptedBridge::new().respond(
            "devices",
            "List of devices attached\nABC123\tdevice\nOFF1\toffline\n10.0.0.2:5555\tdevice\n",
        ));
        let enumerator = enumerator(bridge, dir.path());
        let attached = enumerator.list_attached("t").expect("list");
        assert_eq!(strings(&attached), vec!["ABC123", "10.0.0.2:5555"]);
    }

    #[test]
    fn list_attached_empty_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bridge = Arc::new(ScriptedBridge::new().respond("devices", "List of devices attached\n\n"));
        assert!(enumerator(bridge, dir.path()).list_attached("t").expect("list").is_empty());
    }

    #[test]
    fn missing_bridge_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bridge = Arc::new(ScriptedBridge::unavailable());
        let err = enumerator(bridge, dir.path()).reconcile("trace-x").expect_err("should fail");
        assert_eq!(err.code, "ERR_BRIDGE_UNAVAILABLE");
        assert_eq!(err.trace_id, "trace-x");
    }

    #[test]
    fn discovery_falls_back_to_getprop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bridge = Arc::new(
            ScriptedBridge::new()
                .respond("-s ABC123 shell ip -f inet addr show wlan0", "Device \"wlan0\" does not exist.\n")
                .respond("-s ABC123 shell getprop dhcp.wlan0.ipaddress", "192.168.0.44\n"),
        );
        let enumerator = enumerator(bridge, dir.path());
        assert_eq!(
            enumerator.discover_network_address("ABC123", "t").as_deref(),
            Some("192.168.0.44")
        );
        assert_eq!(enumerator.discover_network_address("OTHER", "t"), None);
    }

    #[test]
    fn reconcile_promotes_usb_device_and_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bridge = Arc::new(
            ScriptedBridge::new()
                .respond("devices", "List of devices attached\nABC123\tdevice\n")
                .respond(
                    "-s ABC123 shell ip -f inet addr show wlan0",
                    "    inet 192.168.1.20/24 brd 192.168.1.255 scope global wlan0\n",
                )
                .respond("-s ABC123 tcpip 5555", "restarting in TCP mode port: 5555\n")
                .respond("connect 192.168.1.20:5555", "connected to 192.168.1.20:5555\n"),
        );
        let enumerator = enumerator(Arc::clone(&bridge), dir.path());

        let result = enumerator.reconcile("t").expect("reconcile");
        assert!(result.devices.contains(&DeviceEndpoint::from("ABC123")));
        assert!(result.devices.contains(&DeviceEndpoint::from("192.168.1.20:5555")));
        assert_eq!(strings(&result.promoted), vec!["192.168.1.20:5555"]);
        assert!(result.saved);
        assert_eq!(strings(&enumerator.store.load("t")), vec!["192.168.1.20:5555"]);

        let calls = bridge.calls();
        let tcpip = calls.iter().position(|call| call == "-s ABC123 tcpip 5555").expect("tcpip");
        let connect = calls.iter().position(|call| call == "connect 192.168.1.20:5555").expect("connect");
        assert!(tcpip < connect);
    }

    #[test]
    fn failed_promotion_keeps_serial_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bridge = Arc::new(
            ScriptedBridge::new()
                .respond("devices", "List of devices attached\nABC123\tdevice\n10.0.0.5:5555\tdevice\n")
                .respond(
                    "-s ABC123 shell ip -f inet addr show wlan0",
                    "    inet 192.168.1.20/24 scope global wlan0\n",
                )
                .respond("-s ABC123 tcpip 5555", "restarting in TCP mode port: 5555\n")
                .respond("connect 192.168.1.20:5555", "failed to connect to 192.168.1.20:5555\n"),
        );
        let enumerator = enumerator(bridge, dir.path());

        let result = enumerator.reconcile("t").expect("reconcile");
        assert_eq!(strings(&result.devices), vec!["ABC123", "10.0.0.5:5555"]);
        assert!(result.promoted.is_empty());
        assert_eq!(strings(&enumerator.store.load("t")), vec!["10.0.0.5:5555"]);
    }

    #[test]
    fn failed_tcpip_skips_connect() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bridge = Arc::new(
            ScriptedBridge::new()
                .respond(
                    "-s ABC123 shell ip -f inet addr show wlan0",
                    "    inet 192.168.1.20/24 scope global wlan0\n",
                )
                .script(
                    "-s ABC123 tcpip 5555",
                    BridgeOutput::completed("", "error: device unauthorized", Some(1)),
                ),
        );
        let enumerator = enumerator(Arc::clone(&bridge), dir.path());
        assert_eq!(enumerator.promote_to_network("ABC123", "t"), None);
        assert!(!bridge.calls().iter().any(|call| call.starts_with("connect")));
    }

    #[test]
    fn connect_to_serial_needs_no_bridge_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bridge = Arc::new(ScriptedBridge::new());
        let enumerator = enumerator(Arc::clone(&bridge), dir.path());
        assert_eq!(
            enumerator.connect_to(&DeviceEndpoint::from("ZY3222ABCDEF"), "t"),
            ConnectOutcome::AlreadyConnected
        );
        assert!(bridge.calls().is_empty());
    }

    #[test]
    fn reconnect_never_evicts_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bridge = Arc::new(
            ScriptedBridge::new()
                .respond("connect 10.0.0.1:5555", "already connected to 10.0.0.1:5555\n")
                .respond("connect 10.0.0.2:5555", "failed to connect to 10.0.0.2:5555\n"),
        );
        let enumerator = enumerator(bridge, dir.path());
        let known = vec![DeviceEndpoint::from("10.0.0.1:5555"), DeviceEndpoint::from("10.0.0.2:5555")];
        enumerator.store.save(&known, "t").expect("save");

        let summary = enumerator.reconnect_known("t");
        assert_eq!(strings(&summary.reconnected), vec!["10.0.0.1:5555"]);
        assert_eq!(enumerator.store.load("t"), known);
    }

    #[test]
    fn add_by_address_rejects_bad_input_before_bridge() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bridge = Arc::new(ScriptedBridge::new());
        let enumerator = enumerator(Arc::clone(&bridge), dir.path());
        let err = enumerator.add_by_address("not-an-ip", "t").expect_err("invalid");
        assert_eq!(err.code, "ERR_VALIDATION");
        assert!(bridge.calls().is_empty());
    }

    #[test]
    fn add_by_address_persists_on_success_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bridge = Arc::new(
            ScriptedBridge::new()
                .respond("connect 192.168.1.30:5555", "connected to 192.168.1.30:5555\n")
                .respond("connect 192.168.1.31:5555", "failed to connect\n"),
        );
        let enumerator = enumerator(bridge, dir.path());

        let added = enumerator.add_by_address("192.168.1.30", "t").expect("add");
        assert_eq!(added.as_str(), "192.168.1.30:5555");
        let err = enumerator.add_by_address("192.168.1.31", "t").expect_err("fail");
        assert_eq!(err.code, "ERR_DISCOVERY");
        assert_eq!(strings(&enumerator.store.load("t")), vec!["192.168.1.30:5555"]);
    }

    #[test]
    fn add_by_address_uses_configured_port() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bridge = Arc::new(
            ScriptedBridge::new().respond("connect 192.168.1.30:5037", "connected to 192.168.1.30:5037\n"),
        );
        let store = Arc::new(StateStore::new(dir.path().join("known_devices.json")));
        let settings = BridgeSettings {
            wireless_port: 5037,
            tcpip_settle_ms: 0,
            ..BridgeSettings::default()
        };
        let enumerator = DeviceEnumerator::new(bridge, store, &settings, 1);

        let added = enumerator.add_by_address("192.168.1.30", "t").expect("add");
        assert_eq!(added.as_str(), "192.168.1.30:5037");
    }

    #[test]
    fn single_worker_still_promotes_every_serial() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bridge = Arc::new(
            ScriptedBridge::new()
                .respond("devices", "List of devices attached\nAAA\tdevice\nBBB\tdevice\n")
                .respond("-s AAA shell ip -f inet addr show wlan0", "    inet 10.0.0.11/24 scope global wlan0\n")
                .respond("-s BBB shell ip -f inet addr show wlan0", "    inet 10.0.0.12/24 scope global wlan0\n")
                .respond("connect 10.0.0.11:5555", "connected to 10.0.0.11:5555\n")
                .respond("connect 10.0.0.12:5555", "connected to 10.0.0.12:5555\n"),
        );
        let store = Arc::new(StateStore::new(dir.path().join("known_devices.json")));
        let settings = BridgeSettings {
            tcpip_settle_ms: 0,
            ..BridgeSettings::default()
        };
        let enumerator = DeviceEnumerator::new(bridge, store, &settings, 1);

        let list = enumerator.reconcile("t").expect("reconcile");
        assert_eq!(strings(&list.promoted), vec!["10.0.0.11:5555", "10.0.0.12:5555"]);
        assert_eq!(
            strings(&enumerator.store.load("t")),
            vec!["10.0.0.11:5555", "10.0.0.12:5555"]
        );
    }

    #[test]
    fn restart_server_reconnects_known() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bridge = Arc::new(
            ScriptedBridge::new()
                .respond("kill-server", "")
                .respond("start-server", "* daemon started successfully\n")
                .respond("connect 10.0.0.1:5555", "connected to 10.0.0.1:5555\n"),
        );
        let enumerator = enumerator(Arc::clone(&bridge), dir.path());
        enumerator
            .store
            .save(&[DeviceEndpoint::from("10.0.0.1:5555")], "t")
            .expect("save");

        let summary = enumerator.restart_server("t").expect("restart");
        assert_eq!(strings(&summary.reconnected), vec!["10.0.0.1:5555"]);
        let calls = bridge.calls();
        assert_eq!(&calls[..2], &["kill-server".to_string(), "start-server".to_string()]);
    }

    #[test]
    fn check_bridge_reports_version() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bridge = Arc::new(ScriptedBridge::new().respond("version", "Android Debug Bridge version 1.0.41\n"));
        let info = enumerator(bridge, dir.path()).check_bridge("t");
        assert!(info.available);
        assert!(info.version_output.contains("1.0.41"));
        assert_eq!(info.error, None);

        let info = enumerator(Arc::new(ScriptedBridge::unavailable()), dir.path()).check_bridge("t");
        assert!(!info.available);
        assert!(info.error.is_some());
    }
}
