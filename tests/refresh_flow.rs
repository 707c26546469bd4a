use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};

use fadadb_rust_lib::app::adb::runner::AdbBridge;
use fadadb_rust_lib::app::commands::{
    add_device_by_address, list_known_devices, reconnect_known_devices, refresh_devices,
};
use fadadb_rust_lib::app::config::AppConfig;
use fadadb_rust_lib::app::endpoint::DeviceEndpoint;
use fadadb_rust_lib::app::models::BridgeOutput;
use fadadb_rust_lib::app::state::AppState;

/// A phone plugged in over USB that answers like a real adb would.
struct FakePhone {
    replies: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl FakePhone {
    fn new(replies: &[(&str, &str)]) -> Self {
        Self {
            replies: replies
                .iter()
                .map(|(command, stdout)| (command.to_string(), stdout.to_string()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl AdbBridge for FakePhone {
    fn run(&self, args: &[String], _trace_id: &str) -> BridgeOutput {
        let key = args.join(" ");
        self.calls.lock().expect("calls").push(key.clone());
        match self.replies.get(&key) {
            Some(stdout) => BridgeOutput::completed(stdout.clone(), "", Some(0)),
            None => BridgeOutput::completed("", "error: unknown command", Some(1)),
        }
    }

    fn program(&self) -> &str {
        "fake-adb"
    }
}

fn app_state(dir: &std::path::Path, phone: FakePhone) -> AppState {
    let mut config = AppConfig::default();
    config.state.path = dir.join("known_devices.json").to_string_lossy().to_string();
    config.bridge.tcpip_settle_ms = 0;
    let (state, _reports) = AppState::with_bridge(config, Arc::new(phone));
    state
}

fn usb_phone() -> FakePhone {
    FakePhone::new(&[
        ("devices", "List of devices attached\nABC123\tdevice\n"),
        (
            "-s ABC123 shell ip -f inet addr show wlan0",
            "30: wlan0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500\n    inet 192.168.1.20/24 brd 192.168.1.255 scope global wlan0\n",
        ),
        ("-s ABC123 tcpip 5555", "restarting in TCP mode port: 5555\n"),
        ("connect 192.168.1.20:5555", "connected to 192.168.1.20:5555\n"),
    ])
}

#[test]
fn refresh_promotes_and_remembers_usb_phone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = app_state(dir.path(), usb_phone());

    let refreshed = refresh_devices(&state, None).expect("refresh");
    assert!(refreshed.data.devices.contains(&DeviceEndpoint::from("ABC123")));
    assert!(refreshed.data.devices.contains(&DeviceEndpoint::from("192.168.1.20:5555")));

    let known = list_known_devices(&state, None).expect("known").data;
    assert_eq!(known, vec![DeviceEndpoint::from("192.168.1.20:5555")]);

    let raw = fs::read_to_string(dir.path().join("known_devices.json")).expect("state file");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
    assert_eq!(value, serde_json::json!({ "wireless_ips": ["192.168.1.20:5555"] }));
}

#[test]
fn repeated_refresh_does_not_duplicate_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = app_state(dir.path(), usb_phone());

    refresh_devices(&state, None).expect("first");
    refresh_devices(&state, None).expect("second");
    assert_eq!(list_known_devices(&state, None).expect("known").data.len(), 1);
}

#[test]
fn corrupted_state_recovers_and_is_repopulated() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("known_devices.json"), "{not valid json").expect("write");
    let state = app_state(dir.path(), usb_phone());

    assert!(list_known_devices(&state, None).expect("known").data.is_empty());
    let backup = fs::read_to_string(dir.path().join("known_devices.json.corrupted")).expect("backup");
    assert_eq!(backup, "{not valid json");

    refresh_devices(&state, None).expect("refresh");
    assert_eq!(
        list_known_devices(&state, None).expect("known").data,
        vec![DeviceEndpoint::from("192.168.1.20:5555")]
    );
}

#[test]
fn manual_add_then_reconnect_keeps_everything() {
    let dir = tempfile::tempdir().expect("tempdir");
    let phone = FakePhone::new(&[("connect 10.0.0.8:5555", "connected to 10.0.0.8:5555\n")]);
    let state = app_state(dir.path(), phone);

    let added = add_device_by_address(&state, "10.0.0.8".to_string(), None).expect("add");
    assert_eq!(added.data.as_str(), "10.0.0.8:5555");
    state
        .store
        .merge(&[DeviceEndpoint::from("10.0.0.9:5555")], "t")
        .expect("merge");

    let summary = reconnect_known_devices(&state, None).expect("reconnect").data;
    assert_eq!(summary.reconnected, vec![DeviceEndpoint::from("10.0.0.8:5555")]);
    assert_eq!(list_known_devices(&state, None).expect("known").data.len(), 2);
}
