//! Fixed command lines understood by the bridge.

fn owned(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

pub fn devices() -> Vec<String> {
    owned(&["devices"])
}

pub fn connect(endpoint: &str) -> Vec<String> {
    owned(&["connect", endpoint])
}

pub fn tcpip(serial: &str, port: u16) -> Vec<String> {
    let port = port.to_string();
    owned(&["-s", serial, "tcpip", &port])
}

pub fn inet_addr_show(serial: &str, interface: &str) -> Vec<String> {
    owned(&["-s", serial, "shell", "ip", "-f", "inet", "addr", "show", interface])
}

pub fn getprop(serial: &str, prop: &str) -> Vec<String> {
    owned(&["-s", serial, "shell", "getprop", prop])
}

pub fn kill_server() -> Vec<String> {
    owned(&["kill-server"])
}

pub fn start_server() -> Vec<String> {
    owned(&["start-server"])
}

pub fn version() -> Vec<String> {
    owned(&["version"])
}
