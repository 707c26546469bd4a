//! In-memory bridge for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::app::adb::runner::AdbBridge;
use crate::app::models::BridgeOutput;

/// Answers bridge invocations from a table keyed by the space-joined argument list.
/// Unknown commands complete with empty output.
pub struct ScriptedBridge {
    responses: HashMap<String, BridgeOutput>,
    calls: Mutex<Vec<String>>,
    available: bool,
}

impl ScriptedBridge {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            available: true,
        }
    }

    /// Every invocation fails to launch, as when the executable is missing.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn respond(self, command: &str, stdout: &str) -> Self {
        self.script(command, BridgeOutput::completed(stdout, "", Some(0)))
    }

    pub fn script(mut self, command: &str, output: BridgeOutput) -> Self {
        self.responses.insert(command.to_string(), output);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl AdbBridge for ScriptedBridge {
    fn run(&self, args: &[String], _trace_id: &str) -> BridgeOutput {
        let key = args.join(" ");
        self.calls.lock().expect("calls lock").push(key.clone());
        if !self.available {
            return BridgeOutput::not_launched("No such file or directory (os error 2)");
        }
        self.responses
            .get(&key)
            .cloned()
            .unwrap_or_else(|| BridgeOutput::completed("", "", Some(0)))
    }

    fn program(&self) -> &str {
        "scripted-adb"
    }
}
