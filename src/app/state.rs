use std::sync::mpsc::Receiver;
use std::sync::Arc;

use tracing::warn;

use crate::app::adb::locator::{resolve_adb_program, validate_adb_program};
use crate::app::adb::runner::{AdbBridge, AdbCli};
use crate::app::config::AppConfig;
use crate::app::enumerator::DeviceEnumerator;
use crate::app::models::TaskReport;
use crate::app::state_store::StateStore;
use crate::app::tasks::TaskRunner;

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<StateStore>,
    pub enumerator: Arc<DeviceEnumerator>,
    pub tasks: TaskRunner,
}

impl AppState {
    /// Wires the real `adb` executable from configuration. A missing executable is only
    /// logged here; operations that invoke adb report it when they run.
    pub fn from_config(config: AppConfig, trace_id: &str) -> (Self, Receiver<TaskReport>) {
        let program = resolve_adb_program(&config.bridge.command_path);
        if let Err(message) = validate_adb_program(&program) {
            warn!(trace_id = %trace_id, program = %program, error = %message, "adb executable looks unusable");
        }
        let bridge: Arc<dyn AdbBridge> = Arc::new(AdbCli::new(program, config.bridge.timeout()));
        Self::with_bridge(config, bridge)
    }

    pub fn with_bridge(config: AppConfig, bridge: Arc<dyn AdbBridge>) -> (Self, Receiver<TaskReport>) {
        let store = Arc::new(StateStore::new(config.state_path()));
        let enumerator = Arc::new(DeviceEnumerator::new(
            bridge,
            Arc::clone(&store),
            &config.bridge,
            config.discovery.max_parallel_promotions,
        ));
        let (tasks, reports) = TaskRunner::new();
        (
            Self {
                config,
                store,
                enumerator,
                tasks,
            },
            reports,
        )
    }
}
