use tracing::info;
use uuid::Uuid;

use crate::app::endpoint::DeviceEndpoint;
use crate::app::error::AppError;
use crate::app::models::{
    BridgeInfo, CommandResponse, ConnectOutcome, ReconciledDeviceList, ReconnectSummary,
};
use crate::app::state::AppState;


pub fn resolve_trace_id(input: Option<String>) -> String {
    input
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn ensure_non_empty(value: &str, field: &str, trace_id: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} is required"), trace_id));
    }
    Ok(())
}

pub fn refresh_devices(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<ReconciledDeviceList>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "refresh_devices");
    let data = state.enumerator.reconcile(&trace_id)?;
    Ok(CommandResponse { trace_id, data })
}

pub fn connect_device(
    state: &AppState,
    target: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<ConnectOutcome>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    ensure_non_empty(&target, "target", &trace_id)?;
    info!(trace_id = %trace_id, target = %target, "connect_device");

    let endpoint = DeviceEndpoint::new(target.trim());
    match state.enumerator.connect_to(&endpoint, &trace_id) {
        ConnectOutcome::Failed(detail) => Err(AppError::discovery(
            format!("adb connect {endpoint} failed: {detail}"),
            &trace_id,
        )),
        outcome => Ok(CommandResponse {
            trace_id,
            data: outcome,
        }),
    }
}

pub fn reconnect_known_devices(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<ReconnectSummary>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "reconnect_known_devices");
    let data = state.enumerator.reconnect_known(&trace_id);
    Ok(CommandResponse { trace_id, data })
}

pub fn restart_bridge_server(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<ReconnectSummary>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "restart_bridge_server");
    let data = state.enumerator.restart_server(&trace_id)?;
    Ok(CommandResponse { trace_id, data })
}

pub fn add_device_by_address(
    state: &AppState,
    address: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<DeviceEndpoint>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    ensure_non_empty(&address, "address", &trace_id)?;
    info!(trace_id = %trace_id, address = %address, "add_device_by_address");
    let data = state.enumerator.add_by_address(&address, &trace_id)?;
    Ok(CommandResponse { trace_id, data })
}

pub fn list_known_devices(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<Vec<DeviceEndpoint>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    let data = state.store.load(&trace_id);
    Ok(CommandResponse { trace_id, data })
}

pub fn check_bridge(
    state: &AppState,
    trace_id: Option<String>,
) -> Result<CommandResponse<BridgeInfo>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    let data = state.enumerator.check_bridge(&trace_id);
    if !data.available {
        return Err(AppError::bridge_unavailable(
            format!(
                "adb at {} is not usable: {}",
                data.command_path,
                data.error.clone().unwrap_or_default()
            ),
            &trace_id,
        ));
    }
    Ok(CommandResponse { trace_id, data })
}
