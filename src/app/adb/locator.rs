use std::path::{Path, PathBuf};

const ADB_BINARY: &str = if cfg!(windows) { "adb.exe" } else { "adb" };

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = trimmed
            .strip_prefix(quote)
            .and_then(|candidate| candidate.strip_suffix(quote))
        {
            return inner.trim().to_string();
        }
    }
    trimmed.to_string()
}

fn sdk_candidates() -> Vec<PathBuf> {
    ["ANDROID_HOME", "ANDROID_SDK_ROOT"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .filter(|value| !value.trim().is_empty())
        .map(|root| PathBuf::from(root).join("platform-tools").join(ADB_BINARY))
        .collect()
}

/// Picks the bridge executable: explicit configuration, then an Android SDK from the
/// environment, then whatever `adb` resolves to on `PATH`.
pub fn resolve_adb_program(config_command_path: &str) -> String {
    let normalized = normalize_command_path(config_command_path);
    if !normalized.is_empty() {
        return normalized;
    }
    sdk_candidates()
        .into_iter()
        .find(|candidate| candidate.is_file())
        .map(|candidate| candidate.to_string_lossy().to_string())
        .unwrap_or_else(|| "adb".to_string())
}

pub fn validate_adb_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("ADB command is empty".to_string());
    }
    if program == "adb" {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err("ADB path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err(format!("ADB executable not found at {program}"));
    }
    Ok(())
}
