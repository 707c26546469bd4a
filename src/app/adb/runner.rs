use std::io::Read;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::app::models::BridgeOutput;

/// The only seam between the core and the external bridge executable.
///
/// Implementations never fail: anything that goes wrong is reported through
/// [`BridgeOutput::stderr`] with an empty stdout.
pub trait AdbBridge: Send + Sync {
    fn run(&self, args: &[String], trace_id: &str) -> BridgeOutput;

    /// Human-readable name of the executable, for diagnostics.
    fn program(&self) -> &str;
}

/// Runs the real `adb` binary as a child process with a bounded timeout.
#[derive(Debug, Clone)]
pub struct AdbCli {
    program: String,
    timeout: Duration,
}

impl AdbCli {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl AdbBridge for AdbCli {
    fn run(&self, args: &[String], trace_id: &str) -> BridgeOutput {
        debug!(trace_id = %trace_id, program = %self.program, args = ?args, "adb invocation");
        let output = run_command_with_timeout(&self.program, args, self.timeout);
        if !output.launched {
            warn!(
                trace_id = %trace_id,
                program = %self.program,
                error = %output.stderr,
                "adb could not be started"
            );
        } else if output.exit_code.is_none() {
            warn!(
                trace_id = %trace_id,
                args = ?args,
                error = %output.stderr,
                "adb invocation did not complete"
            );
        }
        output
    }

    fn program(&self) -> &str {
        &self.program
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(_) => break,
            }
        }
        buffer
    })
}

fn join_lossy(handle: JoinHandle<Vec<u8>>) -> String {
    let bytes = handle.join().unwrap_or_default();
    String::from_utf8_lossy(&bytes).to_string()
}

pub fn run_command_with_timeout(program: &str, args: &[String], timeout: Duration) -> BridgeOutput {
    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => return BridgeOutput::not_launched(format!("Failed to spawn {program}: {err}")),
    };

    // Both pipes are drained on their own threads so a chatty child cannot fill a pipe buffer
    // and stall until the timeout.
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        let _ = child.kill();
        let _ = child.wait();
        return BridgeOutput::timed_out("Failed to capture child output");
    };
    let stdout_handle = drain(stdout);
    let stderr_handle = drain(stderr);

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    return BridgeOutput::timed_out(format!(
                        "Command timed out after {}s",
                        timeout.as_secs()
                    ));
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(err) => {
                let _ = child.kill();
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return BridgeOutput::timed_out(format!("Failed to poll command: {err}"));
            }
        }
    };

    BridgeOutput::completed(join_lossy(stdout_handle), join_lossy(stderr_handle), exit_code)
}
