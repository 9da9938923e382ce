use std::future::Future;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external program. Trait-based so the engine can be driven by a
/// scripted executor in tests.
///
/// A non-zero exit is reported through `CommandResult::success`; only
/// failures to run the program at all (spawn errors, timeouts) are `Err`.
pub trait CommandExecutor: Send + Sync + 'static {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> impl Future<Output = Result<CommandResult, io::Error>> + Send;
}

/// Executes commands as child processes, killing them once `timeout` elapses.
#[derive(Debug, Clone)]
pub struct ProcessCommandExecutor {
    timeout: Duration,
    envs: Vec<(String, String)>,
}

impl ProcessCommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, envs: Vec::new() }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl CommandExecutor for ProcessCommandExecutor {
    async fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, io::Error> {
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .envs(self.envs.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so helpers git forks can be killed along with it.
        #[cfg(unix)]
        command.process_group(0);

        debug!(
            program,
            cwd = %cwd.display(),
            timeout_ms = self.timeout.as_millis() as u64,
            "spawning command"
        );

        let child = command.spawn()?;
        let process_group = child.id();

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                kill_process_group(process_group);
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("timed out after {}ms", self.timeout.as_millis()),
                ));
            }
        };

        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(unix)]
fn kill_process_group(process_group: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = process_group.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    if let Err(error) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        debug!(pgid, %error, "process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_process_group: Option<u32>) {}
