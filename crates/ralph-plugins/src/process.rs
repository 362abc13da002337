//! The framework's process-launch wrapper
//!
//! Spawns the vendor CLI with piped stdio in its own process group, with
//! `kill_on_drop` as a safety net. The prompt travels via argv; stdin is
//! never used after launch.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::debug;

use ralph_core::{Error, Result};

use crate::runner::{AgentHandle, OutputPipe};

/// Launch a child process and wrap it in a handle.
pub async fn launch(binary: &str, args: &[String], cwd: &Path) -> Result<ProcessHandle> {
    debug!("launch: {} {:?} (cwd {})", binary, args, cwd.display());

    let mut command = Command::new(binary);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let child = command.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::MissingBinary {
            binary: binary.to_string(),
        },
        _ => Error::Io(e),
    })?;

    let pid = child.id();
    Ok(ProcessHandle { child, pid })
}

pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
}

impl ProcessHandle {
    fn exit_code(status: std::process::ExitStatus) -> i32 {
        status.code().unwrap_or(-1)
    }

    #[cfg(unix)]
    fn send_sigint(&self) {
        if let Some(pid) = self.pid {
            // The child is its own process group leader; signal the group so
            // grandchildren get it too.
            unsafe {
                libc::kill(-(pid as i32), libc::SIGINT);
            }
        }
    }

    #[cfg(not(unix))]
    fn send_sigint(&self) {}
}

#[async_trait::async_trait]
impl AgentHandle for ProcessHandle {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn take_stdout(&mut self) -> Option<OutputPipe> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as OutputPipe)
    }

    fn take_stderr(&mut self) -> Option<OutputPipe> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as OutputPipe)
    }

    async fn interrupt(&mut self, grace: Duration) -> Result<i32> {
        self.send_sigint();
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => Ok(Self::exit_code(status)),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => {
                debug!("interrupt: grace expired, escalating to SIGKILL");
                self.child.kill().await.map_err(Error::Io)?;
                let status = self.child.wait().await.map_err(Error::Io)?;
                Ok(Self::exit_code(status))
            }
        }
    }

    async fn kill(&mut self) -> Result<()> {
        self.child.kill().await.map_err(Error::Io)
    }

    async fn wait(&mut self) -> Result<i32> {
        let status = self.child.wait().await.map_err(Error::Io)?;
        Ok(Self::exit_code(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn launch_captures_stdout() {
        let mut handle = launch(
            "sh",
            &["-c".to_string(), "echo hello".to_string()],
            Path::new("."),
        )
        .await
        .unwrap();

        let mut out = String::new();
        handle
            .take_stdout()
            .unwrap()
            .read_to_string(&mut out)
            .await
            .unwrap();
        assert_eq!(out.trim(), "hello");
        assert_eq!(handle.wait().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_binary_is_typed() {
        let err = launch("definitely-not-a-real-binary-xyz", &[], Path::new("."))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::MissingBinary { .. }));
    }

    #[tokio::test]
    async fn nonzero_exit_code_propagates() {
        let mut handle = launch(
            "sh",
            &["-c".to_string(), "exit 3".to_string()],
            Path::new("."),
        )
        .await
        .unwrap();
        assert_eq!(handle.wait().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn interrupt_escalates_on_stubborn_child() {
        // Child ignores SIGINT and keeps looping; escalation must reap it.
        let mut handle = launch(
            "sh",
            &[
                "-c".to_string(),
                "trap '' INT; while :; do sleep 0.2; done".to_string(),
            ],
            Path::new("."),
        )
        .await
        .unwrap();

        let code = handle
            .interrupt(Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(code, -1); // killed by signal
    }
}
