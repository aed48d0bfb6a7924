// SPDX-License-Identifier: MIT

//! Child process supervision (spec §4.1 "Child process discipline", §5
//! "Cancellation semantics"). The child is spawned in its own process
//! group so cancellation can reach its descendants; `nix::sys::signal`
//! signals the group rather than only the direct child.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {0}: {1}")]
    SpawnFailed(String, std::io::Error),
}

/// Owns the running `ENGINE` child. Dropped handles leave the child
/// running; callers must `cancel` explicitly to reap it.
pub struct ChildProcess {
    child: Child,
    pgid: Pid,
}

impl ChildProcess {
    /// Spawn `program` with `args` in its own process group, merging
    /// stdout/stderr into a single piped stream.
    pub fn spawn(program: &str, args: &[String], env: &[(String, String)]) -> Result<Self, ProcessError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env.iter().map(|(k, v)| (k.clone(), v.clone())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            // `0` makes the child the leader of a new process group (its
            // pgid equals its pid), so `killpg` reaches every descendant
            // without affecting the Runner's own group.
            .process_group(0);

        let child = cmd
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed(program.to_string(), e))?;
        let pgid = Pid::from_raw(
            child
                .id()
                .ok_or_else(|| {
                    ProcessError::SpawnFailed(program.to_string(), std::io::Error::other("no pid"))
                })?
                .try_into()
                .unwrap_or(0),
        );

        Ok(Self { child, pgid })
    }

    /// Merge stdout+stderr into one line channel, splitting on both `\n`
    /// and `\r` (spec §4.1 "carriage returns are the primary delimiter for
    /// rewriting progress bars").
    pub fn take_line_stream(&mut self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let stdout = self.child.stdout.take();
        let stderr = self.child.stderr.take();

        if let Some(stdout) = stdout {
            let tx = tx.clone();
            tokio::spawn(pump_lines(stdout, tx));
        }
        if let Some(stderr) = stderr {
            tokio::spawn(pump_lines(stderr, tx));
        }
        rx
    }

    pub async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        self.child.wait().await
    }

    pub fn try_wait(&mut self) -> std::io::Result<Option<std::process::ExitStatus>> {
        self.child.try_wait()
    }

    /// Graceful-then-forceful cancellation (spec §4.1, §5): SIGTERM the
    /// process group, wait up to 1s, then SIGKILL the group.
    pub async fn cancel(&mut self) {
        if self.try_wait().ok().flatten().is_some() {
            return;
        }
        let _ = signal::killpg(self.pgid, Signal::SIGTERM);
        let deadline = tokio::time::sleep(std::time::Duration::from_secs(1));
        tokio::select! {
            _ = self.wait() => return,
            _ = deadline => {}
        }
        if self.try_wait().ok().flatten().is_none() {
            let _ = signal::killpg(self.pgid, Signal::SIGKILL);
            let _ = self.wait().await;
        }
    }
}

async fn pump_lines(mut reader: impl tokio::io::AsyncRead + Unpin, tx: mpsc::UnboundedSender<String>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut reader = BufReader::new(&mut reader);
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                for &byte in &chunk[..n] {
                    if byte == b'\n' || byte == b'\r' {
                        if !buf.is_empty() {
                            let line = String::from_utf8_lossy(&buf).into_owned();
                            let _ = tx.send(line);
                            buf.clear();
                        }
                    } else {
                        buf.push(byte);
                    }
                }
            }
            Err(_) => break,
        }
    }
    if !buf.is_empty() {
        let line = String::from_utf8_lossy(&buf).into_owned();
        let _ = tx.send(line);
    }
}
