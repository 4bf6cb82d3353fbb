// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Benchmark process management.
//!
//! Spawns fio with its stdout piped as the chunk stream. stderr is read on
//! a separate task into a bounded tail, surfaced only when the process
//! exits unsuccessfully. fio runs in its own process group so that signals
//! reach the job processes it forks: termination sends SIGTERM to the group
//! and escalates to SIGKILL after the grace period.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::config::BenchmarkConfig;
use crate::error::ProcessError;
use crate::source::ChunkSource;

/// Bytes of stderr kept for diagnostics.
const STDERR_TAIL_BYTES: usize = 4096;

/// How long to wait for stderr to close after the process has exited.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A spawned benchmark, read as a chunk source.
pub struct BenchmarkProcess {
    program: String,
    args: Vec<String>,
    grace: Duration,
    buf: Vec<u8>,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr_tail: Option<JoinHandle<String>>,
    status: Option<ExitStatus>,
    /// Set once we have signalled the process ourselves.
    terminated: bool,
}

impl BenchmarkProcess {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        grace: Duration,
        chunk_bytes: usize,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            grace,
            buf: vec![0; chunk_bytes.max(1)],
            child: None,
            stdout: None,
            stderr_tail: None,
            status: None,
            terminated: false,
        }
    }

    /// fio as described by the benchmark configuration.
    pub fn from_config(config: &BenchmarkConfig, chunk_bytes: usize) -> Self {
        Self::new(
            config.binary.clone(),
            config.args(),
            config.terminate_grace,
            chunk_bytes,
        )
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Exit status, once reaped.
    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    fn send_signal(&self, sig: Signal) -> Result<(), ProcessError> {
        let Some(pid) = self.pid() else {
            return Ok(());
        };
        match signal::killpg(Pid::from_raw(pid as i32), sig) {
            // Already gone.
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(ProcessError::Signal {
                pid,
                reason: format!("{}: {}", sig, e),
            }),
        }
    }

    async fn reap(&mut self) -> Result<Option<ExitStatus>, ProcessError> {
        if self.status.is_some() {
            return Ok(self.status);
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };
        let status = child.wait().await.map_err(ProcessError::Read)?;
        tracing::debug!(program = %self.program, %status, "Benchmark exited");
        self.status = Some(status);
        Ok(self.status)
    }

    async fn collect_stderr(&mut self) -> String {
        let Some(mut handle) = self.stderr_tail.take() else {
            return String::new();
        };
        match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut handle).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => {
                handle.abort();
                "(stderr still held open by a child process)".to_string()
            }
        }
    }
}

/// Read `reader` to the end, keeping only the last `max` bytes.
async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, max: usize) -> String {
    let mut tail: Vec<u8> = Vec::with_capacity(max);
    let mut buf = [0u8; 1024];
    let mut total = 0usize;

    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                total += n;
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > max {
                    let excess = tail.len() - max;
                    tail.drain(..excess);
                }
            }
        }
    }

    let text = String::from_utf8_lossy(&tail).trim().to_string();
    if total > max {
        format!("...{} (last {} of {} bytes)", text, tail.len(), total)
    } else {
        text
    }
}

#[async_trait]
impl ChunkSource for BenchmarkProcess {
    async fn start(&mut self) -> Result<(), ProcessError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        self.stdout = child.stdout.take();
        self.stderr_tail = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(read_tail(stderr, STDERR_TAIL_BYTES)));

        tracing::info!(
            program = %self.program,
            args = ?self.args,
            pid = child.id(),
            "Spawned benchmark process"
        );

        self.child = Some(child);
        Ok(())
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ProcessError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return if self.child.is_some() {
                Ok(None)
            } else {
                Err(ProcessError::NotStarted)
            };
        };

        let n = stdout.read(&mut self.buf).await.map_err(ProcessError::Read)?;
        if n == 0 {
            self.stdout = None;
            return Ok(None);
        }
        Ok(Some(self.buf[..n].to_vec()))
    }

    async fn terminate(&mut self) -> Result<(), ProcessError> {
        if self.status.is_some() {
            return Ok(());
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };

        // An exit that happened before we signal keeps its own status.
        if let Some(status) = child.try_wait().map_err(ProcessError::Read)? {
            tracing::debug!(program = %self.program, %status, "Benchmark exited before terminate");
            self.status = Some(status);
            self.stdout = None;
            return Ok(());
        }

        self.terminated = true;
        self.stdout = None;

        tracing::info!(pid = self.pid(), "Sending SIGTERM to benchmark");
        self.send_signal(Signal::SIGTERM)?;

        let grace = self.grace;
        match tokio::time::timeout(grace, self.reap()).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => {
                tracing::warn!(
                    pid = self.pid(),
                    grace_ms = grace.as_millis() as u64,
                    "Benchmark ignored SIGTERM, sending SIGKILL"
                );
                self.send_signal(Signal::SIGKILL)?;
                self.reap().await.map(|_| ())
            }
        }
    }

    async fn finish(&mut self) -> Result<(), ProcessError> {
        let status = match self.reap().await? {
            Some(status) => status,
            None => return Err(ProcessError::NotStarted),
        };
        let diagnostics = self.collect_stderr().await;

        if status.success() || self.terminated {
            if !diagnostics.is_empty() {
                tracing::debug!(stderr = %diagnostics, "Benchmark stderr");
            }
            return Ok(());
        }

        Err(ProcessError::Failure {
            status: status.to_string(),
            diagnostics: if diagnostics.is_empty() {
                "(no stderr output)".to_string()
            } else {
                diagnostics
            },
        })
    }

    fn describe(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}
