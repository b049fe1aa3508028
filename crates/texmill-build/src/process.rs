//! Synchronous subprocess execution.
//!
//! [`ProcessRunner`] is the seam between the tool chain and the operating
//! system. [`SystemRunner`] spawns the real process with stdin suppressed and
//! both output streams forwarded line by line to the `log` sink; tests supply
//! their own runner instead of touching real TeX binaries.

use crate::error::ProcessError;
use log::{debug, warn};
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long an exited process may keep its output pipes open before the
/// forwarders are detached.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// A fully resolved command line for one tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Tool name used to label forwarded output.
    pub tool: &'static str,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
}

impl Invocation {
    pub fn new(
        tool: &'static str,
        program: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tool,
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Cooperative cancellation shared between a job and the processes it runs.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs an external program to completion.
///
/// Returns the exit code. A non-zero code is a normal return value here;
/// only failures to start, wait for, or finish the process are errors.
pub trait ProcessRunner: Send + Sync + std::fmt::Debug {
    fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<i32, ProcessError>;
}

/// Default [`ProcessRunner`] backed by `std::process::Command`.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Option<Duration>,
    poll_interval: Duration,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemRunner {
    pub fn new() -> Self {
        Self {
            timeout: None,
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Kills any process still running after `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn wait(
        &self,
        guard: &mut ChildGuard,
        program: &Path,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<ExitStatus, ProcessError> {
        loop {
            if let Some(status) = guard.try_wait().map_err(|source| ProcessError::Wait {
                program: program.to_path_buf(),
                source,
            })? {
                return Ok(status);
            }
            if cancel.is_cancelled() {
                guard.terminate();
                return Err(ProcessError::Cancelled {
                    program: program.to_path_buf(),
                });
            }
            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    guard.terminate();
                    return Err(ProcessError::TimedOut {
                        program: program.to_path_buf(),
                        timeout,
                    });
                }
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Waits for the output forwarders of an exited process to reach the end
    /// of their streams.
    ///
    /// A background grandchild can hold the pipes open long after the tool
    /// itself exited. After [`DRAIN_GRACE`], the timeout or a cancellation,
    /// the remaining forwarders are detached and keep logging on their own.
    fn drain(
        &self,
        mut pending: Vec<JoinHandle<()>>,
        tool: &str,
        started: Instant,
        cancel: &CancellationToken,
    ) {
        let mut deadline = Instant::now() + DRAIN_GRACE;
        if let Some(timeout) = self.timeout {
            deadline = deadline.min(started + timeout);
        }
        loop {
            let (finished, running): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|handle| handle.is_finished());
            for handle in finished {
                if handle.join().is_err() {
                    warn!("output forwarder for {} panicked", tool);
                }
            }
            pending = running;
            if pending.is_empty() {
                return;
            }
            if cancel.is_cancelled() || Instant::now() >= deadline {
                debug!(
                    "{}: output still open after exit, detaching {} forwarder(s)",
                    tool,
                    pending.len()
                );
                return;
            }
            thread::sleep(self.poll_interval);
        }
    }
}

impl ProcessRunner for SystemRunner {
    fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<i32, ProcessError> {
        let program = &invocation.program;
        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled {
                program: program.clone(),
            });
        }

        debug!(
            "running {} {:?} in {}",
            program.display(),
            invocation.args,
            invocation.working_dir.display()
        );

        let mut child = Command::new(program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: program.clone(),
                source,
            })?;

        let started = Instant::now();
        let forwarders: Vec<_> = [
            child.stdout.take().map(|out| forward(invocation.tool, "stdout", out)),
            child.stderr.take().map(|err| forward(invocation.tool, "stderr", err)),
        ]
        .into_iter()
        .flatten()
        .collect();

        let mut guard = ChildGuard(Some(child));
        let status = self.wait(&mut guard, program, started, cancel);
        drop(guard);

        // Grandchildren of a killed process may keep the pipes open, so the
        // forwarders of a killed process are detached right away.
        if status.is_ok() {
            self.drain(forwarders, invocation.tool, started, cancel);
        }

        let status = status?;
        status.code().ok_or_else(|| ProcessError::Signalled {
            program: program.clone(),
        })
    }
}

/// Owns a child process and reaps it on every exit path.
struct ChildGuard(Option<Child>);

impl ChildGuard {
    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        match self.0.as_mut() {
            Some(child) => {
                let status = child.try_wait()?;
                if status.is_some() {
                    self.0 = None;
                }
                Ok(status)
            }
            None => Ok(None),
        }
    }

    fn terminate(&mut self) {
        if let Some(mut child) = self.0.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn forward<R: Read + Send + 'static>(
    tool: &'static str,
    stream: &'static str,
    reader: R,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            match line {
                Ok(line) => debug!(target: "texmill::process", "[{}:{}] {}", tool, stream, line),
                Err(_) => break,
            }
        }
    })
}
