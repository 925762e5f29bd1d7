// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker pid files and process probes.
//!
//! A pid file holds `"<pid> <start_ticks>"`, with a trailing `in-process`
//! when the job is driven by a runner thread rather than its own worker.
//! The start time (field 22 of `/proc/<pid>/stat`) guards against pid
//! reuse: a live process whose start time differs from the recorded one is
//! not our worker. Where `/proc` is unavailable the probe falls back to
//! `kill -0`.
//!
//! Only the process that drives a job writes its pid file, through
//! [`PidRecord::claim`].

use fs2::FileExt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use rj_core::Job;
use rj_engine::log_paths::pid_path;
use rj_engine::WorkerLiveness;

const IN_PROCESS: &str = "in-process";

static SIBLING_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidRecord {
    pub pid: u32,
    pub start_ticks: Option<u64>,
    /// Held by a runner thread. Signalling the pid would hit the whole
    /// runner, so such claims are cancelled through the job record only.
    pub in_process: bool,
}

/// Result of [`PidRecord::claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Acquired,
    Busy(PidRecord),
}

impl PidRecord {
    pub fn for_pid(pid: u32) -> Self {
        Self {
            pid,
            start_ticks: proc_stat(pid).map(|s| s.start_ticks),
            in_process: false,
        }
    }

    pub fn current() -> Self {
        Self::for_pid(std::process::id())
    }

    /// This process, claiming a job on behalf of a runner thread.
    pub fn current_runner() -> Self {
        Self {
            in_process: true,
            ..Self::current()
        }
    }

    fn parse(content: &str) -> Option<Self> {
        let mut parts = content.split_whitespace();
        let pid = parts.next()?.parse().ok()?;
        let mut record = Self {
            pid,
            start_ticks: None,
            in_process: false,
        };
        for part in parts {
            if part == IN_PROCESS {
                record.in_process = true;
            } else if let Ok(ticks) = part.parse() {
                record.start_ticks = Some(ticks);
            }
        }
        Some(record)
    }

    fn render(&self) -> String {
        let mut line = self.pid.to_string();
        if let Some(ticks) = self.start_ticks {
            line.push_str(&format!(" {ticks}"));
        }
        if self.in_process {
            line.push(' ');
            line.push_str(IN_PROCESS);
        }
        line
    }

    /// Same process, ignoring how it drives the job.
    pub fn same_process(&self, other: &PidRecord) -> bool {
        self.pid == other.pid && self.start_ticks == other.start_ticks
    }

    /// Read a pid file. Missing or unparseable files are `None`.
    pub fn read(path: &Path) -> Option<Self> {
        fs::read_to_string(path).ok().and_then(|c| Self::parse(&c))
    }

    /// Write the pid file via temp file and rename, replacing any holder.
    pub fn write(&self, path: &Path) -> io::Result<()> {
        let tmp = sibling(path, "tmp");
        self.write_file(&tmp)?;
        fs::rename(&tmp, path)
    }

    fn write_file(&self, path: &Path) -> io::Result<()> {
        let mut file = fs::File::create(path)?;
        writeln!(file, "{}", self.render())?;
        file.sync_all()
    }

    /// Claim the pid file at `path` for this record.
    ///
    /// The complete record is hard-linked into place, which fails when the
    /// file exists. An existing file is replaced only after its process
    /// fails the liveness probe. Claimants hold an exclusive lock on a
    /// sidecar file for the few milliseconds this takes, so of two
    /// concurrent claimants exactly one acquires the file. Re-claiming a
    /// file this process already holds succeeds.
    pub fn claim(&self, path: &Path) -> io::Result<Claim> {
        let lock = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path.with_extension("pid.lock"))?;
        lock.lock_exclusive()?;

        let claim = match self.link_new(path) {
            Ok(()) => Claim::Acquired,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => match Self::read(path) {
                Some(other) if other.same_process(self) => Claim::Acquired,
                Some(other) if other.is_alive() => Claim::Busy(other),
                stale => {
                    tracing::info!(
                        path = %path.display(),
                        pid = ?stale.map(|r| r.pid),
                        "replacing stale pid file"
                    );
                    fs::remove_file(path)?;
                    self.link_new(path)?;
                    Claim::Acquired
                }
            },
            Err(e) => return Err(e),
        };
        // Closing the file drops the lock as well.
        FileExt::unlock(&lock)?;
        Ok(claim)
    }

    /// Remove the pid file if it still holds this process's claim.
    pub fn release(&self, path: &Path) {
        if Self::read(path).is_some_and(|held| held.same_process(self)) {
            remove(path);
        }
    }

    fn link_new(&self, path: &Path) -> io::Result<()> {
        let tmp = sibling(path, "claim");
        self.write_file(&tmp)?;
        let linked = fs::hard_link(&tmp, path);
        remove(&tmp);
        linked
    }

    /// Whether the recorded process is still running (and is the same
    /// process that was recorded).
    pub fn is_alive(&self) -> bool {
        match proc_stat(self.pid) {
            Some(stat) => {
                let same = match self.start_ticks {
                    Some(recorded) => recorded == stat.start_ticks,
                    None => true,
                };
                stat.state != 'Z' && same
            }
            None if Path::new("/proc/self/stat").exists() => false,
            None => process_exists(self.pid),
        }
    }
}

/// Unique scratch path next to `path`.
fn sibling(path: &Path, tag: &str) -> PathBuf {
    let seq = SIBLING_SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_extension(format!("pid.{tag}.{}.{seq}", std::process::id()))
}

struct ProcStat {
    state: char,
    start_ticks: u64,
}

fn proc_stat(pid: u32) -> Option<ProcStat> {
    let content = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_proc_stat(&content)
}

/// Fields after the parenthesised command name start at field 3 (state);
/// start time is field 22.
fn parse_proc_stat(content: &str) -> Option<ProcStat> {
    let (_, rest) = content.rsplit_once(')')?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let state = fields.first()?.chars().next()?;
    let start_ticks = fields.get(19)?.parse().ok()?;
    Some(ProcStat { state, start_ticks })
}

/// Remove a pid file, ignoring absence.
pub fn remove(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove pid file");
        }
    }
}

/// Execute kill command with the given signal and target
fn kill_signal(signal: &str, target: &str) -> bool {
    Command::new("kill")
        .args([signal, "--", target])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Check if a process with the given PID exists
pub fn process_exists(pid: u32) -> bool {
    kill_signal("-0", &pid.to_string())
}

/// Signal the worker's process group, falling back to the process itself.
/// Workers lead their own group, so stage commands receive the signal too.
fn signal_worker(signal: &str, pid: u32) -> bool {
    kill_signal(signal, &format!("-{pid}")) || kill_signal(signal, &pid.to_string())
}

/// Poll `exited` until it returns true or `timeout` elapses.
pub fn wait_until(timeout: Duration, poll: Duration, mut exited: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    loop {
        if exited() {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        std::thread::sleep(poll);
    }
}

/// SIGTERM, wait up to `timeout`, then SIGKILL. `exited` reports whether
/// the process is gone. Returns true once it is.
pub fn terminate(
    pid: u32,
    timeout: Duration,
    poll: Duration,
    mut exited: impl FnMut() -> bool,
) -> bool {
    signal_worker("-15", pid);
    if wait_until(timeout, poll, &mut exited) {
        return true;
    }
    tracing::warn!(pid, "worker ignored SIGTERM, sending SIGKILL");
    signal_worker("-9", pid);
    wait_until(timeout, poll, exited)
}

/// Worker liveness read from the job's pid file.
#[derive(Debug, Clone, Copy, Default)]
pub struct PidLiveness;

impl WorkerLiveness for PidLiveness {
    fn is_running(&self, job: &Job) -> bool {
        PidRecord::read(&pid_path(&job.dir)).is_some_and(|record| record.is_alive())
    }
}

#[cfg(test)]
#[path = "pidfile_tests.rs"]
mod tests;
