use anyhow::{Context, Result, bail};
use std::path::Path;
use tokio::{
    process::{Child, Command},
    sync::{mpsc, watch},
};
use tracing::{debug, warn};

use crate::domain::value_objects::{enums::job_statuses::JobStatus, jobs::JobExit};

/// A process spawned by this instance; the child is owned by a waiter task.
#[derive(Clone)]
pub struct LiveProcess {
    pid: u32,
    exit: watch::Receiver<Option<JobExit>>,
    kill: mpsc::Sender<()>,
}

impl LiveProcess {
    pub fn attach(pid: u32, mut child: Child) -> Self {
        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            let exit = tokio::select! {
                status = child.wait() => JobExit {
                    code: status.ok().and_then(|status| status.code()),
                    killed: false,
                },
                Some(()) = kill_rx.recv() => {
                    if let Err(err) = child.kill().await {
                        warn!(pid, error = %err, "job_process: failed to kill child");
                    }
                    JobExit { code: None, killed: true }
                }
            };
            debug!(pid, code = ?exit.code, killed = exit.killed, "job_process: child exited");
            let _ = exit_tx.send(Some(exit));
        });

        Self {
            pid,
            exit: exit_rx,
            kill: kill_tx,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn status(&self) -> JobStatus {
        if self.exit.borrow().is_some() {
            JobStatus::Stopped
        } else {
            JobStatus::Running
        }
    }

    pub async fn wait(&self) -> Result<JobExit> {
        let mut exit = self.exit.clone();
        let outcome = exit
            .wait_for(|outcome| outcome.is_some())
            .await
            .context("process waiter went away")?;
        match *outcome {
            Some(outcome) => Ok(outcome),
            None => bail!("process {} has no exit status", self.pid),
        }
    }

    pub async fn kill(&self) -> Result<JobExit> {
        if self.status() == JobStatus::Running {
            // A full channel means a kill is already on its way.
            let _ = self.kill.try_send(());
        }
        self.wait().await
    }
}

/// A pid reloaded from disk after a restart; only the OS knows about it.
///
/// `bin` is the binary the job was started with. When present, a pid that now
/// belongs to another program counts as stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalPid {
    pub pid: u32,
    pub bin: Option<String>,
}

impl ExternalPid {
    pub async fn status(&self) -> JobStatus {
        let expected = self.bin.as_deref().and_then(program_name);
        if process_is_running(self.pid, expected.as_deref()).await {
            JobStatus::Running
        } else {
            JobStatus::Stopped
        }
    }

    pub async fn kill(&self) -> Result<()> {
        let output = terminate_command(self.pid)
            .output()
            .await
            .with_context(|| format!("failed to run terminate command for pid {}", self.pid))?;
        if !output.status.success() {
            warn!(
                pid = self.pid,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "job_process: terminate command failed"
            );
        }
        Ok(())
    }
}

#[derive(Clone)]
pub enum JobProcess {
    Live(LiveProcess),
    External(ExternalPid),
}

impl JobProcess {
    pub fn pid(&self) -> u32 {
        match self {
            JobProcess::Live(live) => live.pid(),
            JobProcess::External(external) => external.pid,
        }
    }

    pub async fn status(&self) -> JobStatus {
        match self {
            JobProcess::Live(live) => live.status(),
            JobProcess::External(external) => external.status().await,
        }
    }

    pub async fn kill(&self) -> Result<()> {
        match self {
            JobProcess::Live(live) => live.kill().await.map(|_| ()),
            JobProcess::External(external) => external.kill().await,
        }
    }
}

/// Asks the OS process table whether `pid` exists and, when `expected` is
/// given, still runs that program. Any failure counts as not running.
pub async fn process_is_running(pid: u32, expected: Option<&str>) -> bool {
    match list_process_command(pid).output().await {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let running = listing_matches(&stdout, pid, expected);
            if !running && expected.is_some() && listing_matches(&stdout, pid, None) {
                warn!(pid, expected, "job_process: pid was reused by another program");
            }
            running
        }
        Err(err) => {
            debug!(pid, error = %err, "job_process: process listing failed; assuming stopped");
            false
        }
    }
}

/// File stem of a binary path, lowercased: `/usr/bin/streamlink` -> `streamlink`.
fn program_name(bin: &str) -> Option<String> {
    Path::new(bin)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_ascii_lowercase())
        .filter(|stem| !stem.is_empty())
}

fn listing_matches(listing: &str, pid: u32, expected: Option<&str>) -> bool {
    let pid = pid.to_string();
    listing.lines().any(|line| {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(position) = tokens.iter().position(|token| *token == pid) else {
            return false;
        };
        let Some(expected) = expected else {
            return true;
        };
        // ps prints `<pid> <command>`, tasklist prints `<image> <pid> ...`.
        let reported = if position == 0 {
            tokens[1..].join(" ")
        } else {
            tokens[..position].join(" ")
        };
        program_name(&reported).is_some_and(|reported| names_match(&reported, expected))
    })
}

/// Linux truncates the command name to 15 bytes.
fn names_match(reported: &str, expected: &str) -> bool {
    reported == expected || (reported.len() >= 15 && expected.starts_with(reported))
}

#[cfg(unix)]
fn list_process_command(pid: u32) -> Command {
    let mut command = Command::new("ps");
    command
        .arg("-p")
        .arg(pid.to_string())
        .arg("-o")
        .arg("pid=")
        .arg("-o")
        .arg("comm=");
    command
}

#[cfg(windows)]
fn list_process_command(pid: u32) -> Command {
    let mut command = Command::new("tasklist");
    command.arg("/FI").arg(format!("PID eq {}", pid)).arg("/NH");
    command
}

#[cfg(unix)]
fn terminate_command(pid: u32) -> Command {
    let mut command = Command::new("kill");
    command.arg("-TERM").arg(pid.to_string());
    command
}

#[cfg(windows)]
fn terminate_command(pid: u32) -> Command {
    let mut command = Command::new("taskkill");
    command.arg("/PID").arg(pid.to_string()).arg("/F");
    command
}
