//! Agent and view processes: spawning, pipes and reaping.

use std::{
    fmt,
    fs::File,
    io,
    path::Path,
    process::{Command, Stdio},
};

use nix::{
    errno::Errno,
    fcntl::OFlag,
    sys::{
        signal::{kill, Signal},
        wait::{wait, waitpid, WaitStatus},
    },
    unistd::{pipe2, Pid},
};
use tracing::{debug, info, warn};

use crate::{error::ArenaError, protocol::child_args, session::{SessionId, SESSION_ENV_VAR}};

/// A running agent and the read end of its move pipe.
#[derive(Debug)]
pub(crate) struct AgentProcess {
    pub pid: Pid,
    pub pipe: File,
}

fn command(path: &Path, session: &SessionId, width: u16, height: u16) -> Command {
    let mut cmd = Command::new(path);
    cmd.args(child_args(width, height))
        .env(SESSION_ENV_VAR, session.as_str())
        .stdin(Stdio::null());
    cmd
}

fn spawn_error(path: &Path, source: io::Error) -> ArenaError {
    ArenaError::ChildSpawn {
        path: path.display().to_string(),
        source,
    }
}

/// Starts the agent at `path` with its stdout on a fresh pipe.
pub(crate) fn spawn_agent(
    path: &Path,
    session: &SessionId,
    width: u16,
    height: u16,
) -> Result<AgentProcess, ArenaError> {
    // Both ends are close-on-exec; the child only gets the write end as its stdout.
    let (read_end, write_end) =
        pipe2(OFlag::O_CLOEXEC).map_err(|e| spawn_error(path, e.into()))?;
    let child = command(path, session, width, height)
        .stdout(Stdio::from(write_end))
        .spawn()
        .map_err(|e| spawn_error(path, e))?;
    let pid = Pid::from_raw(child.id() as libc::pid_t);
    debug!(path = %path.display(), %pid, "agent spawned");
    Ok(AgentProcess {
        pid,
        pipe: File::from(read_end),
    })
}

/// Starts the view at `path`, sharing the orchestrator's stdout.
pub(crate) fn spawn_view(
    path: &Path,
    session: &SessionId,
    width: u16,
    height: u16,
) -> Result<Pid, ArenaError> {
    let child = command(path, session, width, height)
        .spawn()
        .map_err(|e| spawn_error(path, e))?;
    let pid = Pid::from_raw(child.id() as libc::pid_t);
    debug!(path = %path.display(), %pid, "view spawned");
    Ok(pid)
}

/// Kills and reaps children started before a setup failure.
pub(crate) fn kill_all(pids: impl IntoIterator<Item = Pid>) {
    for pid in pids {
        if let Err(e) = kill(pid, Signal::SIGKILL) {
            warn!(%pid, "could not kill child: {e}");
            continue;
        }
        if let Err(e) = waitpid(pid, None) {
            warn!(%pid, "could not reap child: {e}");
        }
    }
}

/// Which child a reaped process was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildRole {
    View,
    /// Agent controlling the player at this index.
    Agent(usize),
}

/// How a child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Code(i32),
    Signal(Signal),
}

/// One reaped child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    pub role: ChildRole,
    pub pid: Pid,
    pub status: ExitKind,
}

impl fmt::Display for ChildExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            ChildRole::View => write!(f, "View ({})", self.pid)?,
            ChildRole::Agent(index) => write!(f, "Player {} ({})", index + 1, self.pid)?,
        }
        match self.status {
            ExitKind::Code(code) => write!(f, " exited ({code})"),
            ExitKind::Signal(signal) => write!(f, " killed by {}", signal.as_str()),
        }
    }
}

/// Orders exit reports: agents reaped while the view still runs are held back until it
/// is gone, so nothing is printed over a live board.
#[derive(Debug, Default)]
pub(crate) struct ExitLog {
    view_running: bool,
    deferred: Vec<ChildExit>,
    reports: Vec<ChildExit>,
}

impl ExitLog {
    pub fn new(has_view: bool) -> Self {
        ExitLog {
            view_running: has_view,
            ..Default::default()
        }
    }

    pub fn record(&mut self, exit: ChildExit) {
        match exit.role {
            ChildRole::Agent(_) if self.view_running => self.deferred.push(exit),
            ChildRole::View => {
                self.reports.push(exit);
                self.view_running = false;
                self.reports.append(&mut self.deferred);
            }
            ChildRole::Agent(_) => self.reports.push(exit),
        }
    }

    pub fn into_reports(mut self) -> Vec<ChildExit> {
        self.reports.append(&mut self.deferred);
        self.reports
    }
}

/// Waits for every child of this process, in arrival order.
pub(crate) fn reap_children(view: Option<Pid>, agents: &[Pid]) -> Vec<ChildExit> {
    let mut log = ExitLog::new(view.is_some());
    loop {
        let (pid, status) = match wait() {
            Ok(WaitStatus::Exited(pid, code)) => (pid, ExitKind::Code(code)),
            Ok(WaitStatus::Signaled(pid, signal, _)) => (pid, ExitKind::Signal(signal)),
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => break,
            Err(e) => {
                warn!("waiting for children failed: {e}");
                break;
            }
        };
        let role = if Some(pid) == view {
            ChildRole::View
        } else if let Some(index) = agents.iter().position(|&p| p == pid) {
            ChildRole::Agent(index)
        } else {
            debug!(%pid, "reaped an unknown child");
            continue;
        };
        let exit = ChildExit { role, pid, status };
        info!("{exit}");
        log.record(exit);
    }
    log.into_reports()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit(role: ChildRole, pid: i32) -> ChildExit {
        ChildExit {
            role,
            pid: Pid::from_raw(pid),
            status: ExitKind::Code(0),
        }
    }

    #[test]
    fn agent_reports_wait_for_the_view() {
        let mut log = ExitLog::new(true);
        log.record(exit(ChildRole::Agent(1), 11));
        log.record(exit(ChildRole::Agent(0), 10));
        log.record(exit(ChildRole::View, 20));
        log.record(exit(ChildRole::Agent(2), 12));
        let roles: Vec<_> = log.into_reports().into_iter().map(|e| e.role).collect();
        assert_eq!(
            roles,
            vec![
                ChildRole::View,
                ChildRole::Agent(1),
                ChildRole::Agent(0),
                ChildRole::Agent(2)
            ]
        );
    }

    #[test]
    fn without_a_view_reports_keep_arrival_order() {
        let mut log = ExitLog::new(false);
        log.record(exit(ChildRole::Agent(1), 11));
        log.record(exit(ChildRole::Agent(0), 10));
        let pids: Vec<_> = log.into_reports().into_iter().map(|e| e.pid.as_raw()).collect();
        assert_eq!(pids, vec![11, 10]);
    }

    #[test]
    fn exit_lines() {
        assert_eq!(exit(ChildRole::Agent(0), 42).to_string(), "Player 1 (42) exited (0)");
        let killed = ChildExit {
            role: ChildRole::View,
            pid: Pid::from_raw(7),
            status: ExitKind::Signal(Signal::SIGPIPE),
        };
        assert_eq!(killed.to_string(), "View (7) killed by SIGPIPE");
    }

    #[test]
    fn spawning_a_missing_executable_fails() {
        let session = SessionId::new("children-missing").unwrap();
        let err = spawn_agent(Path::new("/nonexistent/agent"), &session, 3, 3).unwrap_err();
        assert!(matches!(err, ArenaError::ChildSpawn { .. }));
    }
}
