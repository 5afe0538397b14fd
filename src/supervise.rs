//! Worker process supervision.
//!
//! The pool owns every spawned worker for one session. Each worker gets a
//! monitor task that reaps its exit and publishes state transitions over
//! a watch channel:
//!
//! ```text
//! NotStarted -> Running -> Exited(code) | Killed | Failed(reason)
//! ```
//!
//! An exit that happens before `stop_all` is reported on the pool's event
//! channel; the session treats it as fatal. `stop_all` is idempotent and
//! total: graceful signal, bounded grace period, then a hard kill, for
//! every worker that ever started, in any order.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const DEFAULT_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    NotStarted,
    Running,
    Exited(i32),
    Killed,
    Failed(String),
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerState::NotStarted | WorkerState::Running)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            WorkerState::NotStarted => write!(f, "not started"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Exited(code) => write!(f, "code {code}"),
            WorkerState::Killed => write!(f, "killed by signal"),
            WorkerState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Emitted when a worker leaves Running without being asked to stop.
#[derive(Debug, Clone)]
pub struct WorkerEvent {
    pub index: usize,
    pub tag: String,
    pub status: String,
}

/// Everything needed to spawn one worker.
#[derive(Debug)]
pub struct WorkerSpec {
    /// "hop 2 (Hysteria2)" style label carried into events and logs.
    pub tag: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

struct Worker {
    tag: String,
    state_rx: watch::Receiver<WorkerState>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

pub struct ProcessPool {
    grace: Duration,
    workers: Vec<Worker>,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl ProcessPool {
    pub fn new(grace: Duration) -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                grace,
                workers: vec![],
                event_tx,
            },
            event_rx,
        )
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Spawns a worker and begins monitoring it. The io error from a
    /// failed spawn (missing or non-executable binary) is returned for
    /// the caller to wrap with hop context.
    pub fn start(&mut self, spec: WorkerSpec) -> std::io::Result<usize> {
        let index = self.workers.len();

        debug!(
            "Starting worker {} ({:?} {:?})",
            spec.tag, spec.program, spec.args
        );

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in spec.env.iter() {
            command.env(key, value);
        }

        let child = command.spawn()?;
        info!("Started worker {} (pid {:?})", spec.tag, child.id());

        let (state_tx, state_rx) = watch::channel(WorkerState::Running);
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(monitor(
            index,
            spec.tag.clone(),
            child,
            state_tx,
            stop_rx,
            self.event_tx.clone(),
            self.grace,
        ));

        self.workers.push(Worker {
            tag: spec.tag,
            state_rx,
            stop_tx: Some(stop_tx),
            task: Some(task),
        });
        Ok(index)
    }

    /// Non-blocking state snapshot for one worker.
    pub fn state(&self, index: usize) -> WorkerState {
        match self.workers.get(index) {
            Some(worker) => worker.state_rx.borrow().clone(),
            None => WorkerState::NotStarted,
        }
    }

    pub fn states(&self) -> Vec<(String, WorkerState)> {
        self.workers
            .iter()
            .map(|w| (w.tag.clone(), w.state_rx.borrow().clone()))
            .collect()
    }

    /// Blocks until the worker reaches a terminal state.
    pub async fn wait(&mut self, index: usize) -> WorkerState {
        let worker = match self.workers.get_mut(index) {
            Some(worker) => worker,
            None => return WorkerState::NotStarted,
        };
        loop {
            let state = worker.state_rx.borrow().clone();
            if state.is_terminal() {
                return state;
            }
            if worker.state_rx.changed().await.is_err() {
                return worker.state_rx.borrow().clone();
            }
        }
    }

    /// Stops every tracked worker: graceful signal, bounded wait, then a
    /// hard kill. Safe to call repeatedly; already-stopped workers are
    /// skipped.
    pub async fn stop_all(&mut self) {
        for worker in self.workers.iter_mut() {
            if let Some(stop_tx) = worker.stop_tx.take() {
                // A send error just means the monitor already finished.
                let _ = stop_tx.send(());
            }
        }
        for worker in self.workers.iter_mut() {
            if let Some(task) = worker.task.take() {
                if task.await.is_err() {
                    warn!("Monitor task for {} panicked", worker.tag);
                }
            }
        }
    }
}

async fn monitor(
    index: usize,
    tag: String,
    mut child: tokio::process::Child,
    state_tx: watch::Sender<WorkerState>,
    mut stop_rx: oneshot::Receiver<()>,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
    grace: Duration,
) {
    tokio::select! {
        status = child.wait() => {
            let state = match status {
                Ok(status) => exit_state(status),
                Err(e) => WorkerState::Failed(e.to_string()),
            };
            warn!("Worker {tag} exited unexpectedly: {state}");
            let _ = event_tx.send(WorkerEvent {
                index,
                tag,
                status: state.to_string(),
            });
            let _ = state_tx.send(state);
        }
        _ = &mut stop_rx => {
            terminate(&mut child);
            let state = match timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!("Worker {tag} stopped: {}", exit_state(status));
                    exit_state(status)
                }
                Ok(Err(e)) => {
                    warn!("Worker {tag} wait failed: {e}");
                    let _ = child.kill().await;
                    WorkerState::Killed
                }
                Err(_) => {
                    warn!("Worker {tag} did not stop within {grace:?}, killing");
                    let _ = child.kill().await;
                    WorkerState::Killed
                }
            };
            let _ = state_tx.send(state);
        }
    }
}

fn exit_state(status: std::process::ExitStatus) -> WorkerState {
    match status.code() {
        Some(code) => WorkerState::Exited(code),
        None => WorkerState::Killed,
    }
}

#[cfg(unix)]
fn terminate(child: &mut tokio::process::Child) {
    match child.id() {
        Some(pid) => unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        },
        None => {}
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut tokio::process::Child) {
    let _ = child.start_kill();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sleep_spec(tag: &str) -> WorkerSpec {
        WorkerSpec {
            tag: tag.to_string(),
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), "sleep 30".to_string()],
            env: vec![],
        }
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (mut pool, _events) = ProcessPool::new(DEFAULT_GRACE);
        let index = pool.start(sleep_spec("hop 1 (test)")).unwrap();
        assert_eq!(pool.state(index), WorkerState::Running);

        pool.stop_all().await;
        assert!(pool.state(index).is_terminal());
    }

    #[tokio::test]
    async fn test_stop_all_is_idempotent() {
        let (mut pool, _events) = ProcessPool::new(DEFAULT_GRACE);
        pool.start(sleep_spec("hop 1 (test)")).unwrap();
        pool.start(sleep_spec("hop 2 (test)")).unwrap();

        pool.stop_all().await;
        pool.stop_all().await;

        for (_, state) in pool.states() {
            assert!(state.is_terminal(), "no worker may remain running");
            assert_ne!(state, WorkerState::Running);
        }
    }

    #[tokio::test]
    async fn test_spawn_error_for_missing_binary() {
        let (mut pool, _events) = ProcessPool::new(DEFAULT_GRACE);
        let spec = WorkerSpec {
            tag: "hop 1 (test)".to_string(),
            program: PathBuf::from("/nonexistent/worker-binary"),
            args: vec![],
            env: vec![],
        };
        assert!(pool.start(spec).is_err());
        assert!(pool.is_empty());
        // stop_all after a failed start is still fine.
        pool.stop_all().await;
    }

    #[tokio::test]
    async fn test_unexpected_exit_reported() {
        let (mut pool, mut events) = ProcessPool::new(DEFAULT_GRACE);
        let index = pool
            .start(WorkerSpec {
                tag: "hop 1 (test)".to_string(),
                program: PathBuf::from("/bin/sh"),
                args: vec!["-c".to_string(), "exit 3".to_string()],
                env: vec![],
            })
            .unwrap();

        let event = events.recv().await.expect("exit event");
        assert_eq!(event.index, index);
        assert_eq!(event.tag, "hop 1 (test)");
        assert_eq!(event.status, "code 3");
        assert_eq!(pool.wait(index).await, WorkerState::Exited(3));
    }

    #[tokio::test]
    async fn test_wait_blocks_until_exit() {
        let (mut pool, _events) = ProcessPool::new(DEFAULT_GRACE);
        let index = pool
            .start(WorkerSpec {
                tag: "hop 1 (test)".to_string(),
                program: PathBuf::from("/bin/sh"),
                args: vec!["-c".to_string(), "sleep 0.1; exit 7".to_string()],
                env: vec![],
            })
            .unwrap();
        assert_eq!(pool.wait(index).await, WorkerState::Exited(7));
    }

    #[tokio::test]
    async fn test_env_passed_to_worker() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let (mut pool, _events) = ProcessPool::new(DEFAULT_GRACE);
        let index = pool
            .start(WorkerSpec {
                tag: "hop 1 (test)".to_string(),
                program: PathBuf::from("/bin/sh"),
                args: vec![
                    "-c".to_string(),
                    format!("printf %s \"$MIERU_CONFIG_JSON_FILE\" > {}", out.display()),
                ],
                env: vec![(
                    "MIERU_CONFIG_JSON_FILE".to_string(),
                    "/tmp/mieru.json".to_string(),
                )],
            })
            .unwrap();
        pool.wait(index).await;
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "/tmp/mieru.json");
    }
}
