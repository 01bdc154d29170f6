//! A single Task Executor process and the reader thread that forwards its
//! responses back to the pool coordinator.

use std::io::BufWriter;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;

use crossbeam_channel::Sender;
use tracing::warn;

use crate::config::ExecutorSpec;
use crate::core::error::ExecutorError;
use crate::core::executor::{read_frame, write_frame, ExecutorRequest, ExecutorResponse};
use crate::core::task::TaskErrorKind;

use super::coordinator::PoolEvent;
use super::WorkerId;

/// Owns one executor subprocess and the pipe used to send it requests.
pub(super) struct WorkerHandle {
    pub(super) id: WorkerId,
    child: Child,
    stdin: BufWriter<ChildStdin>,
}

impl WorkerHandle {
    /// Spawn a fresh executor process and its response-forwarding reader thread.
    pub(super) fn spawn(id: WorkerId, spec: &ExecutorSpec, event_tx: Sender<PoolEvent>) -> Result<Self, ExecutorError> {
        let (program, args) = spec.resolve().map_err(|e| ExecutorError::Spawn(std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string())))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(ExecutorError::Spawn)?;

        let stdin = child.stdin.take().ok_or(ExecutorError::ProcessExited)?;
        let stdout = child.stdout.take().ok_or(ExecutorError::ProcessExited)?;

        thread::Builder::new()
            .name(format!("regex-pool-reader-{id}"))
            .spawn(move || reader_loop(id, stdout, event_tx))
            .expect("failed to spawn worker reader thread");

        Ok(Self { id, child, stdin: BufWriter::new(stdin) })
    }

    /// Write one framed request to the worker's stdin.
    pub(super) fn send(&mut self, request: &ExecutorRequest) -> Result<(), ExecutorError> {
        write_frame(&mut self.stdin, request).map_err(ExecutorError::Write)
    }

    /// Forcibly terminate the process and reap it. Called unilaterally by the
    /// pool on timeout, crash, idle scale-down, or shutdown; the executed
    /// regex never gets a say.
    pub(super) fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn reader_loop(id: WorkerId, mut stdout: impl std::io::Read, event_tx: Sender<PoolEvent>) {
    loop {
        match read_frame::<_, ExecutorResponse>(&mut stdout) {
            Ok(Some(response)) => {
                let result = if let Some(error) = response.error {
                    crate::core::task::TaskResult::Err(TaskErrorKind::InvalidRegex(error))
                } else {
                    crate::core::task::TaskResult::Ok { text: response.result, performance_ms: response.performance_ms }
                };
                if event_tx.send(PoolEvent::WorkerCompleted { worker_id: id, result }).is_err() {
                    break;
                }
            }
            Ok(None) => {
                // Clean EOF: the pool dropped our stdin and killed us, or the process exited on its own.
                let _ = event_tx.send(PoolEvent::WorkerCrashed { worker_id: id, detail: "executor process closed its output".into() });
                break;
            }
            Err(e) => {
                warn!(worker_id = id, error = %e, "executor reader thread: read failed");
                let _ = event_tx.send(PoolEvent::WorkerCrashed { worker_id: id, detail: e.to_string() });
                break;
            }
        }
    }
}
