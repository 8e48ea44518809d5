use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::ipc::{line_channel, pump_lines, MessageChannel};
use crate::models::{ControlMessage, WorkerId, WorkerRecord};
use crate::orchestrator::Orchestrator;

/// How long a worker gets to save its rooms after its control pipe closes.
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

/// Spawned worker processes and their supervisor tasks.
pub struct WorkerFleet {
    shutdown: watch::Sender<bool>,
    supervisors: Vec<JoinHandle<()>>,
}

impl WorkerFleet {
    /// Close every worker's control pipe and wait for the processes to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for supervisor in self.supervisors {
            let _ = supervisor.await;
        }
        info!("All workers stopped");
    }
}

/// Fork one worker process per slot: this same binary with `ROLE=worker`.
pub fn spawn_workers(orchestrator: &Arc<Orchestrator>, config: &Config) -> io::Result<WorkerFleet> {
    let exe = std::env::current_exe()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let count = config.effective_worker_count();
    let mut supervisors = Vec::with_capacity(count);

    for index in 0..count {
        let worker_id = WorkerId::try_from(index).map_err(io::Error::other)?;
        let port = u16::try_from(index)
            .ok()
            .and_then(|offset| config.worker_base_port.checked_add(offset))
            .ok_or_else(|| io::Error::other(format!("no port left for worker {}", worker_id)))?;

        let mut cmd = Command::new(&exe);
        cmd.kill_on_drop(true)
            .env("ROLE", "worker")
            .env("WORKER_ID", worker_id.to_string())
            .env("WORKER_PORT", port.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("worker stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("worker stdout was not captured"))?;

        let channel = line_channel::<ControlMessage, _>(stdin);
        orchestrator.attach_worker(WorkerRecord::new(worker_id, config.public_host.clone(), port), channel.clone());
        info!("Spawned worker {} (pid {:?}) on port {}", worker_id, child.id(), port);

        supervisors.push(tokio::spawn(supervise(
            orchestrator.clone(),
            worker_id,
            child,
            stdout,
            channel,
            shutdown_rx.clone(),
        )));
    }

    Ok(WorkerFleet {
        shutdown: shutdown_tx,
        supervisors,
    })
}

async fn supervise(
    orchestrator: Arc<Orchestrator>,
    worker_id: WorkerId,
    mut child: Child,
    stdout: ChildStdout,
    channel: MessageChannel<ControlMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    let pump = {
        let channel = channel.clone();
        tokio::spawn(async move { pump_lines(stdout, &channel).await })
    };

    let exited = tokio::select! {
        _ = shutdown.changed() => false,
        status = child.wait() => {
            match status {
                Ok(status) => error!("Worker {} exited unexpectedly: {}", worker_id, status),
                Err(e) => error!("Waiting on worker {} failed: {}", worker_id, e),
            }
            true
        }
    };

    // Dropping the last channel handle closes the worker's stdin.
    pump.abort();
    orchestrator.remove_worker(worker_id);
    drop(channel);

    if exited {
        return;
    }
    match tokio::time::timeout(WORKER_SHUTDOWN_GRACE, child.wait()).await {
        Ok(_) => info!("Worker {} stopped", worker_id),
        Err(_) => {
            warn!("Worker {} did not stop in time, killing it", worker_id);
            let _ = child.kill().await;
        }
    }
}
