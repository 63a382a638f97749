use std::future::Future;
use std::sync::Mutex;

use log::{debug, error};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::errors::{ConnectorError, ConnectorResult};
use crate::source::SourceState;

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Slot {
    state: SourceState,
    running: Option<Running>,
}

/// Owns the single background task of a data source and its shutdown signal.
pub struct Worker {
    name: &'static str,
    slot: Mutex<Slot>,
}

impl Worker {
    pub fn new(name: &'static str) -> Self {
        Worker { name, slot: Mutex::new(Slot { state: SourceState::Idle, running: None }) }
    }

    /// Spawns `task` with a shutdown receiver. Fails if a task is already running.
    pub fn spawn<F, Fut>(&self, task: F) -> ConnectorResult<()>
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.lock();
        if slot.running.is_some() {
            return Err(ConnectorError::AlreadyRunning);
        }
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(task(rx));
        slot.running = Some(Running { shutdown, handle });
        slot.state = SourceState::Running;
        Ok(())
    }

    /// Signals the task and waits for it to finish. Idempotent.
    pub async fn stop(&self) {
        let running = {
            let mut slot = self.lock();
            let running = slot.running.take();
            if running.is_some() {
                slot.state = SourceState::Stopped;
            }
            running
        };
        let Some(running) = running else {
            debug!("{}: stop requested but not running", self.name);
            return;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            error!("{}: worker ended abnormally: {}", self.name, e);
        }
    }

    pub fn state(&self) -> SourceState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        match self.slot.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Resolves once shutdown has been signalled or the sender is gone.
pub async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn stop_joins_task_and_is_idempotent() {
        let worker = Worker::new("test");
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        worker
            .spawn(move |mut rx| async move {
                shutdown_signalled(&mut rx).await;
                flag.store(true, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(worker.state(), SourceState::Running);
        assert!(matches!(worker.spawn(|_| async {}), Err(ConnectorError::AlreadyRunning)));

        worker.stop().await;
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(worker.state(), SourceState::Stopped);
        worker.stop().await;
        assert_eq!(worker.state(), SourceState::Stopped);
    }

    #[tokio::test]
    async fn stop_before_start_is_noop() {
        let worker = Worker::new("idle");
        worker.stop().await;
        assert_eq!(worker.state(), SourceState::Idle);
    }
}
