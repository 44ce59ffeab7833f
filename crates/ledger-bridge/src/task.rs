//! Background task lifecycle
//!
//! Each periodic loop runs as one tokio task that watches a stop signal
//! between steps. Stopping lets the current step finish, then joins.

use crate::error::AlreadyRunning;
use parking_lot::Mutex;
use std::future::Future;
use tokio::{sync::watch, task::JoinHandle};

/// Receiving side of a stop request
#[derive(Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    /// Check without waiting
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once stop has been requested (or the owner went away)
    pub async fn stopped(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// A spawned loop together with its stop switch
pub struct BackgroundTask {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Spawn `body` on the current tokio runtime
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, rx) = watch::channel(false);
        let handle = tokio::spawn(body(StopSignal { rx }));
        Self {
            name,
            stop_tx,
            handle,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Request stop and wait for the loop to exit
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                tracing::error!("{} task panicked", self.name);
            }
        }
        tracing::debug!("{} task stopped", self.name);
    }
}

/// Holds at most one running task for a component
#[derive(Default)]
pub struct TaskSlot {
    task: Mutex<Option<BackgroundTask>>,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a task unless one is already alive.
    ///
    /// A task whose loop already exited on its own counts as stopped.
    pub fn start_with<F>(&self, name: &'static str, spawn: F) -> Result<(), AlreadyRunning>
    where
        F: FnOnce() -> BackgroundTask,
    {
        let mut slot = self.task.lock();
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return Err(AlreadyRunning(name));
        }
        *slot = Some(spawn());
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop the task if there is one. Idempotent.
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::time::Duration;

    fn ticking_task(counter: Arc<AtomicUsize>) -> BackgroundTask {
        BackgroundTask::spawn("ticker", move |mut stop| async move {
            let mut interval = tokio::time::interval(Duration::from_millis(10));
            loop {
                tokio::select! {
                    biased;
                    _ = stop.stopped() => break,
                    _ = interval.tick() => {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_fails() {
        let slot = TaskSlot::new();
        let counter = Arc::new(AtomicUsize::new(0));

        slot.start_with("ticker", || ticking_task(counter.clone())).unwrap();
        let err = slot
            .start_with("ticker", || ticking_task(counter.clone()))
            .unwrap_err();
        assert_eq!(err, AlreadyRunning("ticker"));

        slot.stop().await;
        assert!(!slot.is_running());

        // Restart after stop is allowed
        slot.start_with("ticker", || ticking_task(counter.clone())).unwrap();
        slot.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_after_stop() {
        let slot = TaskSlot::new();
        let counter = Arc::new(AtomicUsize::new(0));
        slot.start_with("ticker", || ticking_task(counter.clone())).unwrap();

        tokio::time::sleep(Duration::from_millis(55)).await;
        slot.stop().await;
        let after_stop = counter.load(Ordering::SeqCst);
        assert!(after_stop > 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);

        // Second stop is a no-op
        slot.stop().await;
    }

    #[tokio::test]
    async fn test_finished_task_counts_as_stopped() {
        let slot = TaskSlot::new();
        slot.start_with("oneshot", || BackgroundTask::spawn("oneshot", |_| async {}))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!slot.is_running());
        assert!(slot
            .start_with("oneshot", || BackgroundTask::spawn("oneshot", |_| async {}))
            .is_ok());
    }
}
