//! Serial delivery context for observer-facing work.
//!
//! Observers expect single-threaded, in-order delivery, like a UI main
//! thread. Jobs dispatched here run one at a time, in dispatch order, on a
//! single background task.

use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Work sent to the dispatcher task
enum DispatchTask {
    /// Run a job
    Run(Job),
    /// Signal once every earlier job has run
    Barrier(oneshot::Sender<()>),
    /// Stop after the jobs already queued
    Shutdown,
}

/// Handle to the serial delivery task
#[derive(Clone)]
pub struct MainDispatcher {
    task_tx: mpsc::UnboundedSender<DispatchTask>,
}

impl MainDispatcher {
    /// Spawn the delivery task. Must be called within a Tokio runtime.
    pub fn spawn() -> Self {
        let (task_tx, task_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            run_dispatcher(task_rx).await;
        });

        Self { task_tx }
    }

    /// Queue a job. Returns `false` once the dispatcher has shut down.
    pub fn dispatch<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.task_tx.send(DispatchTask::Run(Box::new(job))).is_ok()
    }

    /// Wait until every job queued before this call has run
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.task_tx.send(DispatchTask::Barrier(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Stop the task after the jobs already queued
    pub fn shutdown(&self) {
        let _ = self.task_tx.send(DispatchTask::Shutdown);
    }
}

async fn run_dispatcher(mut task_rx: mpsc::UnboundedReceiver<DispatchTask>) {
    tracing::debug!("[dispatch] Main dispatcher started");

    while let Some(task) = task_rx.recv().await {
        match task {
            DispatchTask::Run(job) => job(),
            DispatchTask::Barrier(done_tx) => {
                let _ = done_tx.send(());
            }
            DispatchTask::Shutdown => break,
        }
    }

    tracing::debug!("[dispatch] Main dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_jobs_run_in_order() {
        let dispatcher = MainDispatcher::spawn();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let seen = seen.clone();
            assert!(dispatcher.dispatch(move || seen.lock().push(i)));
        }
        dispatcher.flush().await;

        assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_dispatch_after_shutdown_is_rejected() {
        let dispatcher = MainDispatcher::spawn();
        dispatcher.shutdown();
        dispatcher.flush().await;
        assert!(!dispatcher.dispatch(|| {}));
    }
}
