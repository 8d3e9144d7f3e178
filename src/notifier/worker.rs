//! Background tasks behind the notifier: the signal listener and the token
//! worker.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Inner;
use crate::bus::EventBus;
use crate::error::Result;
use crate::history::{ChangeEvent, FetchSpec};
use crate::origin::{RawChangeSignal, CONTACT_STORE_DID_CHANGE};

/// Work for the token worker. Tasks run one at a time, in send order.
pub(super) enum WorkerTask {
    /// Signal-triggered fetch; a non-empty batch is published
    Fetch,
    /// Advance the token to the store's current one without fetching
    Refresh,
    /// On-demand fetch; the events go back to the caller
    Manual {
        spec: Option<FetchSpec>,
        reply: oneshot::Sender<Result<Vec<ChangeEvent>>>,
    },
    /// Signal once every earlier task has finished
    Barrier(oneshot::Sender<()>),
}

pub(super) async fn run_worker(
    inner: Weak<Inner>,
    mut task_rx: mpsc::UnboundedReceiver<WorkerTask>,
    cancel: CancellationToken,
) {
    tracing::debug!("[notifier] Worker started");

    loop {
        let task = tokio::select! {
            _ = cancel.cancelled() => break,
            task = task_rx.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };

        match task {
            WorkerTask::Fetch => {
                inner.fetch_queued.store(false, Ordering::SeqCst);
                let result = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = inner.fetch_cycle(None) => result,
                };
                match result {
                    Ok(events) if !events.is_empty() => inner.publish(events),
                    Ok(_) => tracing::debug!("[notifier] No external changes in batch"),
                    // Recorded by the cycle; the next signal retries
                    Err(_) => {}
                }
            }
            WorkerTask::Refresh => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = inner.refresh_token() => {}
                }
            }
            WorkerTask::Manual { spec, reply } => {
                let result = tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = inner.fetch_cycle(spec) => result,
                };
                let _ = reply.send(result);
            }
            WorkerTask::Barrier(done_tx) => {
                let _ = done_tx.send(());
            }
        }
    }

    tracing::debug!("[notifier] Worker stopped");
}

/// Live subscription to the store's change signals
pub(super) struct ListenerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Stop delivering signals. Signals not yet taken off the bus are
    /// dropped.
    pub(super) fn revoke(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// Subscribe to change signals and forward them to the notifier.
///
/// The subscription exists once this returns, so no signal posted after
/// initialization is missed.
pub(super) fn start_listener(
    inner: &Arc<Inner>,
    signals: EventBus<RawChangeSignal>,
) -> ListenerHandle {
    let mut subscription = signals.subscribe(CONTACT_STORE_DID_CHANGE);
    let cancel = inner.cancel.child_token();
    let weak = Arc::downgrade(inner);

    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tracing::debug!("[notifier] Listening for contact store changes");
            loop {
                let signal = tokio::select! {
                    _ = cancel.cancelled() => break,
                    signal = subscription.recv() => match signal {
                        Some(signal) => signal,
                        None => break,
                    },
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.is_disposed() {
                    break;
                }
                inner.on_signal(signal);
            }
            tracing::debug!("[notifier] Stopped listening for contact store changes");
        }
    });

    ListenerHandle { cancel, task }
}
