//! Contacts change notifier.
//!
//! Turns the contact store's noisy "something changed" signal into batches
//! of changes made outside the app, and keeps the last observed history
//! token in a [`TokenStore`] so each change is reported once, across
//! restarts.
//!
//! ## Flow
//!
//! ```text
//! store signal --> listener --> classify --> worker queue --> fetch cycle
//!                                                              |
//!                              observers <-- main dispatcher <-+
//! ```
//!
//! - The listener only classifies and queues; it never waits on the store.
//! - Every token read-then-write (signal fetches, internal refreshes, manual
//!   `change_history` calls, the launch catch-up) runs on one worker task,
//!   one at a time, in arrival order.
//! - Batches are handed to the main dispatcher, which publishes them in
//!   order unless the notifier was disposed in the meantime.
//!
//! ## Initialization
//!
//! Construction returns immediately and initializes in the background:
//! request access, wake the store, establish the baseline token (first run)
//! or catch up on changes missed while not running, then subscribe. The
//! outcome is observable through [`ContactsChangeNotifier::ready`].

mod state;
mod worker;


pub use state::{ContactsChanged, NotifierStatus, DID_CHANGE_NOTIFICATION};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::bus::{EventBus, Subscription};
use crate::dispatch::MainDispatcher;
use crate::error::{NotifierError, Result};
use crate::history::{ChangeEvent, ChangeHistorySource, FetchSpec, HistoryToken, SourceError};
use crate::lifecycle::{AppLifecycle, LifecycleProvider};
use crate::origin::{classify, Origin, RawChangeSignal};
use crate::token_store::{default_data_dir, TokenStorage, TokenStore};

use worker::{ListenerHandle, WorkerTask};

/// Shared state, owned by the notifier handle.
///
/// Background tasks hold it weakly, except initialization which is
/// cancelled on disposal.
struct Inner {
    source: Arc<dyn ChangeHistorySource>,
    token_store: Arc<dyn TokenStore>,
    fetch_spec: FetchSpec,
    lifecycle: Arc<dyn LifecycleProvider>,
    changes: EventBus<ContactsChanged>,
    dispatcher: MainDispatcher,
    status_tx: watch::Sender<NotifierStatus>,
    task_tx: mpsc::UnboundedSender<WorkerTask>,
    /// A signal-triggered fetch is queued and hasn't started yet
    fetch_queued: AtomicBool,
    cancel: CancellationToken,
    last_error: RwLock<Option<NotifierError>>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl Inner {
    fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Move to `status` unless already disposed
    fn set_status(&self, status: NotifierStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == NotifierStatus::Disposed {
                return false;
            }
            *current = status;
            true
        });
    }

    fn fail(&self, error: NotifierError) {
        tracing::error!("[notifier] Initialization failed: {}", error);
        self.set_status(NotifierStatus::Failed { error });
    }

    fn record_error(&self, error: &NotifierError) {
        *self.last_error.write() = Some(error.clone());
    }

    /// Classify a raw signal and queue the matching work. Never waits.
    fn on_signal(&self, signal: RawChangeSignal) {
        let phase = self.lifecycle.phase();
        let origin = classify(&signal, phase);
        tracing::debug!(
            "[notifier] Signal classified as {:?} (phase={}, self_report={})",
            origin,
            phase.as_str(),
            signal.is_self_report()
        );

        match origin {
            Origin::External => self.schedule_fetch(),
            Origin::Internal | Origin::Ambiguous => {
                if self.task_tx.send(WorkerTask::Refresh).is_err() {
                    tracing::debug!("[notifier] Worker gone, dropping token refresh");
                }
            }
        }
    }

    /// Queue a publishing fetch cycle, unless one is already waiting to start
    fn schedule_fetch(&self) {
        if self.fetch_queued.swap(true, Ordering::SeqCst) {
            tracing::debug!("[notifier] Fetch already queued, coalescing signal");
            return;
        }
        if self.task_tx.send(WorkerTask::Fetch).is_err() {
            self.fetch_queued.store(false, Ordering::SeqCst);
            tracing::debug!("[notifier] Worker gone, dropping fetch");
        }
    }

    /// Starting token substitution: the persisted token always wins, except
    /// for a caller-supplied spec without a token, which asks for a full
    /// resync.
    fn resolve_spec(
        &self,
        requested: Option<FetchSpec>,
        persisted: Option<HistoryToken>,
    ) -> FetchSpec {
        match requested {
            None => self.fetch_spec.clone().with_starting_token(persisted),
            Some(spec) if spec.is_full_resync() => spec,
            Some(spec) => spec.with_starting_token(persisted),
        }
    }

    /// Read token, fetch, write token. Only called from the worker.
    ///
    /// On failure the persisted token is left alone so the same changes are
    /// fetched again next time.
    async fn fetch_cycle(&self, requested: Option<FetchSpec>) -> Result<Vec<ChangeEvent>> {
        let persisted = self.token_store.get();
        let spec = self.resolve_spec(requested, persisted);
        let full_resync = spec.is_full_resync();

        match self.source.fetch(spec).await {
            Ok(history) => {
                let (events, token) = history.collect();
                self.token_store.set(Some(token.clone()));
                tracing::info!(
                    "[notifier] Fetched {} change(s){}, token now {}",
                    events.len(),
                    if full_resync { " (full resync)" } else { "" },
                    token
                );
                Ok(events)
            }
            Err(e) => {
                let error = NotifierError::from(e);
                tracing::warn!("[notifier] Failed to fetch change history: {}", error);
                self.record_error(&error);
                Err(error)
            }
        }
    }

    /// Advance the token past changes that won't be reported.
    ///
    /// The token is read when the refresh runs, not when its signal arrived.
    /// A refresh queued behind a slow fetch therefore also skips any external
    /// change that lands in between; that change is never published.
    async fn refresh_token(&self) {
        match self.source.current_token().await {
            Ok(token) => {
                tracing::debug!("[notifier] Token refreshed to {}", token);
                self.token_store.set(Some(token));
            }
            Err(e) => {
                let error = NotifierError::from(e);
                tracing::warn!("[notifier] Failed to refresh token: {}", error);
                self.record_error(&error);
            }
        }
    }

    /// Hand a batch to the main dispatcher for delivery
    fn publish(&self, events: Vec<ChangeEvent>) {
        let batch = ContactsChanged::new(events);
        let changes = self.changes.clone();
        let cancel = self.cancel.clone();

        let queued = self.dispatcher.dispatch(move || {
            if cancel.is_cancelled() {
                tracing::debug!("[notifier] Disposed before delivery, dropping batch");
                return;
            }
            let observers = changes.publish(DID_CHANGE_NOTIFICATION, batch);
            tracing::debug!("[notifier] Batch delivered to {} observer(s)", observers);
        });
        if !queued {
            tracing::debug!("[notifier] Dispatcher stopped, dropping batch");
        }
    }
}

/// Builder for [`ContactsChangeNotifier`]
pub struct NotifierBuilder {
    source: Arc<dyn ChangeHistorySource>,
    signals: EventBus<RawChangeSignal>,
    token_store: Option<Arc<dyn TokenStore>>,
    fetch_spec: FetchSpec,
    lifecycle: Arc<dyn LifecycleProvider>,
    changes: EventBus<ContactsChanged>,
}

impl NotifierBuilder {
    /// Where the token is kept. Defaults to the local store in the default
    /// data directory.
    pub fn token_store(mut self, token_store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(token_store);
        self
    }

    /// Which changes to observe. Its starting token is ignored.
    pub fn fetch_spec(mut self, fetch_spec: FetchSpec) -> Self {
        self.fetch_spec = fetch_spec;
        self
    }

    /// Source of the app's lifecycle phase. Defaults to always active.
    pub fn lifecycle(mut self, lifecycle: Arc<dyn LifecycleProvider>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Bus to publish change batches on
    pub fn changes_bus(mut self, changes: EventBus<ContactsChanged>) -> Self {
        self.changes = changes;
        self
    }

    /// Create the notifier and start initializing in the background.
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn(self) -> ContactsChangeNotifier {
        let token_store = self
            .token_store
            .unwrap_or_else(|| TokenStorage::default().open(&default_data_dir()));
        let (status_tx, status_rx) = watch::channel(NotifierStatus::Uninitialized);
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let inner = Arc::new(Inner {
            source: self.source,
            token_store,
            fetch_spec: self.fetch_spec,
            lifecycle: self.lifecycle,
            changes: self.changes,
            dispatcher: MainDispatcher::spawn(),
            status_tx,
            task_tx,
            fetch_queued: AtomicBool::new(false),
            cancel: cancel.clone(),
            last_error: RwLock::new(None),
            listener: Mutex::new(None),
        });

        tokio::spawn(worker::run_worker(
            Arc::downgrade(&inner),
            task_rx,
            cancel.child_token(),
        ));
        tokio::spawn(initialize(inner.clone(), self.signals));

        ContactsChangeNotifier { inner, status_rx }
    }
}

/// Posts batches of contacts changes made outside the app.
///
/// Keep the notifier alive for as long as changes should be observed;
/// dropping it disposes it.
///
/// # Example
///
/// ```rust,ignore
/// let notifier = ContactsChangeNotifier::builder(store.clone(), signals)
///     .fetch_spec(FetchSpec::for_app("com.example.app"))
///     .spawn();
/// let mut changes = notifier.subscribe();
/// notifier.ready().await?;
/// while let Some(batch) = changes.recv().await {
///     refresh_cached_contacts(&batch.events);
/// }
/// ```
pub struct ContactsChangeNotifier {
    inner: Arc<Inner>,
    status_rx: watch::Receiver<NotifierStatus>,
}

impl ContactsChangeNotifier {
    /// Start building a notifier over `source`, listening on `signals`
    pub fn builder(
        source: Arc<dyn ChangeHistorySource>,
        signals: EventBus<RawChangeSignal>,
    ) -> NotifierBuilder {
        NotifierBuilder {
            source,
            signals,
            token_store: None,
            fetch_spec: FetchSpec::default(),
            lifecycle: Arc::new(AppLifecycle::default()),
            changes: EventBus::default(),
        }
    }

    /// Create a notifier with an explicit token store and fetch spec
    pub fn new(
        source: Arc<dyn ChangeHistorySource>,
        signals: EventBus<RawChangeSignal>,
        token_store: Arc<dyn TokenStore>,
        fetch_spec: FetchSpec,
    ) -> Self {
        Self::builder(source, signals)
            .token_store(token_store)
            .fetch_spec(fetch_spec)
            .spawn()
    }

    pub fn status(&self) -> NotifierStatus {
        self.status_rx.borrow().clone()
    }

    /// Wait for initialization to finish.
    ///
    /// Fails with the initialization error, e.g. `AuthorizationDenied`, or
    /// with `Disposed`.
    pub async fn ready(&self) -> Result<()> {
        let mut status_rx = self.status_rx.clone();
        let status = status_rx
            .wait_for(NotifierStatus::is_settled)
            .await
            .map(|status| status.clone())
            .map_err(|_| NotifierError::Disposed)?;
        status.outcome()
    }

    /// Observe published change batches
    pub fn subscribe(&self) -> Subscription<ContactsChanged> {
        self.inner.changes.subscribe(DID_CHANGE_NOTIFICATION)
    }

    /// Fetch changes on demand.
    ///
    /// With `None`, returns changes since the last fetch using the
    /// notifier's spec. A supplied spec has its starting token replaced by
    /// the persisted one, unless it has none, which requests everything
    /// (a `StoreReset` followed by every contact).
    ///
    /// Every successful fetch advances the persisted token. The events are
    /// returned, not published.
    pub async fn change_history(&self, spec: Option<FetchSpec>) -> Result<Vec<ChangeEvent>> {
        self.ready().await?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .task_tx
            .send(WorkerTask::Manual {
                spec,
                reply: reply_tx,
            })
            .map_err(|_| NotifierError::Disposed)?;
        reply_rx.await.map_err(|_| NotifierError::Disposed)?
    }

    /// Persisted history token
    pub fn current_token(&self) -> Option<HistoryToken> {
        self.inner.token_store.get()
    }

    pub fn fetch_spec(&self) -> &FetchSpec {
        &self.inner.fetch_spec
    }

    /// Most recent fetch or refresh failure
    pub fn last_error(&self) -> Option<NotifierError> {
        self.inner.last_error.read().clone()
    }

    /// Wait until queued token work has finished and its batches delivered
    pub async fn idle(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.inner.task_tx.send(WorkerTask::Barrier(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
        self.inner.dispatcher.flush().await;
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Stop observing: revoke the signal subscription, then stop all
    /// background work. Batches not yet delivered are dropped.
    pub fn dispose(&self) {
        if self.inner.is_disposed() {
            return;
        }
        if let Some(listener) = self.inner.listener.lock().take() {
            listener.revoke();
        }
        self.inner.cancel.cancel();
        self.inner.status_tx.send_replace(NotifierStatus::Disposed);
        self.inner.dispatcher.shutdown();
        tracing::info!("[notifier] Disposed");
    }
}

impl Drop for ContactsChangeNotifier {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Background initialization: authorize, wake, baseline or catch up,
/// subscribe.
async fn initialize(inner: Arc<Inner>, signals: EventBus<RawChangeSignal>) {
    inner.set_status(NotifierStatus::Authorizing);
    tracing::info!("[notifier] Requesting contacts access...");

    let access = tokio::select! {
        _ = inner.cancel.cancelled() => {
            tracing::debug!("[notifier] Disposed while waiting for access");
            return;
        }
        access = inner.source.request_access() => access,
    };
    match access {
        Ok(()) => {}
        Err(SourceError::AccessDenied) => {
            inner.fail(NotifierError::AuthorizationDenied);
            return;
        }
        Err(e) => {
            inner.fail(unavailable(e));
            return;
        }
    }

    // Without this read the store never posts change signals
    inner.source.wake().await;

    match inner.token_store.get() {
        None => match inner.source.current_token().await {
            Ok(token) => {
                // First run: history before now is not reported
                tracing::info!("[notifier] First run, baseline token {}", token);
                inner.token_store.set(Some(token));
            }
            Err(e) => {
                inner.fail(unavailable(e));
                return;
            }
        },
        Some(token) => {
            tracing::info!("[notifier] Catching up on changes since {}", token);
            inner.schedule_fetch();
        }
    }

    let listener = worker::start_listener(&inner, signals);
    *inner.listener.lock() = Some(listener);

    // Disposal may have raced with subscribing
    if inner.is_disposed() {
        if let Some(listener) = inner.listener.lock().take() {
            listener.revoke();
        }
        return;
    }

    inner.set_status(NotifierStatus::Ready);
    tracing::info!("[notifier] Ready");
}

/// Initialization failures other than a denied prompt leave the store unusable
fn unavailable(error: SourceError) -> NotifierError {
    match error {
        SourceError::StoreUnavailable(reason) => NotifierError::StoreUnavailable(reason),
        other => NotifierError::StoreUnavailable(other.to_string()),
    }
}
