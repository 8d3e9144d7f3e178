//! In-memory contact store with a change-history log.
//!
//! Stands in for the platform store in tests and in the CLI simulation. It
//! keeps an append-only log of changes, hands out log positions as history
//! tokens, and posts raw change signals the way the platform does:
//! - a save by the app posts a self-report signal, then a phantom echo
//!   flagged as external
//! - a save by anyone else posts one external signal

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use uuid::Uuid;

use super::events::{ChangeEvent, ContactSnapshot};
use super::fetch::{FetchSpec, FieldDescriptor};
use super::source::{ChangeHistory, ChangeHistorySource, SourceError};
use super::token::HistoryToken;
use crate::bus::EventBus;
use crate::origin::{RawChangeSignal, CONTACT_STORE_DID_CHANGE};

/// Save source reported for the app's own writes
pub const APP_SAVE_SOURCE: &str = "CNDataMapperContactStore";

/// Contacts permission state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    NotDetermined,
    Granted,
    Denied,
}

/// Who performed a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOrigin {
    /// The observing app, saving under its transaction author
    App { author: String },
    /// Another app, a sync service, or a restore
    External { author: Option<String> },
}

impl WriteOrigin {
    pub fn app(author: impl Into<String>) -> Self {
        Self::App {
            author: author.into(),
        }
    }

    pub fn external(author: impl Into<String>) -> Self {
        Self::External {
            author: Some(author.into()),
        }
    }

    fn author(&self) -> Option<String> {
        match self {
            Self::App { author } => Some(author.clone()),
            Self::External { author } => author.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct LogEntry {
    author: Option<String>,
    event: ChangeEvent,
}

#[derive(Debug, Default)]
struct StoreState {
    log: Vec<LogEntry>,
    contacts: BTreeMap<String, ContactSnapshot>,
}

/// In-memory contact store
pub struct MemoryContactStore {
    state: RwLock<StoreState>,
    signals: EventBus<RawChangeSignal>,
    authorization_tx: watch::Sender<Authorization>,
    authorization_rx: watch::Receiver<Authorization>,
    pending_failures: AtomicUsize,
    pending_token_failures: AtomicUsize,
    access_failure: RwLock<Option<String>>,
    fetch_delay: RwLock<Duration>,
    wakes: AtomicUsize,
    fetches: AtomicUsize,
}

impl MemoryContactStore {
    /// Create a store posting signals on `signals`, with access already granted
    pub fn new(signals: EventBus<RawChangeSignal>) -> Self {
        Self::with_authorization(signals, Authorization::Granted)
    }

    pub fn with_authorization(
        signals: EventBus<RawChangeSignal>,
        authorization: Authorization,
    ) -> Self {
        let (authorization_tx, authorization_rx) = watch::channel(authorization);
        Self {
            state: RwLock::new(StoreState::default()),
            signals,
            authorization_tx,
            authorization_rx,
            pending_failures: AtomicUsize::new(0),
            pending_token_failures: AtomicUsize::new(0),
            access_failure: RwLock::new(None),
            fetch_delay: RwLock::new(Duration::ZERO),
            wakes: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Bus the store posts raw change signals on
    pub fn signals(&self) -> &EventBus<RawChangeSignal> {
        &self.signals
    }

    /// Answer the permission prompt (or revoke access later)
    pub fn set_authorization(&self, authorization: Authorization) {
        self.authorization_tx.send_replace(authorization);
    }

    pub fn authorization(&self) -> Authorization {
        *self.authorization_rx.borrow()
    }

    /// Make the next `count` fetches fail as unavailable
    pub fn fail_next_fetches(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` `current_token` reads fail as unavailable
    pub fn fail_next_current_tokens(&self, count: usize) {
        self.pending_token_failures.store(count, Ordering::SeqCst);
    }

    /// Make `request_access` fail as unavailable with `reason` instead of
    /// answering from the permission state. `None` restores normal answers.
    pub fn fail_access_requests(&self, reason: Option<&str>) {
        *self.access_failure.write() = reason.map(str::to_string);
    }

    /// Simulated IPC latency for fetches
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.write() = delay;
    }

    pub fn wake_count(&self) -> usize {
        self.wakes.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn contact(&self, identifier: &str) -> Option<ContactSnapshot> {
        self.state.read().contacts.get(identifier).cloned()
    }

    /// Number of changes recorded so far
    pub fn log_len(&self) -> usize {
        self.state.read().log.len()
    }

    /// Token the store would report as current
    pub fn token_now(&self) -> HistoryToken {
        encode_position(self.log_len())
    }

    /// Create a contact, returning its identifier
    pub fn add_contact(&self, origin: &WriteOrigin, given_name: &str, family_name: &str) -> String {
        let identifier = Uuid::new_v4().to_string();
        let contact = ContactSnapshot::new(identifier.clone())
            .with_field(FieldDescriptor::given_name(), given_name)
            .with_field(FieldDescriptor::family_name(), family_name);
        {
            let mut state = self.state.write();
            state.contacts.insert(identifier.clone(), contact.clone());
            state.log.push(LogEntry {
                author: origin.author(),
                event: ChangeEvent::Added {
                    identifier: identifier.clone(),
                    contact,
                },
            });
        }
        self.post_save_signals(origin);
        identifier
    }

    /// Set fields on an existing contact. Returns `false` if it doesn't exist.
    pub fn update_contact(
        &self,
        origin: &WriteOrigin,
        identifier: &str,
        fields: &[(FieldDescriptor, &str)],
    ) -> bool {
        {
            let mut state = self.state.write();
            let Some(contact) = state.contacts.get_mut(identifier) else {
                return false;
            };
            for (field, value) in fields {
                contact
                    .fields
                    .insert(field.as_str().to_string(), (*value).to_string());
            }
            let contact = contact.clone();
            state.log.push(LogEntry {
                author: origin.author(),
                event: ChangeEvent::Updated {
                    identifier: identifier.to_string(),
                    contact,
                },
            });
        }
        self.post_save_signals(origin);
        true
    }

    /// Remove a contact. Returns `false` if it doesn't exist.
    pub fn delete_contact(&self, origin: &WriteOrigin, identifier: &str) -> bool {
        {
            let mut state = self.state.write();
            if state.contacts.remove(identifier).is_none() {
                return false;
            }
            state.log.push(LogEntry {
                author: origin.author(),
                event: ChangeEvent::Deleted {
                    identifier: identifier.to_string(),
                },
            });
        }
        self.post_save_signals(origin);
        true
    }

    /// Record a group change
    pub fn change_group(&self, origin: &WriteOrigin, group_identifier: &str, description: &str) {
        self.state.write().log.push(LogEntry {
            author: origin.author(),
            event: ChangeEvent::GroupChanged {
                group_identifier: group_identifier.to_string(),
                description: description.to_string(),
            },
        });
        self.post_save_signals(origin);
    }

    /// Post an arbitrary raw signal
    pub fn post_signal(&self, signal: RawChangeSignal) -> usize {
        self.signals.publish(CONTACT_STORE_DID_CHANGE, signal)
    }

    fn post_save_signals(&self, origin: &WriteOrigin) {
        match origin {
            WriteOrigin::App { .. } => {
                self.post_signal(RawChangeSignal::own_save(
                    APP_SAVE_SOURCE,
                    Uuid::new_v4().to_string().to_uppercase(),
                ));
                self.post_signal(RawChangeSignal::external());
            }
            WriteOrigin::External { .. } => {
                self.post_signal(RawChangeSignal::external());
            }
        }
    }

    fn full_resync(state: &StoreState, spec: &FetchSpec) -> Vec<ChangeEvent> {
        std::iter::once(ChangeEvent::StoreReset)
            .chain(state.contacts.values().map(|contact| ChangeEvent::Added {
                identifier: contact.identifier.clone(),
                contact: contact.project(&spec.requested_fields),
            }))
            .collect()
    }

    fn events_since(
        state: &StoreState,
        position: usize,
        spec: &FetchSpec,
    ) -> Vec<ChangeEvent> {
        state.log[position..]
            .iter()
            .filter(|entry| !spec.excludes(entry.author.as_deref()))
            .map(|entry| project_event(&entry.event, spec))
            .collect()
    }
}

/// Consume one pending injected failure, if any
fn take_failure(pending: &AtomicUsize) -> bool {
    pending
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ChangeHistorySource for MemoryContactStore {
    async fn request_access(&self) -> Result<(), SourceError> {
        if let Some(reason) = self.access_failure.read().clone() {
            return Err(SourceError::StoreUnavailable(reason));
        }
        let mut rx = self.authorization_rx.clone();
        let granted = match rx
            .wait_for(|authorization| *authorization != Authorization::NotDetermined)
            .await
        {
            Ok(authorization) => *authorization == Authorization::Granted,
            Err(_) => false,
        };
        if granted {
            Ok(())
        } else {
            Err(SourceError::AccessDenied)
        }
    }

    async fn wake(&self) {
        self.wakes.fetch_add(1, Ordering::SeqCst);
    }

    async fn current_token(&self) -> Result<HistoryToken, SourceError> {
        if take_failure(&self.pending_token_failures) {
            return Err(SourceError::StoreUnavailable(
                "contact store daemon not reachable".to_string(),
            ));
        }
        Ok(self.token_now())
    }

    /// Linked contacts aren't modelled, so `unify_duplicates` has no effect.
    async fn fetch(&self, spec: FetchSpec) -> Result<ChangeHistory, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let delay = *self.fetch_delay.read();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if take_failure(&self.pending_failures) {
            return Err(SourceError::StoreUnavailable(
                "contact store daemon not reachable".to_string(),
            ));
        }
        if self.authorization() != Authorization::Granted {
            return Err(SourceError::AccessDenied);
        }

        let state = self.state.read();
        let end = state.log.len();
        let events = match &spec.starting_token {
            None => Self::full_resync(&state, &spec),
            Some(token) => {
                let position = decode_position(token)?;
                if position > end {
                    return Err(SourceError::InvalidToken(format!(
                        "position {} is past the end of the log ({})",
                        position, end
                    )));
                }
                Self::events_since(&state, position, &spec)
            }
        };
        Ok(ChangeHistory::new(events, encode_position(end)))
    }
}

fn project_event(event: &ChangeEvent, spec: &FetchSpec) -> ChangeEvent {
    match event {
        ChangeEvent::Added {
            identifier,
            contact,
        } => ChangeEvent::Added {
            identifier: identifier.clone(),
            contact: contact.project(&spec.requested_fields),
        },
        ChangeEvent::Updated {
            identifier,
            contact,
        } => ChangeEvent::Updated {
            identifier: identifier.clone(),
            contact: contact.project(&spec.requested_fields),
        },
        other => other.clone(),
    }
}

fn encode_position(position: usize) -> HistoryToken {
    HistoryToken::new((position as u64).to_be_bytes().to_vec())
}

fn decode_position(token: &HistoryToken) -> Result<usize, SourceError> {
    let bytes: [u8; 8] = token
        .as_bytes()
        .try_into()
        .map_err(|_| SourceError::InvalidToken(format!("expected 8 bytes, got {:?}", token)))?;
    usize::try_from(u64::from_be_bytes(bytes))
        .map_err(|_| SourceError::InvalidToken(format!("position out of range: {:?}", token)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn app() -> WriteOrigin {
        WriteOrigin::app("com.example.app")
    }

    fn spec_from(token: HistoryToken) -> FetchSpec {
        FetchSpec::for_app("com.example.app")
            .with_fields(FieldDescriptor::full_name())
            .with_starting_token(Some(token))
    }

    #[tokio::test]
    async fn test_fetch_since_token_skips_excluded_authors() {
        let store = MemoryContactStore::new(EventBus::default());
        let start = store.token_now();

        store.add_contact(&app(), "Own", "Write");
        let id = store.add_contact(&WriteOrigin::external("com.apple.icloud"), "Grace", "Hopper");

        let (events, token) = store.fetch(spec_from(start)).await.unwrap().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject(), Some(id.as_str()));
        assert_eq!(token, store.token_now());

        let (again, _) = store.fetch(spec_from(token)).await.unwrap().collect();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_full_resync_starts_with_reset() {
        let store = MemoryContactStore::new(EventBus::default());
        let origin = WriteOrigin::external("other");
        let keep = store.add_contact(&origin, "Keep", "Me");
        let gone = store.add_contact(&origin, "Gone", "Soon");
        assert!(store.delete_contact(&origin, &gone));

        let (events, _) = store.fetch(FetchSpec::default()).await.unwrap().collect();
        assert_eq!(events[0], ChangeEvent::StoreReset);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].subject(), Some(keep.as_str()));
    }

    #[tokio::test]
    async fn test_projection_follows_requested_fields() {
        let store = MemoryContactStore::new(EventBus::default());
        let start = store.token_now();
        let id = store.add_contact(&WriteOrigin::external("other"), "Alan", "Turing");
        store.update_contact(
            &WriteOrigin::external("other"),
            &id,
            &[(FieldDescriptor::organization().clone(), "Bletchley")],
        );

        let spec = FetchSpec::default().with_starting_token(Some(start));
        let (events, _) = store.fetch(spec).await.unwrap().collect();
        match &events[1] {
            ChangeEvent::Updated { contact, .. } => {
                assert_eq!(contact.identifier, id);
                assert!(contact.fields.is_empty());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_tokens_are_rejected() {
        let store = MemoryContactStore::new(EventBus::default());
        let short = FetchSpec::default().with_starting_token(Some(HistoryToken::new(vec![1u8])));
        assert!(matches!(
            store.fetch(short).await,
            Err(SourceError::InvalidToken(_))
        ));

        let future = FetchSpec::default().with_starting_token(Some(encode_position(5)));
        assert!(matches!(
            store.fetch(future).await,
            Err(SourceError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_failures_then_recovery() {
        let store = MemoryContactStore::new(EventBus::default());
        store.fail_next_fetches(1);
        let spec = FetchSpec::default().with_starting_token(Some(store.token_now()));
        assert!(matches!(
            store.fetch(spec.clone()).await,
            Err(SourceError::StoreUnavailable(_))
        ));
        assert!(store.fetch(spec).await.is_ok());
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_injected_token_and_access_failures() {
        let store = MemoryContactStore::new(EventBus::default());
        store.fail_next_current_tokens(1);
        assert!(matches!(
            store.current_token().await,
            Err(SourceError::StoreUnavailable(_))
        ));
        assert_eq!(store.current_token().await.unwrap(), store.token_now());

        store.fail_access_requests(Some("tcc daemon crashed"));
        assert!(matches!(
            store.request_access().await,
            Err(SourceError::StoreUnavailable(reason)) if reason == "tcc daemon crashed"
        ));
        store.fail_access_requests(None);
        assert!(store.request_access().await.is_ok());
    }

    #[tokio::test]
    async fn test_app_saves_post_self_report_and_echo() {
        let bus = EventBus::default();
        let mut signals = bus.subscribe(CONTACT_STORE_DID_CHANGE);
        let store = MemoryContactStore::new(bus);

        store.add_contact(&app(), "New", "");
        let first = signals.recv().await.unwrap();
        let echo = signals.recv().await.unwrap();
        assert!(first.is_self_report());
        assert_eq!(first.originated_externally, None);
        assert_eq!(echo, RawChangeSignal::external());

        store.change_group(&WriteOrigin::external("other"), "g-1", "renamed");
        assert_eq!(signals.recv().await.unwrap(), RawChangeSignal::external());
    }

    #[tokio::test]
    async fn test_request_access_waits_for_answer() {
        let store = Arc::new(MemoryContactStore::with_authorization(
            EventBus::default(),
            Authorization::NotDetermined,
        ));
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.request_access().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        store.set_authorization(Authorization::Denied);
        assert_eq!(waiter.await.unwrap(), Err(SourceError::AccessDenied));
    }
}
