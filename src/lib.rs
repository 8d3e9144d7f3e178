//! Contacts change notifier.
//!
//! Watches a contacts database for changes made outside the app and
//! publishes them in batches, suppressing the phantom "external" signals
//! that echo the app's own writes. The last observed position in the change
//! history is persisted, so every change is reported once, even across
//! restarts.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use contacts_change_notifier::{ContactsChangeNotifier, FetchSpec, TokenStorage};
//!
//! let notifier = ContactsChangeNotifier::builder(store, signals)
//!     .token_store(TokenStorage::default().open(&data_dir))
//!     .fetch_spec(FetchSpec::for_app("com.example.app"))
//!     .lifecycle(Arc::new(lifecycle.clone()))
//!     .spawn();
//!
//! let mut changes = notifier.subscribe();
//! while let Some(batch) = changes.recv().await {
//!     for line in batch.descriptions() {
//!         println!("{line}");
//!     }
//! }
//! ```

pub mod bus;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod logging;
pub mod notifier;
pub mod origin;
pub mod settings;
pub mod token_store;

#[cfg(feature = "cli")]
pub mod cli;

pub use bus::{EventBus, Subscription};
pub use error::{NotifierError, Result};
pub use history::{
    ChangeEvent, ChangeHistory, ChangeHistorySource, ContactSnapshot, FetchSpec, FieldDescriptor,
    HistoryToken, MemoryContactStore, SourceError,
};
pub use lifecycle::{AppLifecycle, LifecyclePhase, LifecycleProvider};
pub use notifier::{
    ContactsChangeNotifier, ContactsChanged, NotifierBuilder, NotifierStatus,
    DID_CHANGE_NOTIFICATION,
};
pub use origin::{classify, Origin, RawChangeSignal, CONTACT_STORE_DID_CHANGE};
pub use token_store::{
    FileKeyValueStore, KeyValueStore, KeyValueTokenStore, MemoryKeyValueStore, MemoryTokenStore,
    TokenStorage, TokenStore,
};
