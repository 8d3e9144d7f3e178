//! Durable storage for the last observed history token.
//!
//! Storage is best effort: implementations never fail outward and drop a
//! failed write after logging it. Losing a write only means the next fetch
//! re-delivers changes that were already reported.

mod file;

pub use file::FileKeyValueStore;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::history::HistoryToken;

/// Key the token is stored under in key-value backends
pub const LAST_HISTORY_TOKEN_KEY: &str = "ContactsChangeNotifier.lastHistoryToken";

/// Directory local token files live in: `~/.contacts-notifier`, or the
/// current directory when there is no home directory.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".contacts-notifier"))
        .unwrap_or_else(|| PathBuf::from(".contacts-notifier"))
}

/// Get/set access to one persisted token.
///
/// `set` must be atomic with respect to `get`; readers see the old or the
/// new token, never a partial one.
pub trait TokenStore: Send + Sync + 'static {
    /// Stored token, or `None` before the first run
    fn get(&self) -> Option<HistoryToken>;

    /// Store the token; `None` removes it
    fn set(&self, token: Option<HistoryToken>);
}

/// Binary key-value storage, local or synchronised across devices
pub trait KeyValueStore: Send + Sync + 'static {
    fn data(&self, key: &str) -> Option<Vec<u8>>;

    /// Store or, with `None`, remove a value
    fn set_data(&self, key: &str, value: Option<Vec<u8>>);
}

/// Token kept in a key-value store under [`LAST_HISTORY_TOKEN_KEY`]
pub struct KeyValueTokenStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl KeyValueTokenStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, LAST_HISTORY_TOKEN_KEY)
    }

    pub fn with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }
}

impl TokenStore for KeyValueTokenStore {
    fn get(&self) -> Option<HistoryToken> {
        self.store.data(&self.key).map(HistoryToken::from)
    }

    fn set(&self, token: Option<HistoryToken>) {
        self.store
            .set_data(&self.key, token.map(HistoryToken::into_bytes));
    }
}

/// Token held in memory only
#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<HistoryToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: HistoryToken) -> Self {
        Self {
            token: RwLock::new(Some(token)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<HistoryToken> {
        self.token.read().clone()
    }

    fn set(&self, token: Option<HistoryToken>) {
        *self.token.write() = token;
    }
}

/// In-process key-value store. Clones share contents, the way every device
/// sees the same synchronised cloud store.
#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    values: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn data(&self, key: &str) -> Option<Vec<u8>> {
        self.values.read().get(key).cloned()
    }

    fn set_data(&self, key: &str, value: Option<Vec<u8>>) {
        let mut values = self.values.write();
        match value {
            Some(value) => {
                values.insert(key.to_string(), value);
            }
            None => {
                values.remove(key);
            }
        }
    }
}

/// Where the notifier keeps its token
#[derive(Clone)]
pub enum TokenStorage {
    /// Key-value file in the data directory, optionally namespaced by suite
    Local { suite_name: Option<String> },
    /// Key-value store synchronised across the user's devices
    Cloud(Arc<dyn KeyValueStore>),
    /// Caller-supplied backend
    Custom(Arc<dyn TokenStore>),
}

impl Default for TokenStorage {
    fn default() -> Self {
        Self::Local { suite_name: None }
    }
}

impl std::fmt::Debug for TokenStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local { suite_name } => f
                .debug_struct("Local")
                .field("suite_name", suite_name)
                .finish(),
            Self::Cloud(_) => f.write_str("Cloud"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl TokenStorage {
    /// Open the selected backend. `data_dir` is only used by `Local`.
    pub fn open(&self, data_dir: &Path) -> Arc<dyn TokenStore> {
        match self {
            Self::Local { suite_name } => Arc::new(KeyValueTokenStore::new(Arc::new(
                FileKeyValueStore::new(data_dir, suite_name.as_deref()),
            ))),
            Self::Cloud(store) => Arc::new(KeyValueTokenStore::new(store.clone())),
            Self::Custom(store) => store.clone(),
        }
    }
}
