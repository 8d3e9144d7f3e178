//! TOML-based settings for the notifier and its CLI.
//!
//! Settings are loaded from `~/.contacts-notifier/settings.toml` with
//! environment variable interpolation support.
//!
//! # Usage
//!
//! ```rust,ignore
//! use contacts_change_notifier::settings::SettingsManager;
//!
//! let manager = SettingsManager::new().await?;
//! let settings = manager.get().await;
//!
//! let token_store = settings.storage.open(None);
//! let fetch_spec = settings.fetch.to_fetch_spec();
//! ```

pub mod loader;
pub mod schema;

pub use loader::{settings_path, SettingsManager};
pub use schema::{FetchSettings, LoggingSettings, NotifierSettings, StorageBackend, StorageSettings};
