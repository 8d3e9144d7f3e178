//! Settings schema for the contacts notifier.
//!
//! All settings structs use `#[serde(default)]` to allow partial configuration files.
//! Missing fields are filled with sensible defaults.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::history::{FetchSpec, FieldDescriptor};
use crate::token_store::{default_data_dir, MemoryTokenStore, TokenStorage, TokenStore};

/// Root settings structure.
///
/// Loaded from `~/.contacts-notifier/settings.toml` with environment variable
/// interpolation support. Version field enables future migrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierSettings {
    /// Schema version for migrations
    pub version: u32,

    /// Where the history token is persisted
    pub storage: StorageSettings,

    /// Which changes are fetched and reported
    pub fetch: FetchSettings,

    /// Log output
    pub logging: LoggingSettings,
}

/// Token storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Key-value file in the data directory
    #[default]
    Local,
    /// Process memory; every launch is a first run
    Memory,
}

/// Token storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,

    /// Namespace for the local file, e.g. an app group (supports $ENV_VAR syntax)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_name: Option<String>,

    /// Directory for the local file (supports $ENV_VAR syntax)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

/// Fetch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Host application identifier; its own transactions are never reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    /// Merge linked contacts into one
    pub unify_duplicates: bool,

    /// Further transaction authors to skip
    pub excluded_authors: Vec<String>,

    /// Contact fields to include in snapshots, e.g. "givenName"
    pub additional_fields: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directives, e.g. "contacts_change_notifier=debug".
    /// `RUST_LOG` takes precedence when set.
    pub filter: String,
}

// =============================================================================
// Conversions
// =============================================================================

impl StorageSettings {
    /// Directory for local token files
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir)
    }

    pub fn token_storage(&self) -> TokenStorage {
        match self.backend {
            StorageBackend::Local => TokenStorage::Local {
                suite_name: self.suite_name.clone(),
            },
            StorageBackend::Memory => TokenStorage::Custom(Arc::new(MemoryTokenStore::new())),
        }
    }

    /// Open the configured backend, with `data_dir` overriding the configured
    /// directory
    pub fn open(&self, data_dir: Option<&Path>) -> Arc<dyn TokenStore> {
        let dir = data_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.data_dir());
        self.token_storage().open(&dir)
    }
}

impl FetchSettings {
    pub fn to_fetch_spec(&self) -> FetchSpec {
        let spec = match self.app_id.as_deref() {
            Some(app_id) => FetchSpec::for_app(app_id),
            None => FetchSpec::default(),
        };
        let spec = self
            .excluded_authors
            .iter()
            .fold(spec, |spec, author| spec.excluding_author(author.as_str()));
        spec.with_unify_duplicates(self.unify_duplicates).with_fields(
            self.additional_fields
                .iter()
                .map(|field| field.trim())
                .filter(|field| !field.is_empty())
                .map(FieldDescriptor::new),
        )
    }
}

// =============================================================================
// Default implementations
// =============================================================================

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            version: 1,
            storage: StorageSettings::default(),
            fetch: FetchSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            app_id: None,
            unify_duplicates: true,
            excluded_authors: Vec::new(),
            additional_fields: Vec::new(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: crate::logging::DEFAULT_FILTER.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = NotifierSettings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.storage.backend, StorageBackend::Local);
        assert!(settings.fetch.unify_duplicates);
        assert_eq!(settings.logging.filter, "contacts_change_notifier=info");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml = r#"
            version = 1
            [storage]
            backend = "memory"
        "#;

        let settings: NotifierSettings = toml::from_str(toml).unwrap();
        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        // Defaults should fill in missing fields
        assert!(settings.fetch.unify_duplicates);
        assert!(settings.fetch.excluded_authors.is_empty());
    }

    #[test]
    fn test_fetch_settings_build_spec() {
        let fetch = FetchSettings {
            app_id: Some("com.example.app".to_string()),
            unify_duplicates: false,
            excluded_authors: vec!["com.example.widget".to_string()],
            additional_fields: vec!["givenName".to_string(), " ".to_string()],
        };

        let spec = fetch.to_fetch_spec();
        assert!(!spec.unify_duplicates);
        assert!(spec.excludes(Some("com.example.app")));
        assert!(spec.excludes(Some("com.example.widget")));
        assert!(!spec.excludes(Some("com.apple.icloud")));
        assert_eq!(spec.requested_fields.len(), 1);
        assert!(spec.starting_token.is_none());
    }

    #[test]
    fn test_storage_settings_select_backend() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let local = StorageSettings {
            backend: StorageBackend::Local,
            suite_name: Some("group.example".to_string()),
            data_dir: Some(temp_dir.path().display().to_string()),
        };
        assert_eq!(local.data_dir(), temp_dir.path());
        assert!(matches!(
            local.token_storage(),
            TokenStorage::Local { suite_name: Some(ref name) } if name == "group.example"
        ));

        let memory = StorageSettings {
            backend: StorageBackend::Memory,
            ..StorageSettings::default()
        };
        assert!(matches!(memory.token_storage(), TokenStorage::Custom(_)));
        assert_eq!(memory.open(None).get(), None);
    }

    #[test]
    fn test_serialize_settings() {
        let settings = NotifierSettings::default();
        let toml_str = toml::to_string_pretty(&settings).unwrap();
        assert!(toml_str.contains("version = 1"));
        assert!(toml_str.contains("[fetch]"));
        assert!(toml_str.contains("backend = \"local\""));
    }
}
