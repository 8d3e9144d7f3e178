//! Deciding whether a raw store change signal came from outside the app.
//!
//! The store's signal also fires for the app's own saves while the app is in
//! the foreground (a phantom echo), with the external flag set. A signal is
//! only trusted as external when the app could not have been the writer:
//! - background: woken for a background refresh
//! - inactive: being opened, changes happened while away
//! - active: regular execution, treat as the app's own write
//!
//! This relies on undocumented store behaviour and is best effort.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::lifecycle::LifecyclePhase;

/// Topic the store posts raw change signals on
pub const CONTACT_STORE_DID_CHANGE: &str = "CNContactStoreDidChangeNotification";

/// Metadata key: present when the change originated outside the process
pub const ORIGINATED_EXTERNALLY_KEY: &str = "CNNotificationOriginationExternally";
/// Metadata key: opaque save sources, empty for external changes
pub const SOURCES_KEY: &str = "CNNotificationSourcesKey";
/// Metadata key: save operation identifiers, empty for external changes
pub const SAVE_IDENTIFIERS_KEY: &str = "CNNotificationSaveIdentifiersKey";

/// "Something changed" signal from the contact store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChangeSignal {
    /// External origination flag; absent on some platform versions
    pub originated_externally: Option<bool>,
    /// Opaque save sources
    #[serde(default)]
    pub sources: Vec<String>,
    /// Save operation identifiers
    #[serde(default)]
    pub save_identifiers: Vec<String>,
}

impl RawChangeSignal {
    /// Signal flagged as coming from another process
    pub fn external() -> Self {
        Self {
            originated_externally: Some(true),
            ..Self::default()
        }
    }

    /// Signal for one of this process's own saves
    pub fn own_save(source: impl Into<String>, save_identifier: impl Into<String>) -> Self {
        Self {
            originated_externally: None,
            sources: vec![source.into()],
            save_identifiers: vec![save_identifier.into()],
        }
    }

    /// Parse the store's notification metadata.
    ///
    /// The origination key is a presence flag: present means external,
    /// whatever its value.
    pub fn from_metadata(metadata: &HashMap<String, serde_json::Value>) -> Self {
        let originated_externally = metadata
            .contains_key(ORIGINATED_EXTERNALLY_KEY)
            .then_some(true);
        Self {
            originated_externally,
            sources: string_list(metadata.get(SOURCES_KEY)),
            save_identifiers: string_list(metadata.get(SAVE_IDENTIFIERS_KEY)),
        }
    }

    /// Carries save sources or identifiers, i.e. reports the app's own save
    pub fn is_self_report(&self) -> bool {
        !self.sources.is_empty() || !self.save_identifiers.is_empty()
    }
}

fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Classification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Made by another app, sync, or restore
    External,
    /// Made by this process, or an echo of it
    Internal,
    /// The signal carried no origination flag
    Ambiguous,
}

/// Classify a raw signal given the app's lifecycle phase.
pub fn classify(signal: &RawChangeSignal, phase: LifecyclePhase) -> Origin {
    match signal.originated_externally {
        None => Origin::Ambiguous,
        Some(true) if phase != LifecyclePhase::Active => Origin::External,
        Some(_) => Origin::Internal,
    }
}
