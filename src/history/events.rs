//! Change events reported by the contact store's history log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::fetch::FieldDescriptor;

/// Contact values captured with an add or update event.
///
/// Only the fields named in the fetch request are present, plus the
/// identifier which is always included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSnapshot {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl ContactSnapshot {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: &FieldDescriptor, value: impl Into<String>) -> Self {
        self.fields.insert(field.as_str().to_string(), value.into());
        self
    }

    pub fn field(&self, field: &FieldDescriptor) -> Option<&str> {
        self.fields.get(field.as_str()).map(String::as_str)
    }

    /// Given and family name joined, if either was fetched.
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [FieldDescriptor::given_name(), FieldDescriptor::family_name()]
            .iter()
            .filter_map(|field| self.field(field))
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// Keep only the requested fields.
    pub fn project(&self, requested: &std::collections::BTreeSet<FieldDescriptor>) -> Self {
        Self {
            identifier: self.identifier.clone(),
            fields: self
                .fields
                .iter()
                .filter(|(name, _)| requested.iter().any(|field| field.as_str() == name.as_str()))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }
}

/// One entry of the change history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// Contact created
    Added {
        identifier: String,
        contact: ContactSnapshot,
    },

    /// Contact modified
    Updated {
        identifier: String,
        contact: ContactSnapshot,
    },

    /// Contact removed
    Deleted { identifier: String },

    /// Group created, renamed, removed or had its membership changed
    GroupChanged {
        group_identifier: String,
        description: String,
    },

    /// Discard everything known and rebuild from the events that follow.
    /// Only produced for fetches without a starting token.
    StoreReset,
}

impl ChangeEvent {
    /// Short stable name for logs and JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Added { .. } => "added",
            ChangeEvent::Updated { .. } => "updated",
            ChangeEvent::Deleted { .. } => "deleted",
            ChangeEvent::GroupChanged { .. } => "group_changed",
            ChangeEvent::StoreReset => "store_reset",
        }
    }

    /// Identifier of the contact or group the event is about
    pub fn subject(&self) -> Option<&str> {
        match self {
            ChangeEvent::Added { identifier, .. }
            | ChangeEvent::Updated { identifier, .. }
            | ChangeEvent::Deleted { identifier } => Some(identifier),
            ChangeEvent::GroupChanged {
                group_identifier, ..
            } => Some(group_identifier),
            ChangeEvent::StoreReset => None,
        }
    }

    /// Markdown line describing the change for display.
    pub fn description(&self) -> String {
        match self {
            ChangeEvent::Added {
                identifier,
                contact,
            } => format!("Add **{}** `{}`", display_name(contact), identifier),
            ChangeEvent::Updated {
                identifier,
                contact,
            } => format!("Update **{}** `{}`", display_name(contact), identifier),
            ChangeEvent::Deleted { identifier } => format!("Delete `{}`", identifier),
            ChangeEvent::StoreReset => "Initial update".to_string(),
            ChangeEvent::GroupChanged { description, .. } => {
                format!("Group event: {}", description)
            }
        }
    }
}

fn display_name(contact: &ContactSnapshot) -> String {
    contact.full_name().unwrap_or_else(|| "Unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> ContactSnapshot {
        ContactSnapshot::new("c-1")
            .with_field(FieldDescriptor::given_name(), "Ada")
            .with_field(FieldDescriptor::family_name(), "Lovelace")
            .with_field(FieldDescriptor::organization(), "Analytical Engines")
    }

    #[test]
    fn test_descriptions() {
        let added = ChangeEvent::Added {
            identifier: "c-1".into(),
            contact: ada(),
        };
        assert_eq!(added.description(), "Add **Ada Lovelace** `c-1`");

        let updated = ChangeEvent::Updated {
            identifier: "c-2".into(),
            contact: ContactSnapshot::new("c-2"),
        };
        assert_eq!(updated.description(), "Update **Unknown** `c-2`");

        let deleted = ChangeEvent::Deleted {
            identifier: "c-3".into(),
        };
        assert_eq!(deleted.description(), "Delete `c-3`");
        assert_eq!(ChangeEvent::StoreReset.description(), "Initial update");

        let group = ChangeEvent::GroupChanged {
            group_identifier: "g-1".into(),
            description: "renamed to Family".into(),
        };
        assert_eq!(group.description(), "Group event: renamed to Family");
        assert_eq!(group.subject(), Some("g-1"));
    }

    #[test]
    fn test_projection_keeps_identifier_and_requested_fields() {
        let requested = [FieldDescriptor::given_name().clone()].into_iter().collect();
        let projected = ada().project(&requested);
        assert_eq!(projected.identifier, "c-1");
        assert_eq!(projected.field(FieldDescriptor::given_name()), Some("Ada"));
        assert_eq!(projected.field(FieldDescriptor::organization()), None);
        assert_eq!(projected.full_name().as_deref(), Some("Ada"));
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_value(ChangeEvent::Deleted {
            identifier: "c-9".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "deleted");
        assert_eq!(json["identifier"], "c-9");
        assert_eq!(ChangeEvent::StoreReset.kind(), "store_reset");
    }
}
