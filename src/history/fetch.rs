//! Change-history request description.

use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::token::HistoryToken;

/// Name of a contact field to include in event snapshots.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldDescriptor(Cow<'static, str>);

static GIVEN_NAME: FieldDescriptor = FieldDescriptor(Cow::Borrowed("givenName"));
static FAMILY_NAME: FieldDescriptor = FieldDescriptor(Cow::Borrowed("familyName"));
static ORGANIZATION: FieldDescriptor = FieldDescriptor(Cow::Borrowed("organizationName"));

impl FieldDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn given_name() -> &'static Self {
        &GIVEN_NAME
    }

    pub fn family_name() -> &'static Self {
        &FAMILY_NAME
    }

    pub fn organization() -> &'static Self {
        &ORGANIZATION
    }

    /// Fields needed to render a full name
    pub fn full_name() -> [Self; 2] {
        [GIVEN_NAME.clone(), FAMILY_NAME.clone()]
    }
}

/// Which changes to fetch and what to include with them.
///
/// `starting_token` is replaced with the persisted token by the notifier. A
/// spec handed to `change_history` with no starting token asks for a full
/// resync instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSpec {
    /// Merge linked contacts into unified contacts
    pub unify_duplicates: bool,

    /// Transaction authors whose changes are skipped
    pub excluded_authors: BTreeSet<String>,

    /// Snapshot fields beyond the identifier
    pub requested_fields: BTreeSet<FieldDescriptor>,

    /// Fetch changes after this position; `None` fetches everything
    pub starting_token: Option<HistoryToken>,
}

impl Default for FetchSpec {
    fn default() -> Self {
        Self {
            unify_duplicates: true,
            excluded_authors: BTreeSet::new(),
            requested_fields: BTreeSet::new(),
            starting_token: None,
        }
    }
}

impl FetchSpec {
    /// Defaults for an app: identifiers only, and skip the app's own
    /// transactions.
    pub fn for_app(app_id: impl Into<String>) -> Self {
        Self::default().excluding_author(app_id)
    }

    pub fn excluding_author(mut self, author: impl Into<String>) -> Self {
        let author = author.into();
        if !author.trim().is_empty() {
            self.excluded_authors.insert(author);
        }
        self
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.requested_fields.insert(field);
        self
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDescriptor>) -> Self {
        self.requested_fields.extend(fields);
        self
    }

    pub fn with_unify_duplicates(mut self, unify: bool) -> Self {
        self.unify_duplicates = unify;
        self
    }

    pub fn with_starting_token(mut self, token: Option<HistoryToken>) -> Self {
        self.starting_token = token;
        self
    }

    pub fn is_full_resync(&self) -> bool {
        self.starting_token.is_none()
    }

    pub fn excludes(&self, author: Option<&str>) -> bool {
        author.is_some_and(|author| self.excluded_authors.contains(author))
    }
}
