use serde::Serialize;
use thiserror::Error;

use crate::history::SourceError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifierError {
    #[error("Contacts authorization denied")]
    AuthorizationDenied,

    #[error("Fetching change history failed: {0}")]
    FetchFailed(String),

    #[error("Contact store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Notifier disposed")]
    Disposed,
}

impl From<SourceError> for NotifierError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::AccessDenied => Self::FetchFailed(err.to_string()),
            SourceError::StoreUnavailable(reason) => Self::StoreUnavailable(reason),
            SourceError::InvalidToken(_) => Self::FetchFailed(err.to_string()),
        }
    }
}

// Render as the display string in JSON output
impl Serialize for NotifierError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NotifierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_errors_map_to_taxonomy() {
        assert_eq!(
            NotifierError::from(SourceError::StoreUnavailable("offline".into())),
            NotifierError::StoreUnavailable("offline".into())
        );
        assert!(matches!(
            NotifierError::from(SourceError::AccessDenied),
            NotifierError::FetchFailed(_)
        ));
    }

    #[test]
    fn test_serializes_as_message() {
        let json = serde_json::to_string(&NotifierError::AuthorizationDenied).unwrap();
        assert_eq!(json, "\"Contacts authorization denied\"");
    }
}
