//! Contact store seam: authorization, current position and change fetches.

use async_trait::async_trait;
use thiserror::Error;

use super::events::ChangeEvent;
use super::fetch::FetchSpec;
use super::token::HistoryToken;

/// Errors reported by a contact store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Access to contacts denied")]
    AccessDenied,

    #[error("Contact store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid history token: {0}")]
    InvalidToken(String),
}

/// Result of one fetch: the events after the starting token, in log order,
/// and the token for the end of the log at fetch time.
///
/// Events are produced lazily and can be consumed once; fetch again to
/// restart.
pub struct ChangeHistory {
    events: Box<dyn Iterator<Item = ChangeEvent> + Send>,
    token: HistoryToken,
}

impl ChangeHistory {
    pub fn new<I>(events: I, token: HistoryToken) -> Self
    where
        I: IntoIterator<Item = ChangeEvent>,
        I::IntoIter: Send + 'static,
    {
        Self {
            events: Box::new(events.into_iter()),
            token,
        }
    }

    pub fn token(&self) -> &HistoryToken {
        &self.token
    }

    /// Drain the events, returning them with the end token.
    pub fn collect(self) -> (Vec<ChangeEvent>, HistoryToken) {
        (self.events.collect(), self.token)
    }
}

impl std::fmt::Debug for ChangeHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeHistory")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// The platform contact store as seen by the notifier.
///
/// # Object Safety
/// Object-safe; used as `Arc<dyn ChangeHistorySource>`.
///
/// Implementations backed by blocking IPC should move that work off the
/// async workers (e.g. `tokio::task::spawn_blocking`).
#[async_trait]
pub trait ChangeHistorySource: Send + Sync + 'static {
    /// Ask for contacts permission. May wait indefinitely for the user.
    async fn request_access(&self) -> Result<(), SourceError>;

    /// Cheap read that must happen once before the store posts change
    /// signals to this process.
    async fn wake(&self);

    /// Token for the end of the change log right now.
    async fn current_token(&self) -> Result<HistoryToken, SourceError>;

    /// Changes after `spec.starting_token`, or a full resync when absent.
    async fn fetch(&self, spec: FetchSpec) -> Result<ChangeHistory, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_history_collects_in_order() {
        let events = vec![
            ChangeEvent::Deleted {
                identifier: "a".into(),
            },
            ChangeEvent::Deleted {
                identifier: "b".into(),
            },
        ];
        let history = ChangeHistory::new(events.clone(), HistoryToken::new(vec![9u8]));
        assert_eq!(history.token(), &HistoryToken::new(vec![9u8]));
        let (collected, token) = history.collect();
        assert_eq!(collected, events);
        assert_eq!(token, HistoryToken::new(vec![9u8]));
    }
}
