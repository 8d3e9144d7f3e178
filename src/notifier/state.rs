//! Notifier lifecycle states and the published change batch.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::NotifierError;
use crate::history::ChangeEvent;

/// Topic external change batches are published on
pub const DID_CHANGE_NOTIFICATION: &str = "ContactsChangeNotifier.didChangeNotification";

/// Where the notifier is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NotifierStatus {
    /// Constructed, initialization not started yet
    Uninitialized,
    /// Waiting for contacts permission
    Authorizing,
    /// Baseline established and listening for signals
    Ready,
    /// Initialization failed; no signals are processed
    Failed { error: NotifierError },
    /// Torn down; no signals are processed and nothing is published
    Disposed,
}

impl NotifierStatus {
    /// Initialization has reached an outcome
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Uninitialized | Self::Authorizing)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Authorizing => "authorizing",
            Self::Ready => "ready",
            Self::Failed { .. } => "failed",
            Self::Disposed => "disposed",
        }
    }

    /// Initialization outcome as a result
    pub fn outcome(&self) -> Result<(), NotifierError> {
        match self {
            Self::Ready => Ok(()),
            Self::Failed { error } => Err(error.clone()),
            Self::Disposed => Err(NotifierError::Disposed),
            Self::Uninitialized | Self::Authorizing => Ok(()),
        }
    }
}

/// Batch of external changes, published after a fetch cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactsChanged {
    /// Events in change-log order
    pub events: Vec<ChangeEvent>,
    /// When the fetch cycle completed
    pub completed_at: DateTime<Utc>,
}

impl ContactsChanged {
    pub fn new(events: Vec<ChangeEvent>) -> Self {
        Self {
            events,
            completed_at: Utc::now(),
        }
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.events.iter().map(ChangeEvent::description).collect()
    }
}
