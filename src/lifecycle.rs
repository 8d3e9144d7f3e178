//! Host process lifecycle phase.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Where the host app is in its foreground/background cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Foreground and receiving input
    Active,
    /// Transitioning, e.g. being opened
    Inactive,
    /// Running in the background, e.g. a background refresh
    Background,
}

impl LifecyclePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Background => "background",
        }
    }
}

impl std::str::FromStr for LifecyclePhase {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "background" => Ok(Self::Background),
            other => Err(format!(
                "unsupported lifecycle phase `{other}`; expected active|inactive|background"
            )),
        }
    }
}

/// Source of the current lifecycle phase
pub trait LifecycleProvider: Send + Sync + 'static {
    fn phase(&self) -> LifecyclePhase;
}

/// Lifecycle phase set by the host as it moves between states.
///
/// Clones share the same phase.
#[derive(Debug, Clone)]
pub struct AppLifecycle {
    phase: Arc<RwLock<LifecyclePhase>>,
}

impl AppLifecycle {
    pub fn new(phase: LifecyclePhase) -> Self {
        Self {
            phase: Arc::new(RwLock::new(phase)),
        }
    }

    pub fn set_phase(&self, phase: LifecyclePhase) {
        *self.phase.write() = phase;
    }
}

impl Default for AppLifecycle {
    fn default() -> Self {
        Self::new(LifecyclePhase::Active)
    }
}

impl LifecycleProvider for AppLifecycle {
    fn phase(&self) -> LifecyclePhase {
        *self.phase.read()
    }
}
