//! Contact store change history: tokens, events, fetch requests, and the
//! store seam the notifier reads from.

pub mod events;
pub mod fetch;
pub mod memory;
pub mod source;
pub mod token;

pub use events::{ChangeEvent, ContactSnapshot};
pub use fetch::{FetchSpec, FieldDescriptor};
pub use memory::{Authorization, MemoryContactStore, WriteOrigin};
pub use source::{ChangeHistory, ChangeHistorySource, SourceError};
pub use token::HistoryToken;
