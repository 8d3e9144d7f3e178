//! CLI module for headless runs of the notifier.
//!
//! The CLI drives a notifier over the in-memory contact store, so the whole
//! flow (echo suppression, token bookkeeping, batch delivery) can be
//! watched from a terminal or scripted.
//!
//! ```text
//! +-----------------+     +------------------+     +---------------+
//! | runner.rs       | --> | ContactsChange-  | --> | output.rs     |
//! | (store writes)  |     | Notifier         |     | (print/JSON)  |
//! +-----------------+     +------------------+     +---------------+
//! ```

mod args;
mod bootstrap;
mod output;
mod runner;

pub use args::Args;
pub use bootstrap::{initialize, CliContext, SIMULATED_APP_ID};
pub use output::{print_summary, run_change_loop};
pub use runner::run_simulation;
