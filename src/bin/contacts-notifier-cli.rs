//! Contacts notifier CLI - headless simulation of a contacts change session
//!
//! Runs a notifier against an in-memory contact store, performs a scripted
//! mix of the app's own writes and writes by other apps, and prints every
//! batch the notifier publishes.
//!
//! # Usage
//!
//! ```bash
//! # Build the CLI binary
//! cargo build --features cli --bin contacts-notifier-cli
//!
//! # Background session: only the other apps' changes are reported
//! ./target/debug/contacts-notifier-cli --phase background -x 3 -i 2
//!
//! # Foreground session: nothing is reported, the token still advances
//! ./target/debug/contacts-notifier-cli --phase active
//!
//! # JSON output for scripting
//! ./target/debug/contacts-notifier-cli --json | jq .
//!
//! # Keep the token in a scratch directory; a second run resumes from it
//! ./target/debug/contacts-notifier-cli --data-dir /tmp/contacts --suite demo
//! ```

use anyhow::Result;
use clap::Parser;

use contacts_change_notifier::cli::{initialize, run_simulation, Args};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let ctx = initialize(&args).await?;

    let result = run_simulation(&ctx).await;

    ctx.shutdown().await?;

    result
}
