//! CLI simulation runner.
//!
//! Plays a scripted session against the in-memory store: the app saves some
//! contacts itself, other apps save some more, and every batch the notifier
//! publishes is printed.

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::history::{FieldDescriptor, WriteOrigin};

use super::bootstrap::CliContext;
use super::output::{print_summary, run_change_loop};

const SAMPLE_NAMES: &[(&str, &str)] = &[
    ("Ada", "Lovelace"),
    ("Grace", "Hopper"),
    ("Alan", "Turing"),
    ("Katherine", "Johnson"),
    ("Edsger", "Dijkstra"),
    ("Barbara", "Liskov"),
];

/// Author external writes are attributed to
const EXTERNAL_AUTHOR: &str = "com.apple.icloud";

fn sample_name(index: usize) -> (&'static str, &'static str) {
    SAMPLE_NAMES[index % SAMPLE_NAMES.len()]
}

/// Run the simulation and print the outcome.
pub async fn run_simulation(ctx: &CliContext) -> Result<()> {
    let json_mode = ctx.args.json;
    let stop = CancellationToken::new();

    let output_handle: JoinHandle<Result<usize>> = tokio::spawn(run_change_loop(
        ctx.notifier.subscribe(),
        stop.clone(),
        json_mode,
    ));

    ctx.notifier
        .ready()
        .await
        .context("Notifier failed to initialize")?;
    tracing::info!("[cli] Notifier ready, token {:?}", ctx.notifier.current_token());

    let own = WriteOrigin::app(ctx.app_id());
    for i in 0..ctx.args.internal {
        let (given, family) = sample_name(i);
        let id = ctx.store.add_contact(&own, given, family);
        ctx.store.update_contact(&own, &id, &[(FieldDescriptor::new("note"), "saved in app")]);
    }

    let external = WriteOrigin::external(EXTERNAL_AUTHOR);
    let mut last_external = None;
    for i in 0..ctx.args.external {
        let (given, family) = sample_name(ctx.args.internal + i);
        last_external = Some(ctx.store.add_contact(&external, given, family));
    }
    if let Some(id) = last_external {
        ctx.store.delete_contact(&external, &id);
    }

    // Give the listener a moment to pick up the last signals
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    ctx.notifier.idle().await;
    stop.cancel();

    let batches = match output_handle.await {
        Ok(Ok(batches)) => batches,
        Ok(Err(e)) => {
            tracing::warn!("Output handler error: {}", e);
            0
        }
        Err(e) => {
            tracing::warn!("Output handler panicked: {}", e);
            0
        }
    };

    if let Some(error) = ctx.notifier.last_error() {
        tracing::warn!("[cli] Last fetch error: {}", error);
    }

    print_summary(
        &ctx.notifier.status(),
        ctx.notifier.current_token().as_ref(),
        batches,
        json_mode,
    )
}
