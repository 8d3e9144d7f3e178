//! CLI output handling - change batch receiver loop.
//!
//! Receives published batches from the notifier and renders them as
//! change descriptions or JSON lines.

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::bus::Subscription;
use crate::history::HistoryToken;
use crate::notifier::{ContactsChanged, NotifierStatus};

/// Print batches until `stop` is cancelled, then print whatever is already
/// queued. Returns the number of batches printed.
pub async fn run_change_loop(
    mut changes: Subscription<ContactsChanged>,
    stop: CancellationToken,
    json_mode: bool,
) -> Result<usize> {
    let mut printed = 0;

    loop {
        tokio::select! {
            biased;
            batch = changes.recv() => match batch {
                Some(batch) => {
                    print_batch(&batch, json_mode)?;
                    printed += 1;
                }
                None => break,
            },
            _ = stop.cancelled() => {
                while let Some(batch) = changes.try_recv() {
                    print_batch(&batch, json_mode)?;
                    printed += 1;
                }
                break;
            }
        }
    }

    Ok(printed)
}

fn print_batch(batch: &ContactsChanged, json_mode: bool) -> Result<()> {
    if json_mode {
        let json = serde_json::json!({
            "type": "contacts_changed",
            "completed_at": batch.completed_at,
            "events": batch.events,
        });
        println!("{}", json);
    } else {
        println!("{}", format_batch(batch));
    }
    Ok(())
}

/// Terminal rendering of one batch
fn format_batch(batch: &ContactsChanged) -> String {
    let mut out = format!(
        "[{}] {} external change(s)",
        batch.completed_at.format("%H:%M:%S%.3f"),
        batch.events.len()
    );
    for description in batch.descriptions() {
        out.push_str("\n  - ");
        out.push_str(&description);
    }
    out
}

/// Print the final notifier state.
pub fn print_summary(
    status: &NotifierStatus,
    token: Option<&HistoryToken>,
    batches: usize,
    json_mode: bool,
) -> Result<()> {
    if json_mode {
        let json = serde_json::json!({
            "type": "summary",
            "status": status,
            "batches": batches,
            "token": token,
        });
        println!("{}", json);
    } else {
        println!("Batches published: {}", batches);
        println!("Status: {}", status.name());
        match token {
            Some(token) => println!("Last history token: {}", token),
            None => println!("Last history token: (none)"),
        }
    }
    Ok(())
}
