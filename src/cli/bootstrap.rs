//! CLI bootstrap - wire a notifier to a simulated contact store.
//!
//! This module provides `CliContext`, holding the same pieces an app would:
//! settings, a contact store and the notifier itself.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::bus::EventBus;
use crate::history::MemoryContactStore;
use crate::lifecycle::AppLifecycle;
use crate::logging;
use crate::notifier::ContactsChangeNotifier;
use crate::settings::{NotifierSettings, SettingsManager};

use super::args::Args;

/// Identifier the simulated app writes under when settings don't name one
pub const SIMULATED_APP_ID: &str = "com.example.contacts-app";

/// Context for CLI execution containing all initialized services.
pub struct CliContext {
    /// Effective settings, with command-line overrides applied
    pub settings: NotifierSettings,

    /// Simulated contact store
    pub store: Arc<MemoryContactStore>,

    pub notifier: ContactsChangeNotifier,

    /// Command-line arguments
    pub args: Args,
}

impl CliContext {
    /// Identifier the app's own writes are attributed to
    pub fn app_id(&self) -> &str {
        self.settings
            .fetch
            .app_id
            .as_deref()
            .unwrap_or(SIMULATED_APP_ID)
    }

    /// Dispose the notifier.
    pub async fn shutdown(self) -> Result<()> {
        self.notifier.idle().await;
        self.notifier.dispose();
        Ok(())
    }
}

/// Load settings, apply overrides, and start the notifier.
pub async fn initialize(args: &Args) -> Result<CliContext> {
    let mut settings = load_settings(args).await?;
    apply_overrides(&mut settings, args);

    let filter = if args.verbose {
        "contacts_change_notifier=debug"
    } else {
        settings.logging.filter.as_str()
    };
    logging::init_tracing(Some(filter));

    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| settings.storage.data_dir());
    if args.verbose {
        eprintln!("[cli] Data directory: {}", data_dir.display());
        eprintln!("[cli] Phase: {}", args.phase.as_str());
    }

    let signals = EventBus::default();
    let store = Arc::new(MemoryContactStore::new(signals.clone()));

    let notifier = ContactsChangeNotifier::builder(store.clone(), signals)
        .token_store(settings.storage.open(Some(&data_dir)))
        .fetch_spec(settings.fetch.to_fetch_spec())
        .lifecycle(Arc::new(AppLifecycle::new(args.phase)))
        .spawn();

    Ok(CliContext {
        settings,
        store,
        notifier,
        args: args.clone(),
    })
}

async fn load_settings(args: &Args) -> Result<NotifierSettings> {
    let manager = match &args.settings {
        Some(path) => SettingsManager::with_path(path.clone())
            .await
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => {
            let manager = SettingsManager::new()
                .await
                .context("Failed to initialize settings manager")?;

            // Creates the template on first run
            if let Err(e) = manager.ensure_settings_file().await {
                tracing::warn!("Failed to create settings template: {}", e);
            }
            manager
        }
    };
    Ok(manager.get().await)
}

fn apply_overrides(settings: &mut NotifierSettings, args: &Args) {
    if let Some(suite) = &args.suite {
        settings.storage.suite_name = Some(suite.clone());
    }
    if settings.fetch.app_id.is_none() {
        settings.fetch.app_id = Some(SIMULATED_APP_ID.to_string());
    }
}
