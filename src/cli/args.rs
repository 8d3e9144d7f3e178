//! CLI argument parsing using clap.
//!
//! Defines the command-line interface for contacts-notifier-cli.

use clap::Parser;
use std::path::PathBuf;

use crate::lifecycle::LifecyclePhase;

/// Contacts notifier CLI - simulated contact store session
#[derive(Parser, Debug, Clone)]
#[command(name = "contacts-notifier-cli")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Settings file (default: ~/.contacts-notifier/settings.toml)
    #[arg(short = 's', long)]
    pub settings: Option<PathBuf>,

    /// Directory for the local token file (overrides settings)
    #[arg(short = 'd', long, env = "CONTACTS_NOTIFIER_DATA")]
    pub data_dir: Option<PathBuf>,

    /// Suite name namespacing the local token file (overrides settings)
    #[arg(long)]
    pub suite: Option<String>,

    /// Lifecycle phase the app is in while the writes happen
    ///
    /// Options: active, inactive, background
    #[arg(short = 'p', long, default_value = "background")]
    pub phase: LifecyclePhase,

    /// Number of contacts written by other apps
    #[arg(short = 'x', long, default_value_t = 3)]
    pub external: usize,

    /// Number of contacts written by this app
    #[arg(short = 'i', long, default_value_t = 2)]
    pub internal: usize,

    /// Output batches as JSON lines (for scripting/parsing)
    #[arg(long)]
    pub json: bool,

    /// Show verbose output (debug information)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_values() {
        let args = Args::parse_from(["contacts-notifier-cli"]);
        assert_eq!(args.settings, None);
        assert_eq!(args.suite, None);
        assert_eq!(args.phase, LifecyclePhase::Background);
        assert_eq!(args.external, 3);
        assert_eq!(args.internal, 2);
        assert!(!args.json);
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_phase_and_counts() {
        let args = Args::parse_from([
            "contacts-notifier-cli",
            "--phase",
            "active",
            "-x",
            "5",
            "--internal",
            "0",
        ]);
        assert_eq!(args.phase, LifecyclePhase::Active);
        assert_eq!(args.external, 5);
        assert_eq!(args.internal, 0);
    }

    #[test]
    fn test_args_rejects_unknown_phase() {
        assert!(Args::try_parse_from(["contacts-notifier-cli", "--phase", "suspended"]).is_err());
    }

    #[test]
    fn test_args_storage_overrides() {
        let args = Args::parse_from([
            "contacts-notifier-cli",
            "--data-dir",
            "/tmp/contacts",
            "--suite",
            "group.example",
            "--json",
        ]);
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/contacts")));
        assert_eq!(args.suite.as_deref(), Some("group.example"));
        assert!(args.json);
    }
}
