//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor settings provide one
pub const DEFAULT_FILTER: &str = "contacts_change_notifier=info";

/// Build the filter: `RUST_LOG` if set, otherwise `directives`, otherwise
/// the default.
pub fn env_filter(directives: Option<&str>) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let directives = directives
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directives).unwrap_or_else(|e| {
        eprintln!("Invalid log filter '{}': {}", directives, e);
        EnvFilter::new(DEFAULT_FILTER)
    })
}

/// Install the global fmt subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init_tracing(directives: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(directives))
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing(Some("contacts_change_notifier=debug"));
        init_tracing(None);
        tracing::debug!("[logging] still alive");
    }

    #[test]
    fn test_invalid_directives_fall_back() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = env_filter(Some("contacts_change_notifier=loud"));
        assert_eq!(filter.to_string(), DEFAULT_FILTER);
    }
}
