use tracing::debug;
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

/// HTTP plumbing that floods debug output during a catalog refresh.
const QUIET_TARGETS: [&str; 3] = ["hyper=warn", "reqwest=warn", "h2=warn"];

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("log filter '{filter}' is not valid: {source}")]
    Filter {
        filter: String,
        #[source]
        source: ParseError,
    },
    #[error("tracing subscriber already installed: {0}")]
    AlreadyInstalled(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Where the active log filter came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterOrigin {
    RustLog,
    AppLogLevel,
}

/// Installs the global fmt subscriber. `RUST_LOG` wins over `APP_LOG_LEVEL` when set.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let rust_log = std::env::var("RUST_LOG").ok().filter(|v| !v.trim().is_empty());
    let (filter, origin) = resolve_filter(rust_log.as_deref(), &config.log_level)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .compact()
        .try_init()
        .map_err(TelemetryError::AlreadyInstalled)?;

    debug!(?origin, "log filter installed");
    Ok(())
}

/// Builds the filter from `RUST_LOG` if present, else from the configured level, then
/// caps chatty HTTP crates unless the chosen filter names them itself.
fn resolve_filter(
    rust_log: Option<&str>,
    log_level: &str,
) -> Result<(EnvFilter, FilterOrigin), TelemetryError> {
    let (raw, origin) = match rust_log {
        Some(value) => (value, FilterOrigin::RustLog),
        None => (log_level, FilterOrigin::AppLogLevel),
    };

    let mut filter = EnvFilter::try_new(raw).map_err(|source| TelemetryError::Filter {
        filter: raw.to_string(),
        source,
    })?;

    for quiet in QUIET_TARGETS {
        let target = quiet.split('=').next().unwrap_or(quiet);
        if raw.contains(target) {
            continue;
        }
        let directive: Directive = quiet.parse().map_err(|source| TelemetryError::Filter {
            filter: quiet.to_string(),
            source,
        })?;
        filter = filter.add_directive(directive);
    }

    Ok((filter, origin))
}
