//! Tracing subscriber setup.

use crate::FormConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a formatted, level-filtered subscriber as the global default.
///
/// # Parameters
///
/// * `config` - Configuration carrying the `trace_level` filter directive
///
/// # Initialization Behavior
///
/// - Level defaults to `"info"` when `trace_level` is unset
/// - Idempotent: only the first call takes effect, later calls (or a
///   subscriber installed by the host) are left alone
///
/// # Example
///
/// ```rust
/// use formstate::observability::init_tracing;
/// use formstate::FormConfig;
///
/// let config = FormConfig {
///     trace_level: Some("debug".to_string()),
///     ..Default::default()
/// };
///
/// init_tracing(&config);
///
/// tracing::debug!("tracing is now active");
/// ```
pub fn init_tracing(config: &FormConfig) {
    let level = config
        .trace_level
        .clone()
        .unwrap_or_else(|| "info".to_string());

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(tracing_subscriber::fmt::layer().with_target(true));

    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_harmless() {
        let config = FormConfig {
            trace_level: Some("formstate=trace".to_string()),
            ..FormConfig::default()
        };
        init_tracing(&config);
        init_tracing(&FormConfig::default());
        tracing::trace!("still running");
    }
}
