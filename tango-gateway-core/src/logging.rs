//! Logging bootstrap. Adapted from the teacher's
//! `telemetry::tracing::init_tracing_with_otel`, minus the OpenTelemetry
//! layer — this gateway has no tracing/metrics export surface (`spec.md`
//! has no observability section; SPEC_FULL doesn't add one, see DESIGN.md).

use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber. Respects `RUST_LOG` if set,
/// otherwise defaults to `info`. Must be called once, before any other
/// gateway code runs, matching the teacher's `main::init_tracing` ordering.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init()
        .map_err(|e| e.into())
}
