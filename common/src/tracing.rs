use tracing_subscriber::{EnvFilter, fmt};

/// Initialise the tracing subscriber for a daemon process.
///
/// Also routes `log` records into tracing, so both macro families end up in
/// the same place. Safe to call once per process; logging is inactive before
/// this call.
pub fn init(service: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_log::LogTracer::init().ok();

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    if ::tracing::subscriber::set_global_default(subscriber).is_ok() {
        log::info!("{service} starting");
    }
}
