//! Logging glue.
//!
//! The teacher crate ships its own structured event logger
//! (`timely_logging`/`timely_communication::logging`) purely for dataflow
//! operator instrumentation. That machinery doesn't fit this kernel's
//! request/response and epoch-boundary events, so we use `tracing` instead,
//! the way the rest of this retrieval pack's process-oriented crates do.
//! Spans are opened at every suspension point named in spec §5 (mutex ops on
//! a DISTANT node, `synchronize`, `distribute`, `terminate`) so a trace
//! reconstructs the epoch-by-epoch story of one process.

/// Installs a `tracing_subscriber::fmt` subscriber reading its filter from
/// `RUST_LOG`, falling back to `config.log_filter`. Only available with the
/// `fmt-logging` feature; library consumers with their own subscriber should
/// not enable it and should just rely on the `tracing` events emitted
/// throughout the crate.
#[cfg(feature = "fmt-logging")]
pub fn init(config: &crate::config::RuntimeConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// A span tag identifying which rank emitted an event; attached to every
/// span opened at a suspension point.
pub(crate) fn rank_span(name: &'static str, rank: fpmas_transport::Rank) -> tracing::Span {
    tracing::info_span!("fpmas", op = name, rank = rank)
}
