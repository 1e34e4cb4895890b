//! Integration tests for the weft engine.
//!
//! These exercise the full pipeline through the coordinator: scripted
//! extraction, candidate promotion, snapshot capture, and context assembly.

/// Opt-in log output for debugging test runs (`RUST_LOG=debug cargo test`).
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[path = "integration/test_promotion.rs"]
mod test_promotion;

#[path = "integration/test_assembly.rs"]
mod test_assembly;

#[path = "integration/test_snapshots.rs"]
mod test_snapshots;
