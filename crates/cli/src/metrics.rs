//! Prometheus registry for the command-line client.
//!
//! The transport records into the collectors defined in
//! `posegen_core::metrics`; this module only registers them and renders the
//! text exposition.

use once_cell::sync::Lazy;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::warn;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    for collector in posegen_core::metrics::all_metrics() {
        if let Err(e) = registry.register(collector) {
            warn!("Failed to register metric: {}", e);
        }
    }
    registry
});

/// Encode all registered metrics in the Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
