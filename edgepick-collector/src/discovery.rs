//! Collector identity.
//!
//! The source id keys every batch this host publishes and must match the
//! host's inventory id for its samples to count in selection.

use edgepick_core::config::CollectorConf;
use tracing::{info, warn};

/// Configured source id, or the machine hostname.
pub fn resolve_source(conf: &CollectorConf) -> Option<String> {
    if let Some(source) = conf.source.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return Some(source.to_string());
    }

    let hostname = gethostname::gethostname().to_string_lossy().trim().to_string();
    if hostname.is_empty() {
        warn!("no source configured and hostname is empty");
        return None;
    }
    info!(%hostname, "no source configured, using hostname");
    Some(hostname)
}
