//! Cross-call tuning knobs for a [`crate::Trellis`] handle.
//!
//! Every RPC method takes `projectRoot` explicitly, so this struct never
//! carries a root path — only the things that persist across calls on
//! the same handle: cache sizing, the mtime-cache TTL for hierarchical
//! lookups, and the MCP-vs-CLI `planning/` subdirectory toggle.

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::kind_cache;

#[derive(Debug, Clone)]
pub struct TrellisConfig {
    /// MCP-side calls always resolve to `root/planning` and create it on
    /// demand; CLI-side calls treat `root` itself as the planning
    /// directory when it already contains `projects/`.
    pub force_planning_subdir: bool,
    /// Capacity of the kind-inference LRU cache.
    pub kind_cache_capacity: NonZeroUsize,
    /// How long a cached hierarchical lookup is trusted before its mtime
    /// is re-checked against disk.
    pub hierarchical_mtime_ttl: Duration,
}

const DEFAULT_MTIME_TTL_SECS: u64 = 60;

impl Default for TrellisConfig {
    fn default() -> Self {
        Self {
            force_planning_subdir: false,
            kind_cache_capacity: NonZeroUsize::new(kind_cache::DEFAULT_CAPACITY).unwrap(),
            hierarchical_mtime_ttl: Duration::from_secs(DEFAULT_MTIME_TTL_SECS),
        }
    }
}

impl TrellisConfig {
    /// Load configuration from environment variables, falling back to
    /// [`TrellisConfig::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let kind_cache_capacity = std::env::var("TRELLIS_KIND_CACHE_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .and_then(NonZeroUsize::new)
            .unwrap_or(defaults.kind_cache_capacity);

        let hierarchical_mtime_ttl = std::env::var("TRELLIS_MTIME_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.hierarchical_mtime_ttl);

        let force_planning_subdir = std::env::var("TRELLIS_FORCE_PLANNING_SUBDIR")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.force_planning_subdir);

        Self {
            force_planning_subdir,
            kind_cache_capacity,
            hierarchical_mtime_ttl,
        }
    }
}
