//! Cache tunables.
//!
//! Read from the `[cache]` table of `nucache.toml` (or `NUCACHE__CACHE__*`
//! environment variables) and handed to the snapshot service.

use std::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_ROUTE_CACHE_LIMIT: usize = 10_000;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 1_000;

/// Which cache backs the `Elements` level for a given kind of read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementsCacheTarget {
    /// The generation-scoped cache shared by every snapshot on that generation.
    Shared,
    /// The snapshot's own short-lived cache.
    Snapshot,
}

/// Routing matrix for `Elements`-level memoization.
///
/// Reads that are neither previewing nor about members always use the shared
/// cache; the two exceptional cases are configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementsCachePolicy {
    pub when_previewing: ElementsCacheTarget,
    pub for_members: ElementsCacheTarget,
}

impl Default for ElementsCachePolicy {
    fn default() -> Self {
        Self {
            when_previewing: ElementsCacheTarget::Snapshot,
            for_members: ElementsCacheTarget::Snapshot,
        }
    }
}

impl ElementsCachePolicy {
    /// Resolve the target for one read. Member rules win over preview rules.
    pub fn target(&self, previewing: bool, is_member: bool) -> ElementsCacheTarget {
        if is_member {
            self.for_members
        } else if previewing {
            self.when_previewing
        } else {
            ElementsCacheTarget::Shared
        }
    }
}

/// Cache configuration from `nucache.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached routes per preview flag.
    pub route_cache_limit: usize,
    /// Omit the top-level node's segment from routes.
    pub hide_top_level_node: bool,
    /// Let previewing reads share the generation-scoped elements cache.
    pub full_cache_when_previewing: bool,
    /// Keep member `Elements` values out of the shared cache.
    pub members_use_snapshot_cache: bool,
    /// Maximum events per consumption batch.
    pub consume_batch_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            route_cache_limit: DEFAULT_ROUTE_CACHE_LIMIT,
            hide_top_level_node: true,
            full_cache_when_previewing: false,
            members_use_snapshot_cache: true,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            route_cache_limit: settings.route_cache_limit.get(),
            hide_top_level_node: settings.hide_top_level_node,
            full_cache_when_previewing: settings.full_cache_when_previewing,
            members_use_snapshot_cache: settings.members_use_snapshot_cache,
            consume_batch_limit: settings.consume_batch_limit.get(),
        }
    }
}

impl CacheConfig {
    /// Returns the route cache limit as NonZeroUsize, clamping to 1 if zero.
    pub fn route_cache_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.route_cache_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the batch limit, clamping to 1 if zero.
    pub fn consume_batch_limit_non_zero(&self) -> usize {
        self.consume_batch_limit.max(1)
    }

    pub fn elements_policy(&self) -> ElementsCachePolicy {
        let target = |shared: bool| {
            if shared {
                ElementsCacheTarget::Shared
            } else {
                ElementsCacheTarget::Snapshot
            }
        };
        ElementsCachePolicy {
            when_previewing: target(self.full_cache_when_previewing),
            for_members: target(!self.members_use_snapshot_cache),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.route_cache_limit, 10_000);
        assert!(config.hide_top_level_node);
        assert!(!config.full_cache_when_previewing);
        assert!(config.members_use_snapshot_cache);
        assert_eq!(config.consume_batch_limit, 1_000);
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            route_cache_limit: 0,
            consume_batch_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.route_cache_limit_non_zero().get(), 1);
        assert_eq!(config.consume_batch_limit_non_zero(), 1);
    }

    #[test]
    fn default_policy_keeps_previews_and_members_out_of_shared_cache() {
        let policy = CacheConfig::default().elements_policy();
        assert_eq!(policy.target(false, false), ElementsCacheTarget::Shared);
        assert_eq!(policy.target(true, false), ElementsCacheTarget::Snapshot);
        assert_eq!(policy.target(false, true), ElementsCacheTarget::Snapshot);
    }

    #[test]
    fn full_cache_when_previewing_shares_preview_values() {
        let config = CacheConfig {
            full_cache_when_previewing: true,
            ..Default::default()
        };
        let policy = config.elements_policy();
        assert_eq!(policy.target(true, false), ElementsCacheTarget::Shared);
        assert_eq!(policy.target(true, true), ElementsCacheTarget::Snapshot);
    }
}
