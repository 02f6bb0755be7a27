//! Governance engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Capacity limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum entries in each bounded cache.
    pub max_cache_size: usize,
    /// Maximum object payload size in bytes.
    pub max_object_data_size: usize,
    /// Quarantine attempts per masternode outpoint before the object is re-requested instead.
    pub max_orphan_objects_per_masternode: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_cache_size: 1_000_000,
            max_object_data_size: 16 * 1024, // 16 KiB
            max_orphan_objects_per_masternode: 10,
        }
    }
}

/// Timing policy, all in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// How far in the future an object timestamp may be.
    pub max_time_future_deviation: i64,
    /// Margin before the future bound inside which objects get a second relay.
    pub reliable_propagation_time: i64,
    /// Watchdog lifetime.
    pub watchdog_expiration_time: i64,
    /// Grace period between marking an object and erasing it.
    pub deletion_delay: i64,
    /// Lifetime of quarantined objects and orphan votes.
    pub orphan_expiration_time: i64,
    /// Period of the background maintenance task.
    pub maintenance_interval: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            max_time_future_deviation: 60 * 60,
            reliable_propagation_time: 60,
            watchdog_expiration_time: 2 * 60 * 60,
            deletion_delay: 10 * 60,
            orphan_expiration_time: 10 * 60,
            maintenance_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Per-masternode submission rate limits for triggers and watchdogs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether rate checks run at all.
    pub enabled: bool,
    /// Blocks per superblock cycle.
    pub superblock_cycle_blocks: i64,
    /// Target seconds between blocks.
    pub target_spacing_secs: i64,
    /// Watchdog rate window in seconds.
    pub watchdog_window: i64,
    /// Submissions allowed per window.
    pub max_submissions_per_window: u32,
    /// Multiplier applied to the allowed rate.
    pub fudge_factor: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            superblock_cycle_blocks: 16_616,
            target_spacing_secs: 150,
            watchdog_window: 60 * 60,
            max_submissions_per_window: 2,
            fudge_factor: 1.1,
        }
    }
}

/// Peer sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Oldest protocol version allowed to request governance data.
    pub min_peer_proto_version: u32,
    /// Oldest protocol version that understands filtered sync requests.
    pub filter_proto_version: u32,
    /// False positive rate of vote filters.
    pub filter_fp_rate: f64,
    /// Elements a vote filter is sized for.
    pub filter_elements: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_peer_proto_version: 70_208,
            filter_proto_version: 70_208,
            filter_fp_rate: 0.001,
            filter_elements: 20_000,
        }
    }
}

/// Vote tallying and penalties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingConfig {
    /// Lower bound on the absolute vote requirement.
    pub min_quorum: usize,
    /// Minimum seconds between two votes of a masternode on one signal.
    pub vote_update_min: i64,
    /// Score applied to peers relaying invalid votes.
    pub invalid_vote_penalty: u32,
    /// Score applied to peers relaying invalid objects.
    pub invalid_object_penalty: u32,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            min_quorum: 10,
            vote_update_min: 60 * 60,
            invalid_vote_penalty: 20,
            invalid_object_penalty: 20,
        }
    }
}

/// Main governance configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Capacity limits.
    pub limits: LimitsConfig,
    /// Timing policy.
    pub timing: TimingConfig,
    /// Submission rate limits.
    pub rate_limit: RateLimitConfig,
    /// Peer sync settings.
    pub sync: SyncConfig,
    /// Vote tallying and penalties.
    pub voting: VotingConfig,
}

impl GovernanceConfig {
    /// Create a new builder for governance configuration.
    #[must_use]
    pub fn builder() -> GovernanceConfigBuilder {
        GovernanceConfigBuilder::default()
    }

    /// Length of one superblock cycle in seconds.
    #[must_use]
    pub const fn superblock_cycle_seconds(&self) -> i64 {
        self.rate_limit.superblock_cycle_blocks * self.rate_limit.target_spacing_secs
    }
}

/// Builder for `GovernanceConfig`.
#[derive(Debug, Clone, Default)]
pub struct GovernanceConfigBuilder {
    config: GovernanceConfig,
}

impl GovernanceConfigBuilder {
    /// Set capacity limits.
    #[must_use]
    pub fn limits(mut self, config: LimitsConfig) -> Self {
        self.config.limits = config;
        self
    }

    /// Set timing policy.
    #[must_use]
    pub fn timing(mut self, config: TimingConfig) -> Self {
        self.config.timing = config;
        self
    }

    /// Set rate limits.
    #[must_use]
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.config.rate_limit = config;
        self
    }

    /// Set sync settings.
    #[must_use]
    pub fn sync(mut self, config: SyncConfig) -> Self {
        self.config.sync = config;
        self
    }

    /// Set voting rules.
    #[must_use]
    pub fn voting(mut self, config: VotingConfig) -> Self {
        self.config.voting = config;
        self
    }

    /// Set the bounded cache capacity.
    #[must_use]
    pub const fn max_cache_size(mut self, size: usize) -> Self {
        self.config.limits.max_cache_size = size;
        self
    }

    /// Set the deletion delay in seconds.
    #[must_use]
    pub const fn deletion_delay(mut self, secs: i64) -> Self {
        self.config.timing.deletion_delay = secs;
        self
    }

    /// Set the minimum quorum.
    #[must_use]
    pub const fn min_quorum(mut self, quorum: usize) -> Self {
        self.config.voting.min_quorum = quorum;
        self
    }

    /// Set the minimum seconds between vote updates.
    #[must_use]
    pub const fn vote_update_min(mut self, secs: i64) -> Self {
        self.config.voting.vote_update_min = secs;
        self
    }

    /// Enable or disable rate checks.
    #[must_use]
    pub const fn rate_checks_enabled(mut self, enabled: bool) -> Self {
        self.config.rate_limit.enabled = enabled;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> GovernanceConfig {
        self.config
    }
}
