//! Engine configuration, read from the environment.
//!
//! Mirrors the recognized options: partitioning strategy, LATERAL-join mode,
//! prepared-statement cache size, and pool tuning. Library code never reads
//! `std::env` directly outside this module — callers build an [`EngineConfig`]
//! once at startup and pass it through.

use std::time::Duration;

/// How the `components` parent table is partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStrategy {
    /// LIST partitioning by `type_id` — child tables can be addressed by name.
    List,
    /// HASH partitioning — only the parent table is addressable.
    Hash,
}

impl PartitionStrategy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "list" => Some(Self::List),
            "hash" => Some(Self::Hash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub partition_strategy: PartitionStrategy,
    pub use_direct_partition: bool,
    pub use_lateral_joins: bool,
    pub query_cache_size: usize,
    pub db_max_connections: usize,
    pub db_idle_timeout: Duration,
    pub db_connection_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            partition_strategy: PartitionStrategy::List,
            use_direct_partition: true,
            use_lateral_joins: false,
            query_cache_size: 100,
            db_max_connections: 16,
            db_idle_timeout: Duration::from_secs(300),
            db_connection_url: String::new(),
        }
    }
}

impl EngineConfig {
    /// Whether direct-partition addressing is actually usable: requires both
    /// LIST partitioning and the feature flag.
    pub fn direct_partition_available(&self) -> bool {
        self.use_direct_partition && self.partition_strategy == PartitionStrategy::List
    }

    /// Build a config from environment variables, falling back to defaults for
    /// anything absent or unparsable.
    pub fn from_env() -> Self {
        let default = Self::default();

        let partition_strategy = std::env::var("PARTITION_STRATEGY")
            .ok()
            .and_then(|v| PartitionStrategy::parse(&v))
            .unwrap_or(default.partition_strategy);

        let use_direct_partition = std::env::var("USE_DIRECT_PARTITION")
            .ok()
            .and_then(|v| parse_bool(&v))
            .unwrap_or(default.use_direct_partition);

        let use_lateral_joins = std::env::var("USE_LATERAL_JOINS")
            .ok()
            .and_then(|v| parse_bool(&v))
            .unwrap_or(default.use_lateral_joins);

        let query_cache_size = std::env::var("QUERY_CACHE_SIZE")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default.query_cache_size);

        let db_max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default.db_max_connections);

        let db_idle_timeout = std::env::var("DB_IDLE_TIMEOUT")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(default.db_idle_timeout);

        let db_connection_url =
            std::env::var("DB_CONNECTION_URL").unwrap_or(default.db_connection_url);

        Self {
            partition_strategy,
            use_direct_partition,
            use_lateral_joins,
            query_cache_size,
            db_max_connections,
            db_idle_timeout,
            db_connection_url,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_list_partitioning_with_direct_access() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.partition_strategy, PartitionStrategy::List);
        assert!(cfg.direct_partition_available());
    }

    #[test]
    fn hash_partitioning_disables_direct_access_regardless_of_flag() {
        let mut cfg = EngineConfig::default();
        cfg.partition_strategy = PartitionStrategy::Hash;
        cfg.use_direct_partition = true;
        assert!(!cfg.direct_partition_available());
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
