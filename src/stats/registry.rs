//! Stats registry keyed by query type and backend bucket

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::query::QueryType;

/// Backend-specific part of a stat key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatBucket {
    /// A design document view
    View { design_doc: String, view: String },
    /// The declarative backend, bucketed by query type alone
    Declarative,
}

/// Identifies one pair of counters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatKey {
    pub query_type: QueryType,
    pub bucket: StatBucket,
}

impl StatKey {
    pub fn view(
        query_type: QueryType,
        design_doc: impl Into<String>,
        view: impl Into<String>,
    ) -> Self {
        Self {
            query_type,
            bucket: StatBucket::View {
                design_doc: design_doc.into(),
                view: view.into(),
            },
        }
    }

    pub fn declarative(query_type: QueryType) -> Self {
        Self {
            query_type,
            bucket: StatBucket::Declarative,
        }
    }

    fn prefix(&self) -> String {
        match &self.bucket {
            StatBucket::View { design_doc, view } => {
                format!("{}.{}.{}", design_doc, view, self.query_type)
            }
            StatBucket::Declarative => self.query_type.to_string(),
        }
    }

    /// Exposed name of the issued counter
    pub fn query_count_name(&self) -> String {
        format!("{}.query_count", self.prefix())
    }

    /// Exposed name of the error counter
    pub fn error_count_name(&self) -> String {
        format!("{}.query_error_count", self.prefix())
    }
}

/// Issued/errored counters for one stat key
#[derive(Debug, Default)]
pub struct QueryCounters {
    issued: AtomicU64,
    errors: AtomicU64,
}

impl QueryCounters {
    pub fn record_issued(&self) {
        self.issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn counts(&self) -> StatCounts {
        StatCounts {
            issued: self.issued(),
            errors: self.errors(),
        }
    }
}

/// Point-in-time value of one counter pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatCounts {
    pub issued: u64,
    pub errors: u64,
}

/// Registry of query counters.
///
/// The map lock is only taken to find or create a counter cell; increments
/// go straight to the atomics. Dispatchers resolve their cells once at
/// construction and never touch the lock while a query runs.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    counters: RwLock<HashMap<StatKey, Arc<QueryCounters>>>,
}

impl StatsRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counters for `key`, creating them at zero if missing
    pub fn register(&self, key: &StatKey) -> Arc<QueryCounters> {
        if let Some(counters) = self.lookup(key) {
            return counters;
        }
        let mut map = self
            .counters
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(map.entry(key.clone()).or_default())
    }

    fn lookup(&self, key: &StatKey) -> Option<Arc<QueryCounters>> {
        let map = self
            .counters
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.get(key).cloned()
    }

    /// Increment the issued counter for `key`
    pub fn increment_issued(&self, key: &StatKey) {
        self.register(key).record_issued();
    }

    /// Increment the error counter for `key`
    pub fn increment_error(&self, key: &StatKey) {
        self.register(key).record_error();
    }

    /// Current counts for `key`; unknown keys read as zero
    pub fn get(&self, key: &StatKey) -> StatCounts {
        self.lookup(key)
            .map(|counters| counters.counts())
            .unwrap_or_default()
    }

    pub fn issued(&self, key: &StatKey) -> u64 {
        self.get(key).issued
    }

    pub fn errors(&self, key: &StatKey) -> u64 {
        self.get(key).errors
    }

    /// All counters by exposed name, sorted
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        let map = self
            .counters
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut out = BTreeMap::new();
        for (key, counters) in map.iter() {
            out.insert(key.query_count_name(), counters.issued());
            out.insert(key.error_count_name(), counters.errors());
        }
        out
    }

    /// Snapshot rendered as a JSON object for the monitoring surface
    pub fn to_json(&self) -> String {
        serde_json::Value::from(
            self.snapshot()
                .into_iter()
                .map(|(name, value)| (name, serde_json::Value::from(value)))
                .collect::<serde_json::Map<_, _>>(),
        )
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels_view_key() -> StatKey {
        StatKey::view(QueryType::Channels, "sync_gateway_2.1", "channels")
    }

    #[test]
    fn test_new_registry_has_zero_values() {
        let registry = StatsRegistry::new();
        assert_eq!(registry.get(&channels_view_key()), StatCounts::default());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_increment_counters() {
        let registry = StatsRegistry::new();
        let key = StatKey::declarative(QueryType::Sequences);

        registry.increment_issued(&key);
        registry.increment_issued(&key);
        registry.increment_error(&key);

        assert_eq!(registry.issued(&key), 2);
        assert_eq!(registry.errors(&key), 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let registry = StatsRegistry::new();
        let channels = StatKey::declarative(QueryType::Channels);
        let sequences = StatKey::declarative(QueryType::Sequences);
        let view = channels_view_key();

        registry.increment_issued(&channels);

        assert_eq!(registry.issued(&channels), 1);
        assert_eq!(registry.issued(&sequences), 0);
        assert_eq!(registry.issued(&view), 0);
    }

    #[test]
    fn test_register_returns_shared_cell() {
        let registry = StatsRegistry::new();
        let key = channels_view_key();

        let cell = registry.register(&key);
        cell.record_issued();
        registry.increment_issued(&key);

        assert_eq!(cell.issued(), 2);
        assert_eq!(registry.issued(&key), 2);
    }

    #[test]
    fn test_stat_names() {
        let view = channels_view_key();
        assert_eq!(
            view.query_count_name(),
            "sync_gateway_2.1.channels.channels.query_count"
        );
        assert_eq!(
            view.error_count_name(),
            "sync_gateway_2.1.channels.channels.query_error_count"
        );

        let declarative = StatKey::declarative(QueryType::RoleAccess);
        assert_eq!(declarative.query_count_name(), "roleAccess.query_count");
        assert_eq!(declarative.error_count_name(), "roleAccess.query_error_count");
    }

    #[test]
    fn test_to_json() {
        let registry = StatsRegistry::new();
        let key = StatKey::declarative(QueryType::Channels);
        registry.increment_issued(&key);

        let parsed: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(parsed["channels.query_count"], 1);
        assert_eq!(parsed["channels.query_error_count"], 0);
    }

    #[test]
    fn test_thread_safety() {
        use std::thread;

        let registry = Arc::new(StatsRegistry::new());
        let key = StatKey::declarative(QueryType::Channels);
        let mut handles = vec![];

        for _ in 0..10 {
            let reg = Arc::clone(&registry);
            let key = key.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    reg.increment_issued(&key);
                    reg.increment_error(&key);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.issued(&key), 1000);
        assert_eq!(registry.errors(&key), 1000);
    }

    #[test]
    fn test_monotonic_increase() {
        let registry = StatsRegistry::new();
        let key = channels_view_key();

        let mut prev = registry.issued(&key);
        for _ in 0..10 {
            registry.increment_issued(&key);
            let current = registry.issued(&key);
            assert!(current > prev);
            prev = current;
        }
    }
}
