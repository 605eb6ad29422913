//! Query stats for syncdb
//!
//! - Two counters per stat key: issued and errored
//! - Monotonic increase, never reset while the registry lives
//! - Thread-safe, lock-free on the query path
//!
//! A registry is owned by the database and handed to its dispatcher, so
//! tests construct a fresh one each time.

mod registry;

pub use registry::{QueryCounters, StatBucket, StatCounts, StatKey, StatsRegistry};
