//! Core query types

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::{QueryError, QueryResult};

/// Channel name that addresses the star partition
pub const STAR_CHANNEL: &str = "*";

/// Logical query shapes served by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryType {
    /// Documents in a channel (or the star partition) after a sequence
    Channels,
    /// Documents whose current sequence is in a set
    Sequences,
    /// Documents granting channel access to a user
    Access,
    /// Documents granting roles to a user
    RoleAccess,
}

impl QueryType {
    /// Every query type, in stats registration order
    pub const ALL: [QueryType; 4] = [
        QueryType::Channels,
        QueryType::Sequences,
        QueryType::Access,
        QueryType::RoleAccess,
    ];

    /// Name used in stat keys and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Channels => "channels",
            QueryType::Sequences => "sequences",
            QueryType::Access => "access",
            QueryType::RoleAccess => "roleAccess",
        }
    }

    /// Position in `QueryType::ALL`
    pub fn index(&self) -> usize {
        match self {
            QueryType::Channels => 0,
            QueryType::Sequences => 1,
            QueryType::Access => 2,
            QueryType::RoleAccess => 3,
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Index backend serving a database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// MapReduce view index queried by key range
    View,
    /// Secondary index queried by parameterized statement
    Declarative,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::View => "view",
            BackendKind::Declarative => "declarative",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Channel component of the `[channel, sequence]` key space.
///
/// Variant order is the physical sort order: every `Star` key sorts before
/// every `Named` key, whatever the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelKey {
    /// Documents with no named channel assignment
    Star,
    /// A named channel
    Named(String),
}

impl ChannelKey {
    /// Maps a channel name to its key, treating `*` as the star partition
    pub fn from_name(name: &str) -> Self {
        if name == STAR_CHANNEL {
            ChannelKey::Star
        } else {
            ChannelKey::Named(name.to_string())
        }
    }

    /// Smallest named key; the first key after the star partition
    pub fn first_named() -> Self {
        ChannelKey::Named(String::new())
    }

    pub fn is_star(&self) -> bool {
        matches!(self, ChannelKey::Star)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ChannelKey::Star => STAR_CHANNEL,
            ChannelKey::Named(name) => name,
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Channel query request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelQuerySpec {
    /// Channel or star partition
    pub channel: ChannelKey,
    /// Exclusive lower bound on sequence
    pub since: u64,
    /// Row cap, 0 = unbounded
    pub limit: u64,
    /// Cap on active rows, 0 = no removal filter
    pub active_only_limit: u64,
}

impl ChannelQuerySpec {
    pub fn new(channel_name: &str, since: u64, limit: u64, active_only_limit: u64) -> Self {
        Self {
            channel: ChannelKey::from_name(channel_name),
            since,
            limit,
            active_only_limit,
        }
    }

    /// Whether removed and deleted entries are filtered out
    pub fn active_only(&self) -> bool {
        self.active_only_limit > 0
    }

    /// The smaller of the non-zero caps, or `None` when both are disabled
    pub fn effective_limit(&self) -> Option<u64> {
        match (self.limit, self.active_only_limit) {
            (0, 0) => None,
            (0, active) => Some(active),
            (limit, 0) => Some(limit),
            (limit, active) => Some(limit.min(active)),
        }
    }
}

/// Sequence set query request. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceQuerySpec {
    sequences: BTreeSet<u64>,
}

impl SequenceQuerySpec {
    /// Collapses duplicates and rejects an empty set
    pub fn new(sequences: impl IntoIterator<Item = u64>) -> QueryResult<Self> {
        let sequences: BTreeSet<u64> = sequences.into_iter().collect();
        if sequences.is_empty() {
            return Err(QueryError::validation(
                QueryType::Sequences,
                "sequence set must not be empty",
            ));
        }
        Ok(Self { sequences })
    }

    pub fn contains(&self, sequence: u64) -> bool {
        self.sequences.contains(&sequence)
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Smallest requested sequence
    pub fn min(&self) -> u64 {
        self.sequences.iter().next().copied().unwrap_or_default()
    }

    /// Largest requested sequence
    pub fn max(&self) -> u64 {
        self.sequences.iter().next_back().copied().unwrap_or_default()
    }

    /// Ascending iteration over the set
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.sequences.iter().copied()
    }
}

/// A result row. Shape is backend-defined; this layer does not interpret it
/// beyond the accessors below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryRow(Map<String, Value>);

impl QueryRow {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style field insert
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Document id, when the row carries one
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for QueryRow {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_sorts_before_named() {
        let star = ChannelKey::Star;
        assert!(star < ChannelKey::first_named());
        assert!(star < ChannelKey::from_name("!"));
        assert!(star < ChannelKey::from_name("ABC1"));
        assert!((ChannelKey::Star, 25u64) < (ChannelKey::from_name("ABC1"), 11u64));
    }

    #[test]
    fn test_channel_key_from_name() {
        assert!(ChannelKey::from_name("*").is_star());
        assert_eq!(ChannelKey::from_name("ABC"), ChannelKey::Named("ABC".into()));
        assert_eq!(ChannelKey::from_name("ABC").to_string(), "ABC");
    }

    #[test]
    fn test_effective_limit() {
        assert_eq!(ChannelQuerySpec::new("ABC", 0, 0, 0).effective_limit(), None);
        assert_eq!(ChannelQuerySpec::new("ABC", 0, 10, 0).effective_limit(), Some(10));
        assert_eq!(ChannelQuerySpec::new("ABC", 0, 0, 7).effective_limit(), Some(7));
        assert_eq!(ChannelQuerySpec::new("ABC", 0, 10, 100).effective_limit(), Some(10));
        assert_eq!(ChannelQuerySpec::new("ABC", 0, 50, 5).effective_limit(), Some(5));
    }

    #[test]
    fn test_sequence_spec_collapses_duplicates() {
        let spec = SequenceQuerySpec::new([8, 3, 3, 6, 4, 8]).unwrap();
        assert_eq!(spec.len(), 4);
        assert_eq!(spec.min(), 3);
        assert_eq!(spec.max(), 8);
        assert_eq!(spec.iter().collect::<Vec<_>>(), vec![3, 4, 6, 8]);
    }

    #[test]
    fn test_empty_sequence_spec_rejected() {
        let err = SequenceQuerySpec::new(Vec::new()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_query_type_names() {
        assert_eq!(QueryType::RoleAccess.to_string(), "roleAccess");
        for (i, query_type) in QueryType::ALL.iter().enumerate() {
            assert_eq!(query_type.index(), i);
        }
    }
}
