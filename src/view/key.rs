//! View keys and key-range requests

use serde_json::{json, Value};

use crate::query::ChannelKey;

/// A typed view key. Ordering matches the physical index order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ViewKey {
    /// `[channel, sequence]`
    Channel(ChannelKey, u64),
    /// `[principal]`
    Principal(String),
}

impl ViewKey {
    pub fn channel(channel: ChannelKey, sequence: u64) -> Self {
        ViewKey::Channel(channel, sequence)
    }

    pub fn principal(name: impl Into<String>) -> Self {
        ViewKey::Principal(name.into())
    }

    /// JSON array form, as the view engine emits it
    pub fn to_json(&self) -> Value {
        match self {
            ViewKey::Channel(channel, sequence) => json!([channel.as_str(), sequence]),
            ViewKey::Principal(name) => json!([name]),
        }
    }
}

/// Key-range request against one view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewQuery {
    pub design_doc: String,
    pub view: String,
    /// Lower bound, `None` = from the first key
    pub start_key: Option<ViewKey>,
    /// Upper bound, `None` = to the last key
    pub end_key: Option<ViewKey>,
    pub inclusive_start: bool,
    pub inclusive_end: bool,
    /// Row cap, `None` = unbounded
    pub limit: Option<u64>,
}

impl ViewQuery {
    /// Unbounded request over a whole view
    pub fn new(design_doc: impl Into<String>, view: impl Into<String>) -> Self {
        Self {
            design_doc: design_doc.into(),
            view: view.into(),
            start_key: None,
            end_key: None,
            inclusive_start: true,
            inclusive_end: true,
            limit: None,
        }
    }

    pub fn with_start(mut self, key: ViewKey, inclusive: bool) -> Self {
        self.start_key = Some(key);
        self.inclusive_start = inclusive;
        self
    }

    pub fn with_end(mut self, key: ViewKey, inclusive: bool) -> Self {
        self.end_key = Some(key);
        self.inclusive_end = inclusive;
        self
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Whether `key` falls inside the requested range
    pub fn contains(&self, key: &ViewKey) -> bool {
        let after_start = match &self.start_key {
            None => true,
            Some(start) if self.inclusive_start => key >= start,
            Some(start) => key > start,
        };
        let before_end = match &self.end_key {
            None => true,
            Some(end) if self.inclusive_end => key <= end,
            Some(end) => key < end,
        };
        after_start && before_end
    }

    /// Request rendered the way a view client sends it
    pub fn to_json(&self) -> Value {
        let mut out = json!({
            "ddoc": self.design_doc,
            "view": self.view,
            "inclusive_start": self.inclusive_start,
            "inclusive_end": self.inclusive_end,
        });
        if let Some(start) = &self.start_key {
            out["startkey"] = start.to_json();
        }
        if let Some(end) = &self.end_key {
            out["endkey"] = end.to_json();
        }
        if let Some(limit) = self.limit {
            out["limit"] = json!(limit);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, seq: u64) -> ViewKey {
        ViewKey::channel(ChannelKey::from_name(name), seq)
    }

    fn star(seq: u64) -> ViewKey {
        ViewKey::channel(ChannelKey::Star, seq)
    }

    #[test]
    fn test_key_order_groups_star_first() {
        let mut keys = vec![named("ABC1", 11), star(25), named("ABC", 3), star(2)];
        keys.sort();
        assert_eq!(keys, vec![star(2), star(25), named("ABC", 3), named("ABC1", 11)]);
    }

    #[test]
    fn test_contains_respects_inclusivity() {
        let query = ViewQuery::new("dd", "channels")
            .with_start(named("ABC", 5), false)
            .with_end(named("ABC", 9), true);

        assert!(!query.contains(&named("ABC", 5)));
        assert!(query.contains(&named("ABC", 6)));
        assert!(query.contains(&named("ABC", 9)));
        assert!(!query.contains(&named("ABC", 10)));
        assert!(!query.contains(&named("ABD", 6)));
        assert!(!query.contains(&star(6)));
    }

    #[test]
    fn test_star_range_excludes_named_entries() {
        let query = ViewQuery::new("dd", "channels")
            .with_start(star(3), true)
            .with_end(star(8), true);

        assert!(query.contains(&star(3)));
        assert!(!query.contains(&star(25)));
        assert!(!query.contains(&named("ABC1", 5)));
    }

    #[test]
    fn test_unbounded_end() {
        let query = ViewQuery::new("dd", "channels").with_start(
            ViewKey::channel(ChannelKey::first_named(), 0),
            true,
        );
        assert!(!query.contains(&star(u64::MAX)));
        assert!(query.contains(&named("", 0)));
        assert!(query.contains(&named("zzz", u64::MAX)));
    }

    #[test]
    fn test_to_json() {
        let query = ViewQuery::new("sync_gateway_2.1", "channels")
            .with_start(star(1), false)
            .with_end(star(u64::MAX), true)
            .with_limit(Some(10));
        let json = query.to_json();
        assert_eq!(json["startkey"], json!(["*", 1]));
        assert_eq!(json["limit"], 10);
        assert_eq!(json["inclusive_start"], false);
        assert_eq!(ViewKey::principal("user1").to_json(), json!(["user1"]));
    }
}
