//! Statement model and text rendering

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::query::{QueryType, STAR_CHANNEL};

/// Secondary index shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Channels,
    Access,
    RoleAccess,
}

/// Index a statement is pinned to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRef {
    pub kind: IndexKind,
    pub name: String,
}

impl IndexRef {
    pub fn new(kind: IndexKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Addressable fields
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    DocId,
    Channel,
    Sequence,
    RevId,
    Removed,
    Deleted,
    /// Names of users granted channels by the document
    AccessPrincipals,
    /// Names of users granted roles by the document
    RoleAccessPrincipals,
    /// Channels the document grants to one user
    AccessFor(String),
    /// Roles the document grants to one user
    RoleAccessFor(String),
}

impl Field {
    /// Expression text for this field
    pub fn expr(&self, keyspace: &str) -> String {
        match self {
            Field::DocId => format!("META({}).id", quote_ident(keyspace)),
            Field::Channel => "entry.name".to_string(),
            Field::Sequence => "entry.seq".to_string(),
            Field::RevId => "entry.rev".to_string(),
            Field::Removed => "entry.removed".to_string(),
            Field::Deleted => "entry.deleted".to_string(),
            Field::AccessPrincipals => {
                format!("OBJECT_NAMES({}._sync.access)", quote_ident(keyspace))
            }
            Field::RoleAccessPrincipals => {
                format!("OBJECT_NAMES({}._sync.role_access)", quote_ident(keyspace))
            }
            Field::AccessFor(user) => format!(
                "{}._sync.access.{}",
                quote_ident(keyspace),
                quote_ident(user)
            ),
            Field::RoleAccessFor(user) => format!(
                "{}._sync.role_access.{}",
                quote_ident(keyspace),
                quote_ident(user)
            ),
        }
    }

    /// Result column name
    pub fn alias(&self) -> &'static str {
        match self {
            Field::DocId => "id",
            Field::Channel => "channel",
            Field::Sequence => "seq",
            Field::RevId => "rev",
            Field::Removed => "removed",
            Field::Deleted => "deleted",
            Field::AccessPrincipals | Field::RoleAccessPrincipals => "principals",
            Field::AccessFor(_) | Field::RoleAccessFor(_) => "value",
        }
    }

    /// Whether the index stores this field as a key
    pub fn is_indexed_by(&self, kind: IndexKind) -> bool {
        match kind {
            IndexKind::Channels => matches!(
                self,
                Field::DocId
                    | Field::Channel
                    | Field::Sequence
                    | Field::RevId
                    | Field::Removed
                    | Field::Deleted
            ),
            IndexKind::Access => matches!(self, Field::DocId | Field::AccessPrincipals),
            IndexKind::RoleAccess => matches!(self, Field::DocId | Field::RoleAccessPrincipals),
        }
    }
}

/// WHERE terms, joined with AND
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `entry.name = $param`
    ChannelEquals(String),
    /// `entry.name = "*"`
    StarChannel,
    /// `entry.seq > $param`
    SequenceAfter(String),
    /// `entry.seq IN $param`
    SequenceIn(String),
    /// Excludes removal entries
    NotRemoved,
    /// Excludes removal entries and tombstones
    Active,
    /// The document grants channels to the user
    GrantsAccessTo(String),
    /// The document grants roles to the user
    GrantsRolesTo(String),
}

impl Condition {
    /// Fields the condition reads
    pub fn fields(&self) -> Vec<Field> {
        match self {
            Condition::ChannelEquals(_) | Condition::StarChannel => vec![Field::Channel],
            Condition::SequenceAfter(_) | Condition::SequenceIn(_) => vec![Field::Sequence],
            Condition::NotRemoved => vec![Field::Removed],
            Condition::Active => vec![Field::Removed, Field::Deleted],
            Condition::GrantsAccessTo(_) => vec![Field::AccessPrincipals],
            Condition::GrantsRolesTo(_) => vec![Field::RoleAccessPrincipals],
        }
    }

    /// Name of the parameter the condition binds
    pub fn param(&self) -> Option<&str> {
        match self {
            Condition::ChannelEquals(p) | Condition::SequenceAfter(p) | Condition::SequenceIn(p) => {
                Some(p.as_str())
            }
            _ => None,
        }
    }

    fn render(&self, keyspace: &str) -> String {
        match self {
            Condition::ChannelEquals(p) => format!("entry.name = ${}", p),
            Condition::StarChannel => format!("entry.name = {}", quote_str(STAR_CHANNEL)),
            Condition::SequenceAfter(p) => format!("entry.seq > ${}", p),
            Condition::SequenceIn(p) => format!("entry.seq IN ${}", p),
            Condition::NotRemoved => "entry.removed = false".to_string(),
            Condition::Active => "entry.removed = false AND entry.deleted = false".to_string(),
            Condition::GrantsAccessTo(user) => format!(
                "ANY op IN OBJECT_PAIRS({}._sync.access) SATISFIES op.name = {} END",
                quote_ident(keyspace),
                quote_str(user)
            ),
            Condition::GrantsRolesTo(user) => format!(
                "ANY op IN OBJECT_PAIRS({}._sync.role_access) SATISFIES op.name = {} END",
                quote_ident(keyspace),
                quote_str(user)
            ),
        }
    }
}

/// Named statement parameters, rendered without the `$` prefix
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

/// A SELECT against one pinned index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub query_type: QueryType,
    pub keyspace: String,
    pub index: IndexRef,
    pub distinct: bool,
    pub projection: Vec<Field>,
    pub conditions: Vec<Condition>,
    pub order_by: Option<Field>,
    /// Parameter holding the row cap
    pub limit: Option<String>,
}

impl Statement {
    /// Every field the statement reads, in first-use order
    pub fn referenced_fields(&self) -> Vec<Field> {
        let mut fields: Vec<Field> = Vec::new();
        let all = self
            .projection
            .iter()
            .cloned()
            .chain(self.conditions.iter().flat_map(|c| c.fields()))
            .chain(self.order_by.iter().cloned());
        for field in all {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        fields
    }

    /// Whether the pinned index holds every field the statement reads
    pub fn is_covered_by_index(&self) -> bool {
        self.referenced_fields()
            .iter()
            .all(|f| f.is_indexed_by(self.index.kind))
    }

    /// Names of every parameter the statement binds
    pub fn param_names(&self) -> Vec<&str> {
        self.conditions
            .iter()
            .filter_map(|c| c.param())
            .chain(self.limit.as_deref())
            .collect()
    }

    /// Rendered WHERE clause, without the keyword
    pub fn where_text(&self) -> String {
        self.conditions
            .iter()
            .map(|c| c.render(&self.keyspace))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Rendered projection terms
    pub fn result_terms(&self) -> Vec<String> {
        self.projection
            .iter()
            .map(|f| format!("{} AS {}", f.expr(&self.keyspace), f.alias()))
            .collect()
    }

    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        write!(f, "{}", self.result_terms().join(", "))?;
        write!(
            f,
            " FROM {} USE INDEX ({})",
            quote_ident(&self.keyspace),
            quote_ident(&self.index.name)
        )?;
        if self.index.kind == IndexKind::Channels {
            write!(
                f,
                " UNNEST {}._sync.channel_entries AS entry",
                quote_ident(&self.keyspace)
            )?;
        }
        if !self.conditions.is_empty() {
            write!(f, " WHERE {}", self.where_text())?;
        }
        if let Some(order) = &self.order_by {
            write!(f, " ORDER BY {}", order.expr(&self.keyspace))?;
        }
        if let Some(limit) = &self.limit {
            write!(f, " LIMIT ${}", limit)?;
        }
        Ok(())
    }
}

/// Backtick-quoted identifier, embedded backticks doubled
pub(crate) fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Double-quoted string literal with JSON escaping
fn quote_str(value: &str) -> String {
    Value::from(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels_statement() -> Statement {
        Statement {
            query_type: QueryType::Channels,
            keyspace: "db".into(),
            index: IndexRef::new(IndexKind::Channels, "sg_channels_x1"),
            distinct: false,
            projection: vec![Field::DocId, Field::Sequence],
            conditions: vec![
                Condition::ChannelEquals("channel".into()),
                Condition::SequenceAfter("since".into()),
            ],
            order_by: Some(Field::Sequence),
            limit: Some("limit".into()),
        }
    }

    #[test]
    fn test_render_channels_statement() {
        assert_eq!(
            channels_statement().text(),
            "SELECT META(`db`).id AS id, entry.seq AS seq FROM `db` USE INDEX (`sg_channels_x1`) \
             UNNEST `db`._sync.channel_entries AS entry \
             WHERE entry.name = $channel AND entry.seq > $since \
             ORDER BY entry.seq LIMIT $limit"
        );
    }

    #[test]
    fn test_param_names() {
        assert_eq!(channels_statement().param_names(), vec!["channel", "since", "limit"]);
    }

    #[test]
    fn test_channels_statement_covered() {
        assert!(channels_statement().is_covered_by_index());
    }

    #[test]
    fn test_access_value_not_covered() {
        let statement = Statement {
            query_type: QueryType::Access,
            keyspace: "db".into(),
            index: IndexRef::new(IndexKind::Access, "sg_access_x1"),
            distinct: false,
            projection: vec![Field::DocId, Field::AccessFor("user1".into())],
            conditions: vec![Condition::GrantsAccessTo("user1".into())],
            order_by: None,
            limit: None,
        };
        assert!(!statement.is_covered_by_index());
        assert!(statement
            .text()
            .contains("SATISFIES op.name = \"user1\" END"));
    }

    #[test]
    fn test_identifiers_are_escaped() {
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
        assert_eq!(quote_str("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn test_referenced_fields_deduplicated() {
        let fields = channels_statement().referenced_fields();
        assert_eq!(fields, vec![Field::DocId, Field::Sequence, Field::Channel]);
    }

    #[test]
    fn test_params_to_json() {
        let params = Params::new().with("channel", "ABC").with("since", 0u64);
        assert_eq!(params.to_json(), serde_json::json!({"channel": "ABC", "since": 0}));
    }
}
