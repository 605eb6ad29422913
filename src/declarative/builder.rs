//! Declarative query builder

use serde_json::Value;

use crate::query::{ChannelKey, ChannelQuerySpec, QueryType, SequenceQuerySpec};

use super::statement::{Condition, Field, IndexKind, IndexRef, Params, Statement};
use super::{DEFAULT_ACCESS_INDEX, DEFAULT_CHANNELS_INDEX, DEFAULT_ROLE_ACCESS_INDEX};

const PARAM_CHANNEL: &str = "channel";
const PARAM_SINCE: &str = "since";
const PARAM_LIMIT: &str = "limit";
const PARAM_SEQUENCES: &str = "sequences";

/// Builds statements for one keyspace and its sync indexes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarativeQueryBuilder {
    keyspace: String,
    channels_index: String,
    access_index: String,
    role_access_index: String,
}

impl DeclarativeQueryBuilder {
    /// Builder using the default index names
    pub fn new(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            channels_index: DEFAULT_CHANNELS_INDEX.to_string(),
            access_index: DEFAULT_ACCESS_INDEX.to_string(),
            role_access_index: DEFAULT_ROLE_ACCESS_INDEX.to_string(),
        }
    }

    pub fn with_indexes(
        mut self,
        channels: impl Into<String>,
        access: impl Into<String>,
        role_access: impl Into<String>,
    ) -> Self {
        self.channels_index = channels.into();
        self.access_index = access.into();
        self.role_access_index = role_access.into();
        self
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    fn channel_entry_fields() -> Vec<Field> {
        vec![
            Field::DocId,
            Field::Channel,
            Field::Sequence,
            Field::RevId,
            Field::Removed,
            Field::Deleted,
        ]
    }

    /// Channel (or star) entries after `since`, ascending by sequence.
    /// Reads only channels index keys.
    pub fn channels(&self, spec: &ChannelQuerySpec) -> (Statement, Params) {
        let mut params = Params::new();
        let mut conditions = Vec::with_capacity(3);

        match &spec.channel {
            ChannelKey::Star => conditions.push(Condition::StarChannel),
            ChannelKey::Named(name) => {
                conditions.push(Condition::ChannelEquals(PARAM_CHANNEL.to_string()));
                params.insert(PARAM_CHANNEL, name.as_str());
            }
        }

        conditions.push(Condition::SequenceAfter(PARAM_SINCE.to_string()));
        params.insert(PARAM_SINCE, spec.since);

        if spec.active_only() {
            conditions.push(Condition::Active);
        }

        let limit = spec.effective_limit().map(|limit| {
            params.insert(PARAM_LIMIT, limit);
            PARAM_LIMIT.to_string()
        });

        let statement = Statement {
            query_type: QueryType::Channels,
            keyspace: self.keyspace.clone(),
            index: IndexRef::new(IndexKind::Channels, &self.channels_index),
            distinct: false,
            projection: Self::channel_entry_fields(),
            conditions,
            order_by: Some(Field::Sequence),
            limit,
        };
        (statement, params)
    }

    /// Exact sequence membership over every channel entry, star and named.
    ///
    /// No channel term is emitted, so the scan spans both partitions.
    /// DISTINCT collapses a document listed under several channels.
    pub fn sequences(&self, spec: &SequenceQuerySpec) -> (Statement, Params) {
        let sequences: Vec<Value> = spec.iter().map(Value::from).collect();
        let params = Params::new().with(PARAM_SEQUENCES, sequences);

        let statement = Statement {
            query_type: QueryType::Sequences,
            keyspace: self.keyspace.clone(),
            index: IndexRef::new(IndexKind::Channels, &self.channels_index),
            distinct: true,
            projection: vec![Field::DocId, Field::Sequence, Field::RevId, Field::Deleted],
            conditions: vec![
                Condition::SequenceIn(PARAM_SEQUENCES.to_string()),
                Condition::NotRemoved,
            ],
            order_by: Some(Field::Sequence),
            limit: None,
        };
        (statement, params)
    }

    /// Documents granting channels to `username`. Not covered: the grant
    /// value is read from the document by user name.
    pub fn access(&self, username: &str) -> Statement {
        Statement {
            query_type: QueryType::Access,
            keyspace: self.keyspace.clone(),
            index: IndexRef::new(IndexKind::Access, &self.access_index),
            distinct: false,
            projection: vec![Field::DocId, Field::AccessFor(username.to_string())],
            conditions: vec![Condition::GrantsAccessTo(username.to_string())],
            order_by: None,
            limit: None,
        }
    }

    /// Documents granting roles to `username`. Not covered, as for access.
    pub fn role_access(&self, username: &str) -> Statement {
        Statement {
            query_type: QueryType::RoleAccess,
            keyspace: self.keyspace.clone(),
            index: IndexRef::new(IndexKind::RoleAccess, &self.role_access_index),
            distinct: false,
            projection: vec![Field::DocId, Field::RoleAccessFor(username.to_string())],
            conditions: vec![Condition::GrantsRolesTo(username.to_string())],
            order_by: None,
            limit: None,
        }
    }
}
