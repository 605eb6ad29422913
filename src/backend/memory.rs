//! In-memory bucket serving both index backends
//!
//! Holds the sync metadata of every document and derives view rows and
//! secondary index entries from it on each request. Rows are materialized
//! before a cursor is handed out, so no lock outlives a query call.
//!
//! Fault injection (failing queries, failing cursor reads and closes) lets
//! callers exercise every error path of the dispatcher.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{json, Value};
use tracing::debug;

use crate::declarative::{quote_ident, Condition, Field, IndexKind, Params, Statement};
use crate::query::{ChannelKey, QueryRow, STAR_CHANNEL};
use crate::view::{ViewKey, ViewQuery, DEFAULT_DESIGN_DOC, VIEW_ACCESS, VIEW_CHANNELS, VIEW_ROLE_ACCESS};

use super::errors::{BackendError, BackendResult};
use super::{BoxCursor, DeclarativeStore, RowCursor, ViewStore};

/// Sync metadata of one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    pub id: String,
    pub rev: String,
    /// Current sequence
    pub sequence: u64,
    /// Channel name → removal sequence, `None` while the document is in it
    pub channels: BTreeMap<String, Option<u64>>,
    /// User → channels granted
    pub access: BTreeMap<String, Vec<String>>,
    /// User → roles granted
    pub role_access: BTreeMap<String, Vec<String>>,
    pub deleted: bool,
}

impl DocumentMeta {
    /// Channels the document currently belongs to
    pub fn active_channels(&self) -> impl Iterator<Item = &str> {
        self.channels
            .iter()
            .filter(|(_, removal)| removal.is_none())
            .map(|(name, _)| name.as_str())
    }

    /// Whether the document falls in the star partition
    pub fn is_unchanneled(&self) -> bool {
        self.active_channels().next().is_none()
    }

    fn generation(&self) -> u64 {
        self.rev
            .split('-')
            .next()
            .and_then(|g| g.parse().ok())
            .unwrap_or(0)
    }
}

/// New sync metadata for a document write
#[derive(Debug, Clone, Default)]
pub struct DocumentUpdate {
    channels: BTreeSet<String>,
    access: BTreeMap<String, Vec<String>>,
    role_access: BTreeMap<String, Vec<String>>,
}

impl DocumentUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Named channels. `*` is implicit and ignored here.
    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels.extend(
            channels
                .into_iter()
                .map(Into::into)
                .filter(|name| name != STAR_CHANNEL),
        );
        self
    }

    pub fn with_access<I, S>(mut self, user: &str, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.access
            .insert(user.to_string(), channels.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_roles<I, S>(mut self, user: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role_access
            .insert(user.to_string(), roles.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Default)]
struct BucketState {
    docs: BTreeMap<String, DocumentMeta>,
    last_sequence: u64,
}

#[derive(Debug, Default)]
struct Faults {
    failing_queries: u64,
    cursor_fail_after: Option<usize>,
    fail_close: bool,
}

/// One index entry: a document seen through a channel or principal index
struct IndexEntry<'a> {
    doc: &'a DocumentMeta,
    channel: Option<ChannelKey>,
    sequence: u64,
    removed: bool,
}

impl IndexEntry<'_> {
    fn field_value(&self, field: &Field) -> Value {
        match field {
            Field::DocId => Value::from(self.doc.id.as_str()),
            Field::Channel => self
                .channel
                .as_ref()
                .map_or(Value::Null, |c| Value::from(c.as_str())),
            Field::Sequence => Value::from(self.sequence),
            Field::RevId => Value::from(self.doc.rev.as_str()),
            Field::Removed => Value::from(self.removed),
            Field::Deleted => Value::from(self.doc.deleted),
            Field::AccessPrincipals => json!(self.doc.access.keys().collect::<Vec<_>>()),
            Field::RoleAccessPrincipals => {
                json!(self.doc.role_access.keys().collect::<Vec<_>>())
            }
            Field::AccessFor(user) => self.doc.access.get(user).map_or(Value::Null, |v| json!(v)),
            Field::RoleAccessFor(user) => self
                .doc
                .role_access
                .get(user)
                .map_or(Value::Null, |v| json!(v)),
        }
    }

    fn project(&self, projection: &[Field]) -> QueryRow {
        projection.iter().fold(QueryRow::new(), |row, field| {
            row.with(field.alias(), self.field_value(field))
        })
    }
}

/// A condition with its parameter resolved
enum BoundCondition {
    Named(String),
    Star,
    After(u64),
    In(HashSet<u64>),
    NotRemoved,
    Active,
    GrantsAccess(String),
    GrantsRoles(String),
}

impl BoundCondition {
    fn bind(condition: &Condition, params: &Params) -> BackendResult<Self> {
        Ok(match condition {
            Condition::ChannelEquals(p) => BoundCondition::Named(param_str(params, p)?.to_string()),
            Condition::StarChannel => BoundCondition::Star,
            Condition::SequenceAfter(p) => BoundCondition::After(param_u64(params, p)?),
            Condition::SequenceIn(p) => BoundCondition::In(param_u64_set(params, p)?),
            Condition::NotRemoved => BoundCondition::NotRemoved,
            Condition::Active => BoundCondition::Active,
            Condition::GrantsAccessTo(user) => BoundCondition::GrantsAccess(user.clone()),
            Condition::GrantsRolesTo(user) => BoundCondition::GrantsRoles(user.clone()),
        })
    }

    fn matches(&self, entry: &IndexEntry<'_>) -> bool {
        match self {
            BoundCondition::Named(name) => {
                matches!(&entry.channel, Some(ChannelKey::Named(n)) if n == name)
            }
            BoundCondition::Star => matches!(entry.channel, Some(ChannelKey::Star)),
            BoundCondition::After(since) => entry.sequence > *since,
            BoundCondition::In(set) => set.contains(&entry.sequence),
            BoundCondition::NotRemoved => !entry.removed,
            BoundCondition::Active => !entry.removed && !entry.doc.deleted,
            BoundCondition::GrantsAccess(user) => entry.doc.access.contains_key(user),
            BoundCondition::GrantsRoles(user) => entry.doc.role_access.contains_key(user),
        }
    }
}

fn param<'a>(params: &'a Params, name: &str) -> BackendResult<&'a Value> {
    params
        .get(name)
        .ok_or_else(|| BackendError::InvalidStatement(format!("missing parameter ${}", name)))
}

fn param_str<'a>(params: &'a Params, name: &str) -> BackendResult<&'a str> {
    param(params, name)?
        .as_str()
        .ok_or_else(|| BackendError::InvalidStatement(format!("${} must be a string", name)))
}

fn param_u64(params: &Params, name: &str) -> BackendResult<u64> {
    param(params, name)?.as_u64().ok_or_else(|| {
        BackendError::InvalidStatement(format!("${} must be an unsigned integer", name))
    })
}

fn param_u64_set(params: &Params, name: &str) -> BackendResult<HashSet<u64>> {
    let invalid =
        || BackendError::InvalidStatement(format!("${} must be an array of unsigned integers", name));
    param(params, name)?
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|v| v.as_u64().ok_or_else(invalid))
        .collect()
}

fn compare_values(a: &Value, b: &Value) -> CmpOrdering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_u64()
            .unwrap_or_default()
            .cmp(&y.as_u64().unwrap_or_default()),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => CmpOrdering::Equal,
    }
}

/// Entries of the channels index, in document id order.
/// Unchanneled documents get a star entry; removals keep an entry at the
/// removal sequence.
fn channel_entries(docs: &BTreeMap<String, DocumentMeta>) -> Vec<IndexEntry<'_>> {
    let mut entries = Vec::new();
    for doc in docs.values() {
        if doc.is_unchanneled() {
            entries.push(IndexEntry {
                doc,
                channel: Some(ChannelKey::Star),
                sequence: doc.sequence,
                removed: false,
            });
        }
        for (name, removal) in &doc.channels {
            entries.push(IndexEntry {
                doc,
                channel: Some(ChannelKey::Named(name.clone())),
                sequence: removal.unwrap_or(doc.sequence),
                removed: removal.is_some(),
            });
        }
    }
    entries
}

fn principal_entries(
    docs: &BTreeMap<String, DocumentMeta>,
    grants: impl Fn(&DocumentMeta) -> bool,
) -> Vec<IndexEntry<'_>> {
    docs.values()
        .filter(|doc| grants(doc))
        .map(|doc| IndexEntry {
            doc,
            channel: None,
            sequence: doc.sequence,
            removed: false,
        })
        .collect()
}

/// Cursor over materialized rows, tracked by the bucket until closed
struct MemoryCursor {
    rows: VecDeque<QueryRow>,
    served: usize,
    fail_after: Option<usize>,
    fail_close: bool,
    closed: bool,
    open_cursors: Arc<AtomicUsize>,
}

impl RowCursor for MemoryCursor {
    fn next_row(&mut self) -> BackendResult<Option<QueryRow>> {
        if self.closed {
            return Err(BackendError::CursorClosed);
        }
        if self.fail_after == Some(self.served) {
            return Err(BackendError::Cursor("injected read failure".into()));
        }
        let row = self.rows.pop_front();
        if row.is_some() {
            self.served += 1;
        }
        Ok(row)
    }

    fn close(&mut self) -> BackendResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.rows.clear();
        self.open_cursors.fetch_sub(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(BackendError::Cursor("injected close failure".into()));
        }
        Ok(())
    }
}

/// In-memory bucket implementing both `ViewStore` and `DeclarativeStore`
#[derive(Debug)]
pub struct MemoryBucket {
    keyspace: String,
    design_doc: String,
    state: RwLock<BucketState>,
    faults: Mutex<Faults>,
    open_cursors: Arc<AtomicUsize>,
}

impl MemoryBucket {
    /// Empty bucket with the default design document installed
    pub fn new(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            design_doc: DEFAULT_DESIGN_DOC.to_string(),
            state: RwLock::new(BucketState::default()),
            faults: Mutex::new(Faults::default()),
            open_cursors: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serve the sync views under a different design document name
    pub fn with_design_doc(mut self, design_doc: impl Into<String>) -> Self {
        self.design_doc = design_doc.into();
        self
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn design_doc(&self) -> &str {
        &self.design_doc
    }

    fn read_state(&self) -> RwLockReadGuard<'_, BucketState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, BucketState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Writes a document revision and returns its new sequence.
    ///
    /// Channels dropped since the previous revision keep a removal entry.
    pub fn put(&self, id: &str, update: DocumentUpdate) -> u64 {
        let mut state = self.write_state();
        state.last_sequence += 1;
        let sequence = state.last_sequence;

        let previous = state.docs.remove(id);
        let generation = previous.as_ref().map_or(0, DocumentMeta::generation) + 1;

        let mut channels = BTreeMap::new();
        if let Some(prev) = &previous {
            for (name, removal) in &prev.channels {
                if !update.channels.contains(name) {
                    channels.insert(name.clone(), Some(removal.unwrap_or(sequence)));
                }
            }
        }
        for name in update.channels {
            channels.insert(name, None);
        }

        let doc = DocumentMeta {
            id: id.to_string(),
            rev: format!("{}-{:x}", generation, sequence),
            sequence,
            channels,
            access: update.access,
            role_access: update.role_access,
            deleted: false,
        };
        debug!(event = "DOCUMENT_PUT", doc_id = id, sequence, rev = %doc.rev);
        state.docs.insert(id.to_string(), doc);
        sequence
    }

    /// Tombstones a document, keeping its channel entries. Returns the new
    /// sequence, or `None` if the document does not exist.
    pub fn delete(&self, id: &str) -> Option<u64> {
        let mut state = self.write_state();
        let next = state.last_sequence + 1;
        let doc = state.docs.get_mut(id)?;
        doc.sequence = next;
        doc.rev = format!("{}-{:x}", doc.generation() + 1, next);
        doc.deleted = true;
        state.last_sequence = next;
        debug!(event = "DOCUMENT_DELETE", doc_id = id, sequence = next);
        Some(next)
    }

    /// Removes a document from one channel, as a new revision. Returns the
    /// new sequence, or `None` if the document is not in that channel.
    pub fn remove_from_channel(&self, id: &str, channel: &str) -> Option<u64> {
        let mut state = self.write_state();
        let next = state.last_sequence + 1;
        let doc = state.docs.get_mut(id)?;
        match doc.channels.get_mut(channel) {
            Some(removal) if removal.is_none() => *removal = Some(next),
            _ => return None,
        }
        doc.sequence = next;
        doc.rev = format!("{}-{:x}", doc.generation() + 1, next);
        state.last_sequence = next;
        debug!(event = "CHANNEL_REMOVAL", doc_id = id, channel, sequence = next);
        Some(next)
    }

    pub fn get(&self, id: &str) -> Option<DocumentMeta> {
        self.read_state().docs.get(id).cloned()
    }

    pub fn last_sequence(&self) -> u64 {
        self.read_state().last_sequence
    }

    /// The next `count` queries fail before returning a cursor
    pub fn fail_next_queries(&self, count: u64) {
        self.lock_faults().failing_queries = count;
    }

    /// Cursors opened from now on fail after serving `rows` rows
    pub fn fail_cursor_reads_after(&self, rows: Option<usize>) {
        self.lock_faults().cursor_fail_after = rows;
    }

    /// Cursors opened from now on fail when closed (after releasing)
    pub fn fail_cursor_close(&self, enabled: bool) {
        self.lock_faults().fail_close = enabled;
    }

    pub fn clear_faults(&self) {
        *self.lock_faults() = Faults::default();
    }

    /// Cursors handed out and not yet closed
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    fn take_query_fault(&self) -> BackendResult<()> {
        let mut faults = self.lock_faults();
        if faults.failing_queries > 0 {
            faults.failing_queries -= 1;
            return Err(BackendError::Unavailable("injected query failure".into()));
        }
        Ok(())
    }

    fn open_cursor(&self, rows: Vec<QueryRow>) -> BoxCursor {
        let faults = self.lock_faults();
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        Box::new(MemoryCursor {
            rows: rows.into(),
            served: 0,
            fail_after: faults.cursor_fail_after,
            fail_close: faults.fail_close,
            closed: false,
            open_cursors: Arc::clone(&self.open_cursors),
        })
    }

    fn check_keyspace(&self, statement: &Statement) -> BackendResult<()> {
        if statement.keyspace != self.keyspace {
            return Err(BackendError::InvalidStatement(format!(
                "unknown keyspace {}",
                statement.keyspace
            )));
        }
        Ok(())
    }

    fn view_rows(&self, query: &ViewQuery) -> BackendResult<Vec<QueryRow>> {
        let unknown = || BackendError::UnknownView {
            design_doc: query.design_doc.clone(),
            view: query.view.clone(),
        };
        if query.design_doc != self.design_doc {
            return Err(unknown());
        }

        let state = self.read_state();
        let mut emitted: Vec<(ViewKey, &str, Value)> = match query.view.as_str() {
            VIEW_CHANNELS => channel_entries(&state.docs)
                .into_iter()
                .filter_map(|entry| {
                    let channel = entry.channel?;
                    let value = json!({
                        "rev": entry.doc.rev,
                        "removed": entry.removed,
                        "deleted": entry.doc.deleted,
                    });
                    Some((
                        ViewKey::channel(channel, entry.sequence),
                        entry.doc.id.as_str(),
                        value,
                    ))
                })
                .collect(),
            VIEW_ACCESS => state
                .docs
                .values()
                .flat_map(|doc| {
                    doc.access.iter().map(move |(user, channels)| {
                        (ViewKey::principal(user.as_str()), doc.id.as_str(), json!(channels))
                    })
                })
                .collect(),
            VIEW_ROLE_ACCESS => state
                .docs
                .values()
                .flat_map(|doc| {
                    doc.role_access.iter().map(move |(user, roles)| {
                        (ViewKey::principal(user.as_str()), doc.id.as_str(), json!(roles))
                    })
                })
                .collect(),
            _ => return Err(unknown()),
        };
        emitted.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));

        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(emitted
            .into_iter()
            .filter(|(key, _, _)| query.contains(key))
            .take(limit)
            .map(|(key, id, value)| {
                QueryRow::new()
                    .with("id", id)
                    .with("key", key.to_json())
                    .with("value", value)
            })
            .collect())
    }

    fn statement_rows(&self, statement: &Statement, params: &Params) -> BackendResult<Vec<QueryRow>> {
        self.check_keyspace(statement)?;
        let bound = statement
            .conditions
            .iter()
            .map(|c| BoundCondition::bind(c, params))
            .collect::<BackendResult<Vec<_>>>()?;
        let limit = statement
            .limit
            .as_deref()
            .map(|p| param_u64(params, p))
            .transpose()?;

        let state = self.read_state();
        let candidates = match statement.index.kind {
            IndexKind::Channels => channel_entries(&state.docs),
            IndexKind::Access => principal_entries(&state.docs, |doc| !doc.access.is_empty()),
            IndexKind::RoleAccess => {
                principal_entries(&state.docs, |doc| !doc.role_access.is_empty())
            }
        };
        let mut entries: Vec<IndexEntry<'_>> = candidates
            .into_iter()
            .filter(|entry| bound.iter().all(|b| b.matches(entry)))
            .collect();
        if let Some(order) = &statement.order_by {
            entries.sort_by(|a, b| compare_values(&a.field_value(order), &b.field_value(order)));
        }

        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        for entry in entries {
            if limit.map_or(false, |l| rows.len() as u64 >= l) {
                break;
            }
            let row = entry.project(&statement.projection);
            if statement.distinct && !seen.insert(row.clone().into_value().to_string()) {
                continue;
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Plan tree in the nested `#operator` shape. A `Fetch` step appears
    /// whenever the statement reads a field the index does not hold.
    /// Coverage here is self-declared from the same field table the builder
    /// uses; the plan walk itself is exercised by externally shaped plans.
    fn plan(&self, statement: &Statement, params: &Params) -> BackendResult<Value> {
        self.check_keyspace(statement)?;
        for condition in &statement.conditions {
            BoundCondition::bind(condition, params)?;
        }
        if let Some(limit) = &statement.limit {
            param_u64(params, limit)?;
        }

        let keyspace = quote_ident(&statement.keyspace);
        let covered = statement.is_covered_by_index();

        let mut scan = json!({
            "#operator": "IndexScan3",
            "index": statement.index.name,
            "keyspace": statement.keyspace,
        });
        if covered {
            let covers: Vec<String> = statement
                .referenced_fields()
                .iter()
                .map(|f| format!("cover ({})", f.expr(&statement.keyspace)))
                .collect();
            scan["covers"] = json!(covers);
        }

        let mut per_row = Vec::new();
        if !covered {
            per_row.push(json!({"#operator": "Fetch", "keyspace": statement.keyspace}));
        }
        if statement.index.kind == IndexKind::Channels {
            per_row.push(json!({
                "#operator": "Unnest",
                "expr": format!("{}._sync.channel_entries", keyspace),
                "as": "entry",
            }));
        }
        if !statement.conditions.is_empty() {
            per_row.push(json!({"#operator": "Filter", "condition": statement.where_text()}));
        }
        let terms: Vec<Value> = statement
            .result_terms()
            .into_iter()
            .map(|t| json!({"expr": t}))
            .collect();
        per_row.push(json!({
            "#operator": "InitialProject",
            "distinct": statement.distinct,
            "result_terms": terms,
        }));

        let mut steps = vec![
            scan,
            json!({
                "#operator": "Parallel",
                "~child": {"#operator": "Sequence", "~children": per_row},
            }),
        ];
        if let Some(order) = &statement.order_by {
            steps.push(json!({
                "#operator": "Order",
                "sort_terms": [{"expr": order.expr(&statement.keyspace)}],
            }));
        }
        if let Some(limit) = &statement.limit {
            steps.push(json!({"#operator": "Limit", "expr": format!("${}", limit)}));
        }
        steps.push(json!({"#operator": "FinalProject"}));

        Ok(json!({
            "plan": {"#operator": "Sequence", "~children": steps},
            "text": statement.text(),
        }))
    }
}

impl ViewStore for MemoryBucket {
    fn query_view(&self, query: &ViewQuery) -> BackendResult<BoxCursor> {
        self.take_query_fault()?;
        let rows = self.view_rows(query)?;
        debug!(
            event = "VIEW_QUERY",
            ddoc = %query.design_doc,
            view = %query.view,
            rows = rows.len()
        );
        Ok(self.open_cursor(rows))
    }
}

impl DeclarativeStore for MemoryBucket {
    fn query(&self, statement: &Statement, params: &Params) -> BackendResult<BoxCursor> {
        self.take_query_fault()?;
        let rows = self.statement_rows(statement, params)?;
        debug!(
            event = "STATEMENT_QUERY",
            index = %statement.index.name,
            rows = rows.len()
        );
        Ok(self.open_cursor(rows))
    }

    fn explain(&self, statement: &Statement, params: &Params) -> BackendResult<Value> {
        self.plan(statement, params)
    }
}
