//! View query building for syncdb
//!
//! The view backend indexes documents under a fixed key schema:
//!
//! - `channels` view: `[channel, sequence]`, with unchanneled documents
//!   under the star channel. Star keys sort before every named key.
//! - `access` / `role_access` views: `[principal]`
//!
//! Rows carry `id`, `key` and `value`. For the channels view the value
//! holds `rev`, `removed` and `deleted`.

mod builder;
mod key;

pub use builder::ViewQueryBuilder;
pub use key::{ViewKey, ViewQuery};

use crate::query::QueryRow;

/// Design document holding the sync views
pub const DEFAULT_DESIGN_DOC: &str = "sync_gateway_2.1";
/// `[channel, sequence]` view
pub const VIEW_CHANNELS: &str = "channels";
/// `[user]` → granted channels
pub const VIEW_ACCESS: &str = "access";
/// `[user]` → granted roles
pub const VIEW_ROLE_ACCESS: &str = "role_access";

/// Sequence component of a channels view row key
pub fn row_sequence(row: &QueryRow) -> Option<u64> {
    row.get("key")
        .and_then(|key| key.get(1))
        .and_then(|seq| seq.as_u64())
}

fn value_flag(row: &QueryRow, flag: &str) -> bool {
    row.get("value")
        .and_then(|value| value.get(flag))
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Whether a channels view row marks a channel removal
pub fn row_is_removed(row: &QueryRow) -> bool {
    value_flag(row, "removed")
}

/// Whether a channels view row is neither a removal nor a tombstone
pub fn row_is_active(row: &QueryRow) -> bool {
    !row_is_removed(row) && !value_flag(row, "deleted")
}
