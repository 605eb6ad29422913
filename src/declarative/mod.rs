//! Declarative query building for syncdb
//!
//! Statements target secondary indexes and are kept as a small typed model
//! (`Statement`) that renders to statement text. The model also answers
//! which fields a statement touches, so a store can tell whether the chosen
//! index covers it.
//!
//! # Indexes
//!
//! - channels index: one entry per (document, channel) plus a star entry
//!   for documents without a named channel. Keys: channel, sequence, rev,
//!   removed, deleted, document id.
//! - access / role access indexes: principal names only. Grant values are
//!   addressed by name inside the document, so access statements are not
//!   covered.

mod builder;
mod statement;

pub use builder::DeclarativeQueryBuilder;
pub use statement::{Condition, Field, IndexKind, IndexRef, Params, Statement};

pub(crate) use statement::quote_ident;

/// Default channels index name
pub const DEFAULT_CHANNELS_INDEX: &str = "sg_channels_x1";
/// Default access index name
pub const DEFAULT_ACCESS_INDEX: &str = "sg_access_x1";
/// Default role access index name
pub const DEFAULT_ROLE_ACCESS_INDEX: &str = "sg_roleAccess_x1";
