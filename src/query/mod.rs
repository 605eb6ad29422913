//! Query model for syncdb
//!
//! Logical request types shared by both index backends:
//!
//! - `QueryType` selects the statement/view shape and the stats bucket
//! - `ChannelKey` is the channel component of the `[channel, sequence]` key.
//!   The star partition (documents with no named channel) sorts before every
//!   named channel, independent of sequence.
//! - `ChannelQuerySpec` / `SequenceQuerySpec` are validated request shapes
//! - `QueryRow` is the opaque row handed back to callers
//!
//! # Error taxonomy
//!
//! - Validation: rejected before any backend call or stats mutation
//! - BackendExecution: counted as issued and errored
//! - Iteration: surfaced on the failing `next`/`close` call only

mod errors;
mod types;

pub use errors::{QueryError, QueryErrorCode, QueryResult};
pub use types::{
    BackendKind, ChannelKey, ChannelQuerySpec, QueryRow, QueryType, SequenceQuerySpec,
    STAR_CHANNEL,
};
