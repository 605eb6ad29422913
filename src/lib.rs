//! syncdb - channel and sequence query dispatch for a document sync server
//!
//! Answers "which documents are in channel C" and "which documents have a
//! sequence in S" over either of two index backends (MapReduce views or a
//! declarative secondary index), with per-query stats and a lazy,
//! explicitly closed result stream.

pub mod backend;
pub mod cli;
pub mod config;
pub mod coverage;
pub mod declarative;
pub mod dispatcher;
pub mod query;
pub mod stats;
pub mod view;
