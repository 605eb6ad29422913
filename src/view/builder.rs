//! View query builder
//!
//! Translates logical requests into key ranges over the sync views.
//! Anything a key range cannot express (removal filtering, set membership)
//! is left to the caller to apply on the returned rows.

use crate::query::{ChannelKey, ChannelQuerySpec, SequenceQuerySpec};

use super::key::{ViewKey, ViewQuery};
use super::{VIEW_ACCESS, VIEW_CHANNELS, VIEW_ROLE_ACCESS};

/// Builds view requests against one design document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewQueryBuilder {
    design_doc: String,
}

impl ViewQueryBuilder {
    pub fn new(design_doc: impl Into<String>) -> Self {
        Self {
            design_doc: design_doc.into(),
        }
    }

    pub fn design_doc(&self) -> &str {
        &self.design_doc
    }

    /// `(channel, since, ∞]` within one channel partition.
    ///
    /// The limit is only pushed down when no removal filter runs, since the
    /// filter has to see rows before the cap is applied.
    pub fn channels(&self, spec: &ChannelQuerySpec) -> ViewQuery {
        let limit = if spec.active_only() {
            None
        } else {
            spec.effective_limit()
        };
        ViewQuery::new(&self.design_doc, VIEW_CHANNELS)
            .with_start(ViewKey::channel(spec.channel.clone(), spec.since), false)
            .with_end(ViewKey::channel(spec.channel.clone(), u64::MAX), true)
            .with_limit(limit)
    }

    /// One request per key partition: the star range bounded by the
    /// requested sequences, then every named channel.
    ///
    /// Named channels interleave sequences across channel names, so no
    /// single sequence range covers them. Rows from both requests still need
    /// a membership check.
    pub fn sequences(&self, spec: &SequenceQuerySpec) -> [ViewQuery; 2] {
        let star = ViewQuery::new(&self.design_doc, VIEW_CHANNELS)
            .with_start(ViewKey::channel(ChannelKey::Star, spec.min()), true)
            .with_end(ViewKey::channel(ChannelKey::Star, spec.max()), true);
        let named = ViewQuery::new(&self.design_doc, VIEW_CHANNELS)
            .with_start(ViewKey::channel(ChannelKey::first_named(), 0), true);
        [star, named]
    }

    /// Exact-key request on the access view
    pub fn access(&self, username: &str) -> ViewQuery {
        self.principal(VIEW_ACCESS, username)
    }

    /// Exact-key request on the role access view
    pub fn role_access(&self, username: &str) -> ViewQuery {
        self.principal(VIEW_ROLE_ACCESS, username)
    }

    fn principal(&self, view: &str, username: &str) -> ViewQuery {
        ViewQuery::new(&self.design_doc, view)
            .with_start(ViewKey::principal(username), true)
            .with_end(ViewKey::principal(username), true)
    }
}
