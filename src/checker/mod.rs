//! Vulnerability lookups for batches of package coordinates.
//!
//! [`VulnerabilityChecker`] is the seam for the upstream API; [`OssIndexChecker`]
//! is the HTTP implementation. [`BatchDispatcher`] runs a set of batches
//! serially or with bounded concurrency, and [`merge_envelopes`] folds the
//! per-batch outcomes into one list.

mod fanout;
mod merge;
mod ossindex;

pub use fanout::{BatchDispatcher, QueryMode};
pub use merge::merge_envelopes;
pub use ossindex::{OssIndexChecker, CHECKER_USER_AGENT, DEFAULT_ENDPOINT};

use crate::batch::Batch;
use crate::model::QueryEnvelope;
use async_trait::async_trait;

#[async_trait]
pub trait VulnerabilityChecker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Queries one batch. Never fails: transport and decoding problems are
    /// returned as [`QueryEnvelope::Failed`].
    async fn query_batch(&self, batch: &Batch) -> QueryEnvelope;
}
