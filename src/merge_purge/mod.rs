//! Merge-purge: reconcile a detail file against an indexed master file,
//! classifying each detail record as an add, update, delete or ignore.

pub mod engine;
pub mod param;
pub mod result;

pub use engine::{Classifier, MergePurgeEngine};
pub use param::{MergePurgeAction, MergePurgeMode, MergePurgeParam};
pub use result::MergePurgeResult;

use crate::error::{Result, SortError};

/// Builds and runs an engine on the blocking thread pool. The engine is
/// constructed on that thread, so its callbacks need not be `Send`.
pub async fn merge_purge_async<B>(build: B) -> Result<MergePurgeResult>
where
    B: FnOnce() -> Result<MergePurgeEngine<'static>> + Send + 'static,
{
    tokio::task::spawn_blocking(move || build()?.run())
        .await
        .map_err(|e| SortError::Task(e.to_string()))?
}
