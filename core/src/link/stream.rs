//! Streaming range results
//!
//! A historical range query produces a pull-based cursor over Snapshots. The
//! cursor is a small explicit state machine rather than a bundle of boolean
//! flags, so inconsistent flag combinations cannot be observed: it is either
//! still producing (`Pending`/`Ready`), finished (`Done`), or broken
//! (`Failed`).

use async_trait::async_trait;

use crate::error::{BrowseError, Result};
use crate::model::Snapshot;

/// Observable state of a range cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// More data may arrive, but nothing is buffered; a pull will block.
    Pending,
    /// At least one Snapshot can be pulled without blocking.
    Ready,
    /// The range completed normally; no further Snapshots.
    Done,
    /// The stream carried an error; pulling again is not allowed.
    Failed,
}

/// Pull-based cursor over the Snapshots of one historical range.
#[async_trait]
pub trait RangeCursor: Send {
    /// Current state. Checked before every pull.
    fn state(&self) -> CursorState;

    /// The fault carried by a `Failed` cursor.
    fn fault(&self) -> Option<String>;

    /// Pull the next Snapshot, blocking the calling command until one
    /// arrives or the stream finishes. Returns `None` once the cursor is
    /// `Done` or `Failed`.
    async fn pull(&mut self) -> Option<Snapshot>;
}

/// Pull the next Snapshot, honoring the drain contract: the error state is
/// checked before each pull and is never pulled past.
pub async fn next_snapshot(cursor: &mut dyn RangeCursor) -> Result<Option<Snapshot>> {
    loop {
        match cursor.state() {
            CursorState::Failed => {
                return Err(BrowseError::StreamFault(
                    cursor.fault().unwrap_or_else(|| "unknown fault".to_string()),
                ));
            }
            CursorState::Done => return Ok(None),
            CursorState::Ready | CursorState::Pending => {
                if let Some(snapshot) = cursor.pull().await {
                    return Ok(Some(snapshot));
                }
                // State advanced to Done or Failed; re-check.
            }
        }
    }
}

/// Drain a cursor to completion or error, rendering each Snapshot as it
/// arrives. Returns the number of Snapshots rendered; a stream fault aborts
/// the drain with the carried error.
pub async fn drain<F>(cursor: &mut dyn RangeCursor, mut render: F) -> Result<usize>
where
    F: FnMut(usize, &Snapshot),
{
    let mut count = 0;
    while let Some(snapshot) = next_snapshot(cursor).await? {
        render(count, &snapshot);
        count += 1;
    }
    Ok(count)
}
