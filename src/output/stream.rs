//! Single-writer loop: drain accepted paths from the pipeline into a [`TrackWriter`].

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::TrackWriter;
use crate::tracking::TrackBudget;
use crate::types::Streamline;
use crate::utils::config::ProgressConsts;

/// Parameters for [`write_streaming`].
pub struct WriteStreamingParams<'a> {
    /// Asked to stop drawing seeds on cancel or writer failure.
    pub budget: &'a TrackBudget,
    /// Called with the number of paths written since the last call.
    pub on_batch_progress: Option<Box<dyn Fn(usize) + Send>>,
    /// When set, polled while waiting; once true, stop seeding but keep draining in-flight paths.
    pub cancel_check: Option<Arc<AtomicBool>>,
}

/// Write paths as they arrive until every producer has hung up. Returns the number written.
///
/// A writer error stops seeding and the rest of the stream is discarded so producers never
/// block on a full channel; the error is returned after the drain.
pub fn write_streaming(
    track_rx: Receiver<Streamline>,
    writer: &mut dyn TrackWriter,
    params: &WriteStreamingParams<'_>,
) -> Result<u64> {
    let batch = ProgressConsts::PROGRESS_UPDATE_BATCH_SIZE;
    let poll = Duration::from_millis(ProgressConsts::WRITER_POLL_MS);
    let mut written = 0_u64;
    let mut pending = 0_usize;
    let mut cancel_seen = false;
    let mut failure: Option<anyhow::Error> = None;

    loop {
        if !cancel_seen
            && params
                .cancel_check
                .as_ref()
                .is_some_and(|c| c.load(Ordering::Relaxed))
        {
            log::info!("Tracking cancelled (Ctrl+C); finishing tracks in flight...");
            params.budget.request_stop();
            cancel_seen = true;
        }

        let track = match track_rx.recv_timeout(poll) {
            Ok(track) => track,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if failure.is_some() {
            continue;
        }
        match writer.accept(track) {
            Ok(()) => {
                written += 1;
                pending += 1;
                if pending == batch {
                    if let Some(ref cb) = params.on_batch_progress {
                        cb(pending);
                    }
                    pending = 0;
                }
            }
            Err(e) => {
                log::error!("Writing tracks failed: {:#}", e);
                params.budget.request_stop();
                failure = Some(e);
            }
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }
    if pending > 0
        && let Some(ref cb) = params.on_batch_progress
    {
        cb(pending);
    }
    writer.finish()?;
    log::debug!("writer: channel closed, {} tracks written", written);
    Ok(written)
}
