//! Pipeline context and tuning: shared state handed to every stage thread.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::error::TrackError;
use crate::tracking::Shared;
use crate::types::{Streamline, TrackOpts};
use crate::utils::config::{StreamingChannelCap, WorkerThreadLimits};

/// First fatal error raised by any stage. Later errors are dropped.
pub type FirstError = Arc<Mutex<Option<TrackError>>>;

/// Record `err` unless an earlier one is already stored.
pub fn store_first_error(slot: &FirstError, err: TrackError) {
    let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
    if guard.is_none() {
        log::debug!("pipeline: first error recorded: {}", err);
        *guard = Some(err);
    }
}

/// Worker count and hand-off queue size.
#[derive(Clone, Debug)]
pub struct PipelineTuning {
    pub num_threads: usize,
    /// Capacity of each path channel. A full channel blocks the sender; nothing is dropped.
    pub channel_cap: usize,
}

impl PipelineTuning {
    pub fn from_opts(opts: &TrackOpts) -> Self {
        let num_threads = WorkerThreadLimits::current().resolve(opts.num_threads);
        Self {
            num_threads,
            channel_cap: StreamingChannelCap::for_threads(num_threads, opts.channel_cap),
        }
    }
}

/// Handles returned by [`run_pipeline`](super::run_pipeline): receive accepted paths, then join.
pub struct PipelineHandles {
    pub track_rx: Receiver<Streamline>,
    pub worker_handles: Vec<JoinHandle<()>>,
    /// Empty for the static pipeline.
    pub mapper_handles: Vec<JoinHandle<()>>,
    pub first_error: FirstError,
    pub shared: Arc<Shared>,
}

/// Writer-side channel plus the error slot. Workers (or mapper shards) get `track_tx`.
pub struct PipelineChannels {
    pub track_tx: Sender<Streamline>,
    pub track_rx: Receiver<Streamline>,
    pub first_error: FirstError,
}

pub fn create_pipeline_channels(channel_cap: usize) -> PipelineChannels {
    let (track_tx, track_rx) = bounded::<Streamline>(channel_cap);
    PipelineChannels {
        track_tx,
        track_rx,
        first_error: Arc::new(Mutex::new(None)),
    }
}

/// One bounded channel per mapper shard. Worker `i` always sends to shard `i % shards`.
pub fn create_shard_channels(
    shards: usize,
    channel_cap: usize,
) -> (Vec<Sender<Streamline>>, Vec<Receiver<Streamline>>) {
    (0..shards.max(1)).map(|_| bounded(channel_cap)).unzip()
}
