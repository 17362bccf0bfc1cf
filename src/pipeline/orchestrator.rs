use log::debug;
use std::sync::Arc;
use std::thread::JoinHandle;

use super::context::{
    PipelineHandles, PipelineTuning, create_pipeline_channels, create_shard_channels,
};
use super::error_handler::take_first_error;
use super::mapper::{Feedback, spawn_mapper_shards};
use super::worker::spawn_tracker_workers;
use crate::error::{TrackError, TrackResult};
use crate::seeding::SeedSource;
use crate::tracking::{Shared, StepSource};
use crate::types::Streamline;

/// Start the tracking pipeline. Returns the receiver for accepted paths plus the handles; the
/// caller drains `track_rx` and then calls [`shutdown_pipeline_handles`].
///
/// Static: seeds → N trackers → writer channel.
/// Feedback: seeds → N trackers → mapper shards (update `feedback.field`) → writer channel.
pub fn run_pipeline<M>(
    shared: Arc<Shared>,
    method: M,
    seeds: Arc<dyn SeedSource>,
    feedback: Option<Feedback>,
) -> TrackResult<PipelineHandles>
where
    M: StepSource + Clone + 'static,
{
    // Shared::new checks this too, but only against the flag it was given.
    if !seeds.is_finite()
        && shared.budget.target().is_none()
        && shared.budget.max_attempts().is_none()
    {
        return Err(TrackError::config(
            "unbounded seed source needs a target number of tracks or a seed attempt cap",
        ));
    }
    let tuning = PipelineTuning::from_opts(&shared.opts);
    debug!(
        "pipeline: {} workers, channel cap {}, feedback {}",
        tuning.num_threads,
        tuning.channel_cap,
        feedback.is_some()
    );

    let channels = create_pipeline_channels(tuning.channel_cap);

    let (worker_handles, mapper_handles) = match feedback {
        None => {
            let workers = spawn_tracker_workers(
                &shared,
                &method,
                &seeds,
                std::slice::from_ref(&channels.track_tx),
                &channels.first_error,
                tuning.num_threads,
            );
            (workers, Vec::new())
        }
        Some(feedback) => {
            let (shard_txs, shard_rxs) =
                create_shard_channels(tuning.num_threads, tuning.channel_cap);
            let mappers = spawn_mapper_shards(shard_rxs, &channels.track_tx, &feedback);
            let workers = spawn_tracker_workers(
                &shared,
                &method,
                &seeds,
                &shard_txs,
                &channels.first_error,
                tuning.num_threads,
            );
            // Shards see their channel close once every worker has exited.
            drop(shard_txs);
            (workers, mappers)
        }
    };

    // Dropping the last sender closes the writer channel once the producers exit.
    drop(channels.track_tx);

    Ok(PipelineHandles {
        track_rx: channels.track_rx,
        worker_handles,
        mapper_handles,
        first_error: channels.first_error,
        shared,
    })
}

/// Join worker and mapper threads (after the stream is drained) and surface the first error.
pub fn shutdown_pipeline_handles(
    worker_handles: Vec<JoinHandle<()>>,
    mapper_handles: Vec<JoinHandle<()>>,
    first_error: &super::FirstError,
) -> TrackResult<()> {
    let mut panicked = None;
    for h in worker_handles {
        if h.join().is_err() {
            panicked.get_or_insert(TrackError::WorkerPanicked { stage: "tracker" });
        }
    }
    for h in mapper_handles {
        if h.join().is_err() {
            panicked.get_or_insert(TrackError::WorkerPanicked { stage: "mapper" });
        }
    }
    if let Some(err) = take_first_error(first_error) {
        return Err(err);
    }
    match panicked {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Run the whole pipeline and collect accepted paths in memory, in arrival order.
pub fn collect_tracks<M>(
    shared: Arc<Shared>,
    method: M,
    seeds: Arc<dyn SeedSource>,
    feedback: Option<Feedback>,
) -> TrackResult<Vec<Streamline>>
where
    M: StepSource + Clone + 'static,
{
    let PipelineHandles {
        track_rx,
        worker_handles,
        mapper_handles,
        first_error,
        shared: _,
    } = run_pipeline(shared, method, seeds, feedback)?;

    let mut tracks = Vec::new();
    while let Ok(track) = track_rx.recv() {
        tracks.push(track);
    }
    debug!("main: channel closed, total {} tracks", tracks.len());

    shutdown_pipeline_handles(worker_handles, mapper_handles, &first_error)?;
    Ok(tracks)
}
