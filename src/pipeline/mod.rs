//! Pipeline components: context, tracker workers, feedback mapping, orchestration.

pub mod context;
pub mod error_handler;
pub mod mapper;
pub mod orchestrator;
pub mod worker;

pub use context::{
    FirstError, PipelineChannels, PipelineHandles, PipelineTuning, create_pipeline_channels,
    create_shard_channels, store_first_error,
};
pub use error_handler::{take_first_error, warn_if_short};
pub use mapper::{Feedback, Mapper, TrackMapper, VoxelContributions, spawn_mapper_shards};
pub use orchestrator::{collect_tracks, run_pipeline, shutdown_pipeline_handles};
pub use worker::spawn_tracker_workers;
