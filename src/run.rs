//! Tracking runs: wire a job into the pipeline and drain it into a writer.

use anyhow::{Context, Result};
use log::{debug, error, info};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::engine::progress::{finish_progress, progress_callback, setup_progress};
use crate::output::{
    JsonLinesWriter, TckWriter, TrackWriter, VecWriter, WriteStreamingParams, write_streaming,
};
use crate::pipeline::{
    Feedback, PipelineHandles, run_pipeline, shutdown_pipeline_handles, warn_if_short,
};
use crate::seeding::SeedSource;
use crate::tracking::{Properties, Shared, StatsSnapshot, StepSource};
use crate::types::{OutputFormat, Streamline, TrackOpts};
use crate::utils::{discard_temp, prepare_output_path, rename_temp_to_final};

/// Everything needed to start a run.
pub struct TrackJob<M> {
    pub opts: TrackOpts,
    pub props: Properties,
    /// Prototype step source; every worker gets its own clone.
    pub method: M,
    pub seeds: Arc<dyn SeedSource>,
    pub feedback: Option<Feedback>,
}

impl<M: StepSource + Clone + 'static> TrackJob<M> {
    pub fn new(opts: TrackOpts, method: M, seeds: Arc<dyn SeedSource>) -> Self {
        Self {
            opts,
            props: Properties::default(),
            method,
            seeds,
            feedback: None,
        }
    }

    pub fn with_properties(mut self, props: Properties) -> Self {
        self.props = props;
        self
    }

    /// Route accepted paths through the mapper stage before they are written.
    pub fn with_feedback(mut self, feedback: Feedback) -> Self {
        self.feedback = Some(feedback);
        self
    }
}

/// How a run is observed and interrupted.
#[derive(Clone, Default)]
pub struct RunControl {
    pub progress: bool,
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Outcome of a completed (or cancelled) run.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub stats: StatsSnapshot,
    pub written: u64,
    pub cancelled: bool,
    pub elapsed_secs: f64,
}

/// Run `job` and hand every accepted path to `writer` on the calling thread.
pub fn track_into<M>(
    job: TrackJob<M>,
    writer: &mut dyn TrackWriter,
    control: &RunControl,
) -> Result<RunSummary>
where
    M: StepSource + Clone + 'static,
{
    let start = Instant::now();
    let TrackJob {
        opts,
        props,
        method,
        seeds,
        feedback,
    } = job;
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts
    );
    let shared = Shared::new(opts, props, seeds.is_finite())
        .inspect_err(|e| error!("{}", e))
        .map(Arc::new)?;
    let bar = setup_progress(control.progress, shared.budget.target());

    let PipelineHandles {
        track_rx,
        worker_handles,
        mapper_handles,
        first_error,
        shared,
    } = run_pipeline(shared, method, seeds, feedback)?;

    let params = WriteStreamingParams {
        budget: &shared.budget,
        on_batch_progress: progress_callback(&bar),
        cancel_check: control.cancel.clone(),
    };
    let written = write_streaming(track_rx, writer, &params);
    let joined = shutdown_pipeline_handles(worker_handles, mapper_handles, &first_error);
    finish_progress(&bar);
    joined?;
    let written = written?;

    let cancelled = control
        .cancel
        .as_ref()
        .is_some_and(|c| c.load(Ordering::Relaxed));
    let stats = shared.snapshot();
    warn_if_short(stats.accepted, shared.budget.target(), stats.generated, cancelled);
    Ok(RunSummary {
        stats,
        written,
        cancelled,
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}

/// Run `job` and collect accepted paths in memory.
pub fn track<M>(job: TrackJob<M>) -> Result<(Vec<Streamline>, RunSummary)>
where
    M: StepSource + Clone + 'static,
{
    let mut writer = VecWriter::new();
    let summary = track_into(job, &mut writer, &RunControl::default())?;
    Ok((writer.into_tracks(), summary))
}

static CANCEL_FLAG: Mutex<Option<Arc<AtomicBool>>> = Mutex::new(None);

/// Install the Ctrl+C handler once per process and return its flag, cleared for a new run.
pub fn install_cancel_handler() -> Result<Arc<AtomicBool>> {
    let mut slot = CANCEL_FLAG.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(flag) = slot.as_ref() {
        flag.store(false, Ordering::Relaxed);
        return Ok(Arc::clone(flag));
    }
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    })
    .context("set Ctrl+C handler")?;
    *slot = Some(Arc::clone(&flag));
    Ok(flag)
}

/// `key: value` lines recorded in the `.tck` header.
fn tck_properties(opts: &TrackOpts) -> Vec<(String, String)> {
    let mut props = vec![
        ("step_size".to_string(), opts.step_size.to_string()),
        ("min_num_points".to_string(), opts.min_points.to_string()),
        ("max_num_points".to_string(), opts.max_points.to_string()),
        ("unidirectional".to_string(), u8::from(opts.unidirectional).to_string()),
        (
            "integration".to_string(),
            if opts.is_rk4() { "rk4" } else { "single" }.to_string(),
        ),
        ("act".to_string(), u8::from(opts.is_act()).to_string()),
    ];
    if let Some(n) = opts.number {
        props.push(("max_num_tracks".to_string(), n.to_string()));
    }
    if opts.downsample > 1 {
        props.push(("downsample_factor".to_string(), opts.downsample.to_string()));
    }
    props
}

/// Run `job` into a file. Output goes to a temp sibling that is renamed over `out_path` once
/// the run finishes (also when cancelled, so the tracks written so far are kept).
pub fn track_to_file<M>(
    job: TrackJob<M>,
    out_path: &Path,
    format: OutputFormat,
    progress: bool,
) -> Result<RunSummary>
where
    M: StepSource + Clone + 'static,
{
    let temp_path = prepare_output_path(out_path)?;
    let control = RunControl {
        progress,
        cancel: Some(install_cancel_handler()?),
    };
    let file = File::create(&temp_path)
        .with_context(|| format!("create output at {}", temp_path.display()))?;
    let buf = BufWriter::new(file);

    let result = match format {
        OutputFormat::Tck => TckWriter::new(buf, &tck_properties(&job.opts))
            .and_then(|mut w| track_into(job, &mut w, &control)),
        OutputFormat::Jsonl => {
            let mut w = JsonLinesWriter::new(buf);
            track_into(job, &mut w, &control)
        }
    };

    match result {
        Ok(summary) => {
            rename_temp_to_final(&temp_path, out_path)?;
            info!(
                "Wrote {} tracks to {}",
                summary.written,
                out_path.display()
            );
            Ok(summary)
        }
        Err(e) => {
            discard_temp(&temp_path);
            Err(e)
        }
    }
}
