//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;

// ---- Default file names ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    tck_filename: String,
    jsonl_filename: String,
    config_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                tck_filename: "tracks.tck".to_string(),
                jsonl_filename: "tracks.jsonl".to_string(),
                config_filename: format!("{pkg}.toml"),
            }
        })
    }

    /// Default output file name for a format when none is given.
    pub fn output_filename(&self, format: crate::OutputFormat) -> &str {
        match format {
            crate::OutputFormat::Tck => &self.tck_filename,
            crate::OutputFormat::Jsonl => &self.jsonl_filename,
        }
    }

    /// Config file looked up in the working directory by the CLI.
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }
}

// ---- Worker threads ----

/// Thread limits for the tracker pool.
/// Use [`WorkerThreadLimits::current()`] to fill `all_threads` from rayon.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon); set by [`WorkerThreadLimits::current()`].
    pub all_threads: usize,
    /// Never run fewer tracker workers than this.
    pub floor: usize,
}

impl Default for WorkerThreadLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            floor: Self::FLOOR_THREADS,
        }
    }
}

impl WorkerThreadLimits {
    pub const FLOOR_THREADS: usize = 1;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }

    /// Worker count to use: the requested number, else all available threads.
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.all_threads).max(self.floor)
    }
}

// ---- Seeding ----

/// Bound on (seed, direction) draws for a single path from an unbounded seed source.
pub const MAX_NUM_SEED_ATTEMPTS: usize = 100_000;

/// Default `max_seed_attempts` multiplier: seeds drawn may reach this many times the target.
pub const DEFAULT_ATTEMPTS_PER_TRACK: u64 = 1000;

// ---- Progress ----

/// Progress bar tuning.
pub struct ProgressConsts;

impl ProgressConsts {
    /// Accepted paths per progress callback (reduce lock contention).
    pub const PROGRESS_UPDATE_BATCH_SIZE: usize = 100;
    /// Writer poll interval while waiting for paths, so Ctrl+C is noticed promptly (ms).
    pub const WRITER_POLL_MS: u64 = 200;
}

// ---- Streaming channel cap ----

/// Bound on queued paths between stages. A full queue blocks the producing worker.
pub struct StreamingChannelCap;

impl StreamingChannelCap {
    /// Default cap per worker thread.
    pub const PER_WORKER: usize = 256;
    /// Lower bound regardless of thread count.
    pub const MIN: usize = 64;
    /// Upper bound (avoid holding too many finished paths in memory).
    pub const MAX: usize = 65_536;

    /// Cap for `threads` workers unless one is given explicitly.
    pub fn for_threads(threads: usize, requested: Option<usize>) -> usize {
        requested
            .unwrap_or_else(|| (threads * Self::PER_WORKER).clamp(Self::MIN, Self::MAX))
            .max(1)
    }
}

// ---- Feedback mapping ----

/// Segment upsampling used by the track mapper when none is configured.
pub const DEFAULT_MAPPER_UPSAMPLE: usize = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_cap_is_clamped() {
        assert_eq!(StreamingChannelCap::for_threads(1, None), StreamingChannelCap::MIN);
        assert_eq!(StreamingChannelCap::for_threads(8, None), 8 * 256);
        assert_eq!(StreamingChannelCap::for_threads(8, Some(0)), 1);
        assert_eq!(
            StreamingChannelCap::for_threads(100_000, None),
            StreamingChannelCap::MAX
        );
    }

    #[test]
    fn thread_resolution_has_floor() {
        let limits = WorkerThreadLimits {
            all_threads: 0,
            floor: 1,
        };
        assert_eq!(limits.resolve(None), 1);
        assert_eq!(limits.resolve(Some(6)), 6);
    }
}
