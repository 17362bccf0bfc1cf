//! Progress display for tracking runs.

use kdam::{Animation, Bar, BarExt};
use std::sync::{Arc, Mutex};

pub type ProgressBar = Arc<Mutex<Bar>>;

const DESC: &str = "Tracking";

/// Accepted-track bar. With a target it shows a percentage; without one it is a plain counter.
pub fn create_progress_bar(target: Option<u64>) -> ProgressBar {
    let bar = match target {
        Some(t) => kdam::tqdm!(
            total = usize::try_from(t).unwrap_or(usize::MAX),
            desc = DESC,
            animation = Animation::Classic,
            unit = " tracks"
        ),
        None => kdam::tqdm!(desc = DESC, unit = " tracks"),
    };
    Arc::new(Mutex::new(bar))
}

/// Redraw now. Skipped if the writer holds the bar.
fn redraw(pb: &ProgressBar) {
    if let Ok(mut bar) = pb.try_lock() {
        let _ = bar.refresh();
    }
}

/// Advance by `n` written tracks. Never blocks the writer; a missed update shows up on the next one.
pub fn update_progress_bar(pb: &ProgressBar, n: usize) {
    if let Ok(mut bar) = pb.try_lock() {
        let _ = bar.update(n);
    }
}

/// Bar for one run, or None when progress is hidden.
pub fn setup_progress(show: bool, target: Option<u64>) -> Option<ProgressBar> {
    if !show {
        return None;
    }
    let bar = create_progress_bar(target);
    redraw(&bar);
    Some(bar)
}

/// Batch callback for the writer loop.
pub fn progress_callback(bar: &Option<ProgressBar>) -> Option<Box<dyn Fn(usize) + Send>> {
    let bar = Arc::clone(bar.as_ref()?);
    Some(Box::new(move |n: usize| update_progress_bar(&bar, n)))
}

/// Final redraw; ends the bar's line so log output starts cleanly.
pub fn finish_progress(bar: &Option<ProgressBar>) {
    if let Some(bar) = bar {
        redraw(bar);
        eprintln!();
    }
}
