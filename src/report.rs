//! Run summary output.

use anyhow::{Context, Result};
use log::{debug, info};
use std::path::Path;

use crate::run::RunSummary;
use crate::tracking::{Rejection, Termination};
use crate::utils::Colors;

/// Log the headline counts, then every non-zero termination and rejection reason.
pub fn print_summary(summary: &RunSummary) {
    let stats = &summary.stats;
    let status = if summary.cancelled {
        Colors::colorize(Colors::CANCELLED, " (cancelled)")
    } else {
        String::new()
    };
    info!(
        "{} | {} | Seeds: {} | {:.2}s{}",
        Colors::colorize(Colors::ACCEPTED, &format!("Accepted: {}", stats.accepted)),
        Colors::colorize(Colors::REJECTED, &format!("Rejected: {}", stats.rejected())),
        stats.generated,
        summary.elapsed_secs,
        status
    );

    for term in Termination::ALL {
        let n = stats.termination(term);
        if n > 0 {
            debug!(
                "{}",
                Colors::colorize(Colors::TERMINATED, &format!("  {}: {}", term, n))
            );
        }
    }
    for reason in Rejection::ALL {
        let n = stats.rejection(reason);
        if n > 0 {
            debug!(
                "{}",
                Colors::colorize(Colors::REJECTED, &format!("  {}: {}", reason, n))
            );
        }
    }
}

/// Labelled counts as a JSON object, suitable for machine consumption.
pub fn summary_json(summary: &RunSummary) -> serde_json::Value {
    let stats = &summary.stats;
    let terminations: serde_json::Map<String, serde_json::Value> = Termination::ALL
        .iter()
        .map(|&t| (t.label().to_string(), stats.termination(t).into()))
        .collect();
    let rejections: serde_json::Map<String, serde_json::Value> = Rejection::ALL
        .iter()
        .map(|&r| (r.label().to_string(), stats.rejection(r).into()))
        .collect();
    serde_json::json!({
        "accepted": stats.accepted,
        "generated": stats.generated,
        "written": summary.written,
        "cancelled": summary.cancelled,
        "elapsed_secs": summary.elapsed_secs,
        "terminations": terminations,
        "rejections": rejections,
    })
}

pub fn write_summary_json(summary: &RunSummary, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(&summary_json(summary)).context("serialize stats")?;
    std::fs::write(path, text).with_context(|| format!("write stats to {}", path.display()))
}
