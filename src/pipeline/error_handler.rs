use crate::error::TrackError;

use super::context::FirstError;

/// Take the recorded first error, if any. Call after joining workers.
pub fn take_first_error(first_error: &FirstError) -> Option<TrackError> {
    first_error.lock().unwrap_or_else(|e| e.into_inner()).take()
}

/// Log a run that ended before reaching its target, so a short output is never silent.
pub fn warn_if_short(accepted: u64, target: Option<u64>, generated: u64, cancelled: bool) {
    let Some(target) = target else {
        return;
    };
    if accepted >= target {
        return;
    }
    if cancelled {
        log::warn!(
            "Cancelled after {} of {} requested tracks ({} seeds drawn)",
            accepted,
            target,
            generated
        );
    } else {
        log::warn!(
            "Only {} of {} requested tracks accepted before the seed budget ran out ({} seeds drawn)",
            accepted,
            target,
            generated
        );
    }
}
