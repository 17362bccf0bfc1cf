use crossbeam_channel::Sender;
use log::{debug, trace};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::context::{FirstError, store_first_error};
use crate::error::TrackError;
use crate::seeding::SeedSource;
use crate::tracking::{Grown, Shared, StepSource, Tracker};
use crate::types::Streamline;

/// Single tracker worker: draw seeds and grow paths until the budget is spent or the seed
/// source runs dry. Accepted paths go to `track_tx` in the order this worker produced them.
fn tracker_worker_loop<M: StepSource>(
    id: usize,
    mut tracker: Tracker<M>,
    seeds: Arc<dyn SeedSource>,
    track_tx: Sender<Streamline>,
    first_error: FirstError,
) {
    let shared = Arc::clone(tracker.shared());
    let mut accepted = 0_u64;
    while !shared.budget.should_stop() {
        match tracker.grow(seeds.as_ref()) {
            Ok(None) => {
                trace!("worker {}: seed source exhausted", id);
                break;
            }
            Ok(Some(Grown::Rejected(reason))) => {
                shared.budget.record_generated();
                trace!("worker {}: rejected ({})", id, reason);
            }
            Ok(Some(Grown::Accepted(track))) => {
                shared.budget.record_generated();
                shared.budget.record_accepted();
                accepted += 1;
                if track_tx.send(track).is_err() {
                    // The consumer drains until every producer exits, even after a stop.
                    if !shared.budget.stop_requested() {
                        store_first_error(
                            &first_error,
                            TrackError::Channel {
                                context: format!("worker {}: track receiver dropped", id),
                            },
                        );
                    }
                    shared.budget.request_stop();
                    break;
                }
            }
            Err(e) => {
                store_first_error(&first_error, e);
                shared.budget.request_stop();
                break;
            }
        }
    }
    debug!("worker {}: done, {} accepted", id, accepted);
}

/// Spawn `num_threads` tracker workers, each with its own clone of `method`.
/// Worker `i` sends on `senders[i % senders.len()]`. Caller must drop its senders after this
/// so downstream stages see the channels close once every worker exits.
pub fn spawn_tracker_workers<M>(
    shared: &Arc<Shared>,
    method: &M,
    seeds: &Arc<dyn SeedSource>,
    senders: &[Sender<Streamline>],
    first_error: &FirstError,
    num_threads: usize,
) -> Vec<JoinHandle<()>>
where
    M: StepSource + Clone + 'static,
{
    (0..num_threads)
        .map(|i| {
            let tracker = Tracker::new(Arc::clone(shared), method.clone());
            let seeds = Arc::clone(seeds);
            let track_tx = senders[i % senders.len()].clone();
            let first_error = Arc::clone(first_error);
            thread::spawn(move || tracker_worker_loop(i, tracker, seeds, track_tx, first_error))
        })
        .collect()
}
