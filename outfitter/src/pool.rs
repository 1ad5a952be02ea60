//! The bounded worker pool for app installation.
//!
//! Workers pull jobs off a shared queue (so start order follows the action
//! list), run the driver, and report over an mpsc channel. The aggregator
//! drains on a throttled tick, forwards progress to the event sink, and
//! collects results keyed by action index, so completion order never leaks
//! into persisted state.
//!
//! On interrupt the pool stops dequeuing; in-flight installs run to
//! completion (the package manager owns its subprocesses), and jobs that
//! never started are reported failed with reason `interrupted`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Mutex};
use std::time::Duration;

use outfitter_schema::{ActionStatus, EventBody};
use tracing::{debug, info};

use crate::driver::{InstallOutcome, PackageDriver};
use crate::events::EventSink;

/// How often the aggregator wakes to drain worker messages
pub const TICK: Duration = Duration::from_millis(100);

/// One queued install
#[derive(Debug, Clone)]
pub struct InstallJob {
    /// Index of the action this job realizes
    pub index: usize,
    /// The app's id (for events)
    pub id: String,
    /// The ref handed to the driver
    pub package_ref: String,
}

enum WorkerMsg {
    Started { index: usize },
    Completed { index: usize, outcome: InstallOutcome },
}

/// Run every job through the driver with at most `parallelism` workers,
/// returning outcomes keyed by action index.
pub fn run_installs(
    jobs: Vec<InstallJob>,
    driver: &dyn PackageDriver,
    parallelism: usize,
    sink: &EventSink,
    interrupt: &AtomicBool,
) -> BTreeMap<usize, InstallOutcome> {
    let mut results = BTreeMap::new();
    if jobs.is_empty() {
        return results;
    }

    let ids: BTreeMap<usize, String> =
        jobs.iter().map(|j| (j.index, j.id.clone())).collect();
    let worker_count = parallelism.max(1).min(jobs.len());
    let queue = Mutex::new(VecDeque::from(jobs));
    let (tx, rx) = mpsc::channel::<WorkerMsg>();

    std::thread::scope(|scope| {
        for worker in 0..worker_count {
            let tx = tx.clone();
            let queue = &queue;
            scope.spawn(move || {
                debug!("install worker {worker} up");
                loop {
                    if interrupt.load(Ordering::SeqCst) {
                        break;
                    }
                    let Some(job) = queue.lock().unwrap().pop_front() else {
                        break;
                    };
                    let _ = tx.send(WorkerMsg::Started { index: job.index });
                    info!("installing {} ({})", job.id, job.package_ref);
                    let outcome = driver.install(&job.package_ref);
                    let _ = tx.send(WorkerMsg::Completed {
                        index: job.index,
                        outcome,
                    });
                }
            });
        }
        // the workers hold the remaining senders
        drop(tx);

        loop {
            match rx.recv_timeout(TICK) {
                Ok(WorkerMsg::Started { index }) => {
                    if let Some(id) = ids.get(&index) {
                        sink.emit("apps", EventBody::AppStarted { id: id.clone() });
                    }
                }
                Ok(WorkerMsg::Completed { index, outcome }) => {
                    if let Some(id) = ids.get(&index) {
                        let status = if outcome.success {
                            ActionStatus::Success
                        } else {
                            ActionStatus::Failed
                        };
                        if let Some(line) = &outcome.output {
                            sink.emit(
                                "apps",
                                EventBody::AppOutput {
                                    id: id.clone(),
                                    line: line.clone(),
                                },
                            );
                        }
                        sink.emit(
                            "apps",
                            EventBody::AppCompleted {
                                id: id.clone(),
                                status,
                            },
                        );
                    }
                    results.insert(index, outcome);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
    });

    // anything still queued was abandoned by an interrupt
    for job in queue.into_inner().unwrap() {
        results.insert(job.index, InstallOutcome::failed("interrupted", None));
    }
    results
}
