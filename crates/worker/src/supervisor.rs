use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use xqueue_client::{GraderClient, HttpGraderClient, LmsClient};
use xqueue_core::config::QueueConfig;
use xqueue_core::Thresholds;
use xqueue_store::SubmissionStore;

use crate::push::run_push_worker;

/// Interval between supervisor monitor passes, mirroring the reference
/// consumer's `MONITOR_SLEEPTIME`.
const MONITOR_INTERVAL: Duration = Duration::from_secs(10);

struct SupervisedWorker {
    queue: QueueConfig,
    handle: JoinHandle<()>,
}

/// Starts one push worker per push-configured queue and restarts any that
/// terminate abnormally (panic), removing workers that exit normally (on
/// shutdown). Returns once every worker has stopped, i.e. after `shutdown` fires
/// and all in-flight iterations finish.
pub async fn run_supervisor(
    queues: Vec<QueueConfig>,
    store: Arc<dyn SubmissionStore>,
    lms: Arc<LmsClient>,
    thresholds: Thresholds,
    shutdown: tokio::sync::watch::Receiver<bool>,
) {
    tracing::info!("starting queue workers");

    let mut workers: Vec<SupervisedWorker> = queues
        .into_iter()
        .map(|queue| spawn_worker(queue, &store, &lms, thresholds.clone(), shutdown.clone()))
        .collect();

    while !workers.is_empty() {
        tokio::time::sleep(MONITOR_INTERVAL).await;
        monitor(&mut workers, &store, &lms, thresholds.clone(), &shutdown).await;
    }

    tracing::info!("all workers finished, exiting");
}

async fn monitor(
    workers: &mut Vec<SupervisedWorker>,
    store: &Arc<dyn SubmissionStore>,
    lms: &Arc<LmsClient>,
    thresholds: Thresholds,
    shutdown: &tokio::sync::watch::Receiver<bool>,
) {
    let mut still_running = Vec::with_capacity(workers.len());

    for worker in workers.drain(..) {
        if !worker.handle.is_finished() {
            still_running.push(worker);
            continue;
        }

        let queue = worker.queue;
        match worker.handle.await {
            Ok(()) => {
                tracing::info!(queue = %queue.name, "worker stopped");
            }
            Err(e) => {
                tracing::error!(queue = %queue.name, error = %e, "worker failed, restarting");
                if *shutdown.borrow() {
                    continue;
                }
                still_running.push(spawn_worker(queue, store, lms, thresholds.clone(), shutdown.clone()));
            }
        }
    }

    *workers = still_running;
}

fn spawn_worker(
    queue: QueueConfig,
    store: &Arc<dyn SubmissionStore>,
    lms: &Arc<LmsClient>,
    thresholds: Thresholds,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> SupervisedWorker {
    let grader_url = queue.grader_url().unwrap_or_default().to_owned();
    let grading_timeout = Duration::from_secs(thresholds.grading_timeout_seconds);
    let grader: Arc<dyn GraderClient> = Arc::new(HttpGraderClient::new(grader_url, grading_timeout));
    let store = store.clone();
    let lms = lms.clone();
    let queue_for_task = queue.clone();

    tracing::info!(queue = %queue.name, "starting worker");
    let handle = tokio::spawn(run_push_worker(queue_for_task, store, grader, lms, thresholds, shutdown));

    SupervisedWorker { queue, handle }
}
