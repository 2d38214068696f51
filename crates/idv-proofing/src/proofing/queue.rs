//! Bounded in-process job queue with at-least-once delivery.
//!
//! A single supervisor task owns the receiver and spawns one task per job, bounded by a
//! semaphore. A job whose task panics or whose result cannot be stored is run again, up to
//! `max_deliveries` times, before a terminal failure is recorded for it.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;

use super::dispatcher::ProofingDispatcher;
use super::domain::JobRequest;
use super::store::ResultBackend;
use crate::config::WorkerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub capacity: usize,
    pub max_deliveries: u32,
}

impl From<&WorkerConfig> for QueueConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            capacity: config.queue_capacity.max(1),
            max_deliveries: config.max_deliveries.max(1),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("proofing queue is full")]
    Full,
    #[error("proofing queue is closed")]
    Closed,
}

/// Cloneable enqueue side of the queue.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    sender: mpsc::Sender<JobRequest>,
}

impl QueueHandle {
    pub fn enqueue(&self, job: JobRequest) -> Result<(), QueueError> {
        self.sender.try_send(job).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;
        metrics::gauge!("idv_proofing_queue_depth").set(self.depth() as f64);
        Ok(())
    }

    /// Jobs waiting to be picked up.
    pub fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

pub struct JobQueue {
    handle: QueueHandle,
    shutdown: watch::Sender<bool>,
    supervisor: JoinHandle<()>,
}

impl JobQueue {
    /// Spawns the supervisor. Must be called inside a tokio runtime.
    pub fn start<B>(dispatcher: Arc<ProofingDispatcher<B>>, config: QueueConfig) -> Self
    where
        B: ResultBackend + 'static,
    {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let (shutdown, shutdown_signal) = watch::channel(false);
        let supervisor = tokio::spawn(supervise(dispatcher, receiver, shutdown_signal, config));

        Self {
            handle: QueueHandle { sender },
            shutdown,
            supervisor,
        }
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    /// Stops accepting jobs, finishes the ones already queued, and waits for in-flight work.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        drop(self.handle);
        if let Err(error) = self.supervisor.await {
            tracing::error!(error = %error, "proofing queue supervisor failed");
        }
    }
}

async fn supervise<B>(
    dispatcher: Arc<ProofingDispatcher<B>>,
    mut receiver: mpsc::Receiver<JobRequest>,
    mut shutdown: watch::Receiver<bool>,
    config: QueueConfig,
) where
    B: ResultBackend + 'static,
{
    let concurrency = config.concurrency.max(1);
    let permits = Arc::new(Semaphore::new(concurrency));
    let mut closing = false;

    loop {
        let next = if closing {
            receiver.recv().await
        } else {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("proofing queue draining");
                    receiver.close();
                    closing = true;
                    continue;
                }
                next = receiver.recv() => next,
            }
        };
        let Some(job) = next else {
            break;
        };

        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let dispatcher = Arc::clone(&dispatcher);
        let max_deliveries = config.max_deliveries;
        tokio::spawn(async move {
            deliver(dispatcher, job, max_deliveries).await;
            drop(permit);
        });
    }

    let in_flight = u32::try_from(concurrency).unwrap_or(u32::MAX);
    let _ = permits.acquire_many(in_flight).await;
    tracing::info!("proofing queue stopped");
}

async fn deliver<B>(dispatcher: Arc<ProofingDispatcher<B>>, job: JobRequest, max_deliveries: u32)
where
    B: ResultBackend + 'static,
{
    let max_deliveries = max_deliveries.max(1);
    let mut last_failure = String::new();

    for delivery in 1..=max_deliveries {
        let attempt_dispatcher = Arc::clone(&dispatcher);
        let attempt_job = job.clone();
        let attempt =
            tokio::spawn(async move { attempt_dispatcher.perform(&attempt_job).await }).await;

        match attempt {
            Ok(Ok(_)) => return,
            Ok(Err(error)) => {
                tracing::warn!(
                    result_id = %job.result_id,
                    delivery,
                    error = %error,
                    "proofing job delivery failed"
                );
                last_failure = error.to_string();
            }
            Err(error) => {
                let detail = if error.is_panic() {
                    "proofing job panicked"
                } else {
                    "proofing job was cancelled"
                };
                tracing::warn!(result_id = %job.result_id, delivery, "{detail}");
                last_failure = detail.to_string();
            }
        }

        if delivery < max_deliveries {
            metrics::counter!("idv_proofing_job_redeliveries_total", "kind" => job.kind.label())
                .increment(1);
        }
    }

    if let Err(error) = dispatcher.record_crash(&job, &last_failure) {
        tracing::error!(
            result_id = %job.result_id,
            error = %error,
            "could not record failure for proofing job"
        );
    }
}
