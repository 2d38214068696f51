use idv_proofing::config::{ProofingConfig, WorkerConfig};
use idv_proofing::proofing::{
    InMemoryResultBackend, JobQueue, PayloadEncryptor, ProofingDispatcher, ProofingService,
    QueueConfig, ResultStore, VendorSet,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct AppState {
    pub readiness: Arc<AtomicBool>,
    pub metrics: Arc<PrometheusHandle>,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle) -> Self {
        Self {
            readiness: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(metrics),
        }
    }
}

/// Everything the process keeps alive while serving proofing jobs.
pub struct ProofingRuntime {
    pub service: Arc<ProofingService<InMemoryResultBackend>>,
    pub store: ResultStore<InMemoryResultBackend>,
    pub queue: JobQueue,
}

/// Wires store, dispatcher, worker queue and service around one encryptor.
pub fn build_runtime(
    proofing: &ProofingConfig,
    worker: &WorkerConfig,
    encryptor: PayloadEncryptor,
    vendors: VendorSet,
) -> ProofingRuntime {
    let store = ResultStore::new(
        Arc::new(InMemoryResultBackend::new()),
        encryptor.clone(),
        proofing.result_ttl,
    );
    let dispatcher = Arc::new(ProofingDispatcher::new(
        vendors,
        store.clone(),
        encryptor.clone(),
        proofing.clone(),
    ));
    let queue = JobQueue::start(dispatcher, QueueConfig::from(worker));
    let service = Arc::new(ProofingService::new(
        encryptor,
        queue.handle(),
        store.clone(),
        proofing.async_wait_timeout,
    ));

    ProofingRuntime {
        service,
        store,
        queue,
    }
}

/// Periodically drops results whose TTL elapsed without being read, and the sessions that
/// were waiting on them.
pub fn spawn_result_sweeper(
    service: Arc<ProofingService<InMemoryResultBackend>>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match service.store().purge_expired() {
                Ok(0) => {}
                Ok(purged) => debug!(purged, "purged expired proofing results"),
                Err(err) => warn!(error = %err, "proofing result sweep failed"),
            }
            if let Err(err) = service.purge_stale_sessions() {
                warn!(error = %err, "proofing session sweep failed");
            }
        }
    })
}
