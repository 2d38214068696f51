use super::common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::proofing::domain::{JobOptions, ProofingArguments, ProofingJobKind, ResultId};
use crate::proofing::session::AsyncState;
use crate::proofing::vendor::VendorSet;
use crate::proofing::{InMemoryResultBackend, JobQueue, ProofingService, QueueConfig, QueueError};

fn queue_config(concurrency: usize, capacity: usize) -> QueueConfig {
    QueueConfig {
        concurrency,
        capacity,
        max_deliveries: 3,
    }
}

async fn wait_for_result(
    service: &ProofingService<InMemoryResultBackend>,
    result_id: &ResultId,
) -> AsyncState {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match service.poll(result_id).expect("poll succeeds") {
                AsyncState::InProgress => tokio::time::sleep(Duration::from_millis(5)).await,
                other => return other,
            }
        }
    })
    .await
    .expect("job finishes in time")
}

#[tokio::test]
async fn submitted_jobs_run_and_are_read_once() {
    let dispatcher = Arc::new(dispatcher(VendorSet::mock()));
    let store = dispatcher.store().clone();
    let queue = JobQueue::start(dispatcher, queue_config(2, 8));
    let service = ProofingService::new(
        encryptor(),
        queue.handle(),
        store,
        Duration::from_secs(60),
    );

    let submitted = service
        .enqueue_arguments(
            ProofingJobKind::Resolution,
            &ProofingArguments::for_applicant(applicant()),
            JobOptions::default(),
        )
        .expect("job accepted");
    assert_eq!(submitted.status, "in_progress");

    match wait_for_result(&service, &submitted.result_id).await {
        AsyncState::Done(result) => {
            assert!(result.success);
            assert_eq!(result.result_id, submitted.result_id);
        }
        other => panic!("expected done, got {}", other.label()),
    }

    assert_eq!(
        service.poll(&submitted.result_id).expect("poll"),
        AsyncState::None
    );
    assert_eq!(service.pending().expect("pending"), 0);
    queue.shutdown().await;
}

#[tokio::test]
async fn panicking_jobs_are_redelivered_then_recorded() {
    let (proofer, calls) = ScriptedProofer::new(Behavior::Panic);
    let dispatcher = Arc::new(dispatcher(vendors_with_resolution(proofer)));
    let store = dispatcher.store().clone();
    let queue = JobQueue::start(dispatcher, queue_config(1, 4));
    let service = ProofingService::new(
        encryptor(),
        queue.handle(),
        store,
        Duration::from_secs(60),
    );

    let submitted = service
        .enqueue_arguments(
            ProofingJobKind::Resolution,
            &ProofingArguments::for_applicant(applicant()),
            JobOptions::default(),
        )
        .expect("job accepted");

    match wait_for_result(&service, &submitted.result_id).await {
        AsyncState::Done(result) => {
            assert!(result.job_failed);
            assert_eq!(result.exception.as_deref(), Some("proofing job panicked"));
        }
        other => panic!("expected done, got {}", other.label()),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    queue.shutdown().await;
}

#[tokio::test]
async fn full_queue_rejects_new_jobs() {
    let (proofer, _calls) = ScriptedProofer::new(Behavior::Hang);
    let dispatcher = Arc::new(dispatcher(vendors_with_resolution(proofer)));
    let queue = JobQueue::start(dispatcher, queue_config(1, 1));
    let handle = queue.handle();
    let arguments = ProofingArguments::for_applicant(applicant());

    handle
        .enqueue(job(ProofingJobKind::Resolution, &arguments))
        .expect("first job fits");
    assert_eq!(handle.depth(), 1);
    assert_eq!(
        handle.enqueue(job(ProofingJobKind::Resolution, &arguments)),
        Err(QueueError::Full)
    );
}

#[tokio::test]
async fn shutdown_drains_queued_jobs_and_closes() {
    let dispatcher = Arc::new(dispatcher(VendorSet::mock()));
    let store = dispatcher.store().clone();
    let queue = JobQueue::start(dispatcher, queue_config(2, 8));
    let handle = queue.handle();
    let arguments = ProofingArguments::for_applicant(applicant());

    let jobs: Vec<_> = (0..3)
        .map(|_| job(ProofingJobKind::Address, &arguments))
        .collect();
    for request in &jobs {
        handle.enqueue(request.clone()).expect("enqueue");
    }

    queue.shutdown().await;

    for request in &jobs {
        assert!(store
            .load(&request.result_id)
            .expect("readable")
            .is_some_and(|result| result.success));
    }
    assert!(handle.is_closed());
    assert_eq!(
        handle.enqueue(job(ProofingJobKind::Address, &arguments)),
        Err(QueueError::Closed)
    );
}

#[tokio::test(start_paused = true)]
async fn abandoned_sessions_are_forgotten_after_results_expire() {
    let dispatcher = Arc::new(dispatcher(VendorSet::mock()));
    let store = dispatcher.store().clone();
    let queue = JobQueue::start(dispatcher, queue_config(4, 32));
    let service = ProofingService::new(
        encryptor(),
        queue.handle(),
        store,
        Duration::from_secs(60),
    );

    let arguments = ProofingArguments::for_applicant(applicant());
    for _ in 0..20 {
        service
            .enqueue_arguments(ProofingJobKind::Address, &arguments, JobOptions::default())
            .expect("job accepted");
    }
    queue.shutdown().await;
    assert_eq!(service.purge_stale_sessions().expect("purge"), 0);
    assert_eq!(service.pending().expect("pending"), 20);

    tokio::time::advance(Duration::from_secs(3600)).await;
    assert_eq!(service.store().purge_expired().expect("purge"), 20);

    assert_eq!(service.purge_stale_sessions().expect("purge"), 20);
    assert_eq!(service.pending().expect("pending"), 0);
}
