use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use crate::proofing::domain::{JobOptions, ProofingArguments, ProofingJobKind};
use crate::proofing::encryption::EncryptedPayload;
use crate::proofing::router::{result_handler, submit_handler};
use crate::proofing::vendor::VendorSet;
use crate::proofing::{
    proofing_router, InMemoryResultBackend, JobQueue, ProofingResult, ProofingService,
    QueueConfig, SubmitJob,
};

struct Harness {
    service: Arc<ProofingService<InMemoryResultBackend>>,
    _queue: JobQueue,
}

fn harness(vendors: VendorSet, capacity: usize) -> Harness {
    let dispatcher = Arc::new(dispatcher(vendors));
    let store = dispatcher.store().clone();
    let queue = JobQueue::start(
        dispatcher,
        QueueConfig {
            concurrency: 1,
            capacity,
            max_deliveries: 1,
        },
    );
    let service = Arc::new(ProofingService::new(
        encryptor(),
        queue.handle(),
        store,
        Duration::from_secs(60),
    ));
    Harness {
        service,
        _queue: queue,
    }
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

fn submission(kind: ProofingJobKind) -> SubmitJob {
    SubmitJob {
        kind,
        result_id: None,
        encrypted_arguments: encrypt(&ProofingArguments::for_applicant(applicant())),
        trace_id: None,
        options: JobOptions::default(),
    }
}

#[tokio::test]
async fn submit_handler_accepts_jobs() {
    let harness = harness(VendorSet::mock(), 4);

    let response = submit_handler::<InMemoryResultBackend>(
        State(Arc::clone(&harness.service)),
        axum::Json(submission(ProofingJobKind::Address)),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "in_progress");
    assert_eq!(body["kind"], "address");
    assert!(body["result_id"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn submit_handler_rejects_empty_ciphertext() {
    let harness = harness(VendorSet::mock(), 4);
    let mut request = submission(ProofingJobKind::Address);
    request.encrypted_arguments = EncryptedPayload(String::new());

    let response = submit_handler::<InMemoryResultBackend>(
        State(Arc::clone(&harness.service)),
        axum::Json(request),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(
        body["error"],
        "invalid proofing request: encrypted_arguments must not be empty"
    );
}

#[tokio::test]
async fn submit_handler_returns_unavailable_when_queue_is_full() {
    let (proofer, _calls) = ScriptedProofer::new(Behavior::Hang);
    let harness = harness(vendors_with_resolution(proofer), 1);

    harness
        .service
        .submit(submission(ProofingJobKind::Resolution))
        .expect("first job fits");
    let response = submit_handler::<InMemoryResultBackend>(
        State(Arc::clone(&harness.service)),
        axum::Json(submission(ProofingJobKind::Resolution)),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"], "proofing queue is full");
}

#[tokio::test]
async fn result_handler_reports_unknown_ids() {
    let harness = harness(VendorSet::mock(), 4);

    let response = result_handler::<InMemoryResultBackend>(
        State(Arc::clone(&harness.service)),
        Path("never-submitted".to_string()),
    )
    .await
    .into_response();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        json!({ "result_id": "never-submitted", "status": "none" })
    );
}

#[tokio::test]
async fn router_round_trip_returns_result_once() {
    let harness = harness(VendorSet::mock(), 4);
    let app = proofing_router(Arc::clone(&harness.service));

    let payload = serde_json::to_vec(&submission(ProofingJobKind::IppAamva)).expect("serialize");
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/proofing/jobs")
                .header("content-type", "application/json")
                .body(Body::from(payload))
                .expect("request"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let result_id = body_json(response).await["result_id"]
        .as_str()
        .expect("result id")
        .to_string();

    let uri = format!("/api/v1/proofing/results/{result_id}");
    let done = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let response = app
                .clone()
                .oneshot(Request::get(uri.as_str()).body(Body::empty()).expect("request"))
                .await
                .expect("router responds");
            if response.status() != StatusCode::ACCEPTED {
                return response;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job finishes");

    assert_eq!(done.status(), StatusCode::OK);
    let body = body_json(done).await;
    assert_eq!(body["status"], "done");
    let result: ProofingResult =
        serde_json::from_value(body["result"].clone()).expect("result envelope");
    assert!(result.success);
    assert_eq!(result.result_id.as_str(), result_id);

    let again = app
        .oneshot(Request::get(uri.as_str()).body(Body::empty()).expect("request"))
        .await
        .expect("router responds");
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn result_handler_reports_missing_after_wait_window() {
    let (proofer, _calls) = ScriptedProofer::new(Behavior::Hang);
    let harness = harness(vendors_with_resolution(proofer), 4);
    let submitted = harness
        .service
        .submit(submission(ProofingJobKind::Resolution))
        .expect("accepted");

    let pending = result_handler::<InMemoryResultBackend>(
        State(Arc::clone(&harness.service)),
        Path(submitted.result_id.0.clone()),
    )
    .await
    .into_response();
    assert_eq!(pending.status(), StatusCode::ACCEPTED);

    tokio::time::advance(Duration::from_secs(61)).await;

    let missing = result_handler::<InMemoryResultBackend>(
        State(Arc::clone(&harness.service)),
        Path(submitted.result_id.0.clone()),
    )
    .await
    .into_response();
    assert_eq!(missing.status(), StatusCode::GONE);
}
