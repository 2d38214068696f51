use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use crate::error::AppError;

use super::domain::ResultId;
use super::service::{ProofingService, SubmitJob};
use super::session::AsyncState;
use super::store::ResultBackend;

/// Router exposing job submission and result polling.
pub fn proofing_router<B>(service: Arc<ProofingService<B>>) -> Router
where
    B: ResultBackend + 'static,
{
    Router::new()
        .route("/api/v1/proofing/jobs", post(submit_handler::<B>))
        .route(
            "/api/v1/proofing/results/:result_id",
            get(result_handler::<B>),
        )
        .with_state(service)
}

pub(crate) async fn submit_handler<B>(
    State(service): State<Arc<ProofingService<B>>>,
    axum::Json(request): axum::Json<SubmitJob>,
) -> Result<Response, AppError>
where
    B: ResultBackend + 'static,
{
    let submitted = service.submit(request)?;
    Ok((StatusCode::ACCEPTED, axum::Json(submitted)).into_response())
}

pub(crate) async fn result_handler<B>(
    State(service): State<Arc<ProofingService<B>>>,
    Path(result_id): Path<String>,
) -> Result<Response, AppError>
where
    B: ResultBackend + 'static,
{
    let id = ResultId(result_id);
    let response = match service.poll(&id)? {
        AsyncState::Done(result) => {
            let payload = json!({
                "result_id": id,
                "status": "done",
                "result": result,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        state @ AsyncState::InProgress => status_response(StatusCode::ACCEPTED, &id, &state),
        state @ AsyncState::Missing => status_response(StatusCode::GONE, &id, &state),
        state @ AsyncState::None => status_response(StatusCode::NOT_FOUND, &id, &state),
    };
    Ok(response)
}

fn status_response(status: StatusCode, id: &ResultId, state: &AsyncState) -> Response {
    let payload = json!({
        "result_id": id,
        "status": state.label(),
    });
    (status, axum::Json(payload)).into_response()
}
