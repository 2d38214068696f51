mod cli;
mod demo;
mod infra;
mod routes;
mod server;

use idv_proofing::error::AppError;

pub use infra::{build_runtime, spawn_result_sweeper, AppState, ProofingRuntime};
pub use routes::with_proofing_routes;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
