//! Job bodies. Each job turns decrypted arguments into a [`ProofingResult`]; vendor failures
//! end up inside the envelope, never as an `Err`.

mod address;
mod document;
mod resolution;
mod state_id;

use super::domain::{JobOptions, ProofingArguments, ProofingJobKind, ResultId};
use super::result::{FailureCode, ProofingResult};
use super::retry::RetryPolicy;
use super::timer::Timer;
use super::vendor::VendorSet;
use crate::config::ProofingConfig;

pub use resolution::ResolutionSummary;

/// Everything a job body needs besides its arguments.
#[derive(Debug, Clone, Copy)]
pub struct JobContext<'a> {
    pub vendors: &'a VendorSet,
    pub config: &'a ProofingConfig,
    pub policy: &'a RetryPolicy,
}

/// Per-stage flags reported in the job summary log line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageFlags {
    pub resolution_success: Option<bool>,
    pub residential_resolution_success: Option<bool>,
    pub state_id_success: Option<bool>,
    pub device_profiling_success: Option<bool>,
}

#[derive(Debug)]
pub struct JobRun {
    pub result: ProofingResult,
    pub flags: StageFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("document job submitted without document images")]
    MissingDocumentImages,
}

impl JobError {
    pub fn failure_code(&self) -> FailureCode {
        match self {
            JobError::MissingDocumentImages => FailureCode::InvalidInput,
        }
    }
}

pub async fn run_job(
    kind: ProofingJobKind,
    context: JobContext<'_>,
    result_id: ResultId,
    arguments: ProofingArguments,
    options: &JobOptions,
    timer: &mut Timer,
) -> Result<JobRun, JobError> {
    match kind {
        ProofingJobKind::Resolution => {
            let (result, summary) = resolution::run(
                context,
                result_id,
                &arguments.applicant_pii,
                options,
                timer,
            )
            .await;
            Ok(JobRun {
                result,
                flags: summary.into(),
            })
        }
        ProofingJobKind::Address => {
            let result = address::run(context, result_id, &arguments.applicant_pii, timer).await;
            Ok(JobRun {
                result,
                flags: StageFlags::default(),
            })
        }
        ProofingJobKind::Document => {
            let images = arguments.document.ok_or(JobError::MissingDocumentImages)?;
            let result = document::run(context, result_id, &images, timer).await;
            Ok(JobRun {
                result,
                flags: StageFlags::default(),
            })
        }
        ProofingJobKind::IppAamva => {
            let result = state_id::run(context, result_id, &arguments.applicant_pii, timer).await;
            let flags = StageFlags {
                state_id_success: Some(result.success),
                ..StageFlags::default()
            };
            Ok(JobRun { result, flags })
        }
    }
}
