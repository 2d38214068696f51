use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::Instrument;

use super::domain::{JobRequest, ProofingArguments, ResultId};
use super::encryption::{EncryptionContext, PayloadEncryptor};
use super::jobs::{run_job, JobContext, StageFlags};
use super::result::{FailureCode, ProofingResult};
use super::retry::RetryPolicy;
use super::store::{ResultBackend, ResultStore, StoreError};
use super::timer::Timer;
use super::vendor::VendorSet;
use crate::config::ProofingConfig;

/// What happened to a delivered job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Stored { result_id: ResultId, success: bool },
    Discarded { result_id: ResultId, age: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to persist result {result_id}: {source}")]
    Store {
        result_id: ResultId,
        #[source]
        source: StoreError,
    },
}

/// Runs one job end to end: decrypt, proof, persist.
pub struct ProofingDispatcher<B> {
    vendors: VendorSet,
    store: ResultStore<B>,
    encryptor: PayloadEncryptor,
    config: ProofingConfig,
    policy: RetryPolicy,
}

impl<B> ProofingDispatcher<B>
where
    B: ResultBackend + 'static,
{
    pub fn new(
        vendors: VendorSet,
        store: ResultStore<B>,
        encryptor: PayloadEncryptor,
        config: ProofingConfig,
    ) -> Self {
        let policy = RetryPolicy::from(&config.vendor);
        Self {
            vendors,
            store,
            encryptor,
            config,
            policy,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &ResultStore<B> {
        &self.store
    }

    /// Vendor and decryption failures are recorded in the stored envelope. Only a failure to
    /// write the result is returned as an error.
    pub async fn perform(&self, job: &JobRequest) -> Result<JobOutcome, DispatchError> {
        let span = tracing::info_span!(
            "proofing_job",
            job = job.kind.job_name(),
            trace_id = %job.trace_id,
            result_id = %job.result_id
        );
        self.perform_in_span(job).instrument(span).await
    }

    async fn perform_in_span(&self, job: &JobRequest) -> Result<JobOutcome, DispatchError> {
        if let Some(age) = self.stale_age(job) {
            tracing::warn!(age_secs = age.as_secs(), "discarding stale proofing job");
            metrics::counter!("idv_proofing_jobs_discarded_total", "kind" => job.kind.label())
                .increment(1);
            return Ok(JobOutcome::Discarded {
                result_id: job.result_id.clone(),
                age,
            });
        }

        let started = Instant::now();
        let mut timer = Timer::new();
        let (mut result, flags) = self.execute(job, &mut timer).await;
        result.timing = timer.into_results();

        if result.exception_occurred() && !result.timed_out {
            let exception = result.exception.as_deref().unwrap_or_default();
            if !result.job_failed && result.failure == Some(FailureCode::VendorUnavailable) {
                tracing::warn!(exception, "proofing vendor was unreachable");
            } else {
                tracing::error!(
                    exception,
                    job_failed = result.job_failed,
                    "proofing job recorded an exception"
                );
            }
        }

        self.store
            .store(&result)
            .map_err(|source| DispatchError::Store {
                result_id: job.result_id.clone(),
                source,
            })?;

        tracing::info!(
            name = job.kind.job_name(),
            success = result.success,
            resolution_success = ?flags.resolution_success,
            residential_resolution_success = ?flags.residential_resolution_success,
            state_id_success = ?flags.state_id_success,
            device_profiling_success = ?flags.device_profiling_success,
            adjudication_reason = ?result.context.adjudication_reason.map(|reason| reason.label()),
            timing = ?result.timing,
            "proofing job finished"
        );
        metrics::counter!(
            "idv_proofing_jobs_total",
            "kind" => job.kind.label(),
            "outcome" => if result.success { "success" } else { "failure" }
        )
        .increment(1);
        metrics::histogram!("idv_proofing_job_duration_seconds", "kind" => job.kind.label())
            .record(started.elapsed().as_secs_f64());

        Ok(JobOutcome::Stored {
            result_id: job.result_id.clone(),
            success: result.success,
        })
    }

    async fn execute(&self, job: &JobRequest, timer: &mut Timer) -> (ProofingResult, StageFlags) {
        let mut arguments: ProofingArguments = match self
            .encryptor
            .open(&job.encrypted_arguments, EncryptionContext::ProofingArguments)
        {
            Ok(arguments) => arguments,
            Err(error) => {
                tracing::error!(error = %error, "failed to open proofing arguments");
                let result = ProofingResult::job_failed(
                    job.result_id.clone(),
                    job.kind,
                    FailureCode::InternalError,
                    error.to_string(),
                );
                return (result, StageFlags::default());
            }
        };

        arguments.applicant_pii.uuid = job.options.user_uuid.clone();
        arguments.applicant_pii.uuid_prefix = job.options.service_provider_app_id.clone();

        let context = JobContext {
            vendors: &self.vendors,
            config: &self.config,
            policy: &self.policy,
        };

        match run_job(
            job.kind,
            context,
            job.result_id.clone(),
            arguments,
            &job.options,
            timer,
        )
        .await
        {
            Ok(run) => (run.result, run.flags),
            Err(error) => {
                let result = ProofingResult::job_failed(
                    job.result_id.clone(),
                    job.kind,
                    error.failure_code(),
                    error.to_string(),
                );
                (result, StageFlags::default())
            }
        }
    }

    /// Records a terminal failure for a job that could not be completed after redelivery.
    pub fn record_crash(&self, job: &JobRequest, detail: &str) -> Result<(), DispatchError> {
        tracing::error!(
            job = job.kind.job_name(),
            trace_id = %job.trace_id,
            result_id = %job.result_id,
            detail,
            "proofing job crashed"
        );
        let result = ProofingResult::job_failed(
            job.result_id.clone(),
            job.kind,
            FailureCode::InternalError,
            detail,
        );
        self.store
            .store(&result)
            .map_err(|source| DispatchError::Store {
                result_id: job.result_id.clone(),
                source,
            })
    }

    fn stale_age(&self, job: &JobRequest) -> Option<Duration> {
        let age = (Utc::now() - job.enqueued_at).to_std().ok()?;
        (age > self.config.stale_job_after).then_some(age)
    }
}
