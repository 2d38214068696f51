use super::{JobContext, StageFlags};
use crate::proofing::adjudication::ResultAdjudicator;
use crate::proofing::domain::{
    ApplicantPii, JobOptions, ProofingJobKind, ProofingStage, ResultId,
};
use crate::proofing::result::{ProofingResult, ReviewStatus, StageOutcome, VendorResult};
use crate::proofing::retry::{call_with_retries, proof_with_retries, vendor_result_from};
use crate::proofing::timer::Timer;
use crate::proofing::vendor::DeviceProfilingRequest;

const DEVICE_PROFILING_DISABLED: &str = "tmx_disabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionSummary {
    pub resolution_success: Option<bool>,
    pub residential_resolution_success: Option<bool>,
    pub state_id_success: Option<bool>,
    pub device_profiling_success: bool,
}

impl From<ResolutionSummary> for StageFlags {
    fn from(summary: ResolutionSummary) -> Self {
        StageFlags {
            resolution_success: summary.resolution_success,
            residential_resolution_success: summary.residential_resolution_success,
            state_id_success: summary.state_id_success,
            device_profiling_success: Some(summary.device_profiling_success),
        }
    }
}

/// Progressive proofing: device profiling, residential address (when it differs from the
/// ID address during an in-person enrollment or double address verification), ID-address
/// resolution, then state ID
/// when the jurisdiction is supported and resolution passed or can be covered.
pub(super) async fn run(
    context: JobContext<'_>,
    result_id: ResultId,
    applicant: &ApplicantPii,
    options: &JobOptions,
    timer: &mut Timer,
) -> (ProofingResult, ResolutionSummary) {
    let mut result = ProofingResult::new(result_id, ProofingJobKind::Resolution);

    let device = timer
        .time("threatmetrix", profile_device(context, applicant, options))
        .await;

    let verify_both_addresses =
        options.ipp_enrollment_in_progress || options.double_address_verification;
    let check_residential = verify_both_addresses && applicant.has_distinct_residential_address();
    let residential = if check_residential {
        let residential_applicant = applicant.residential_address_view();
        Some(
            timer
                .time(
                    "residential_address",
                    proof_with_retries(
                        context.policy,
                        context.vendors.resolution.as_ref(),
                        &residential_applicant,
                    ),
                )
                .await,
        )
    } else {
        None
    };
    let residential_failed = residential.as_ref().is_some_and(|outcome| !outcome.success);

    let id_applicant = applicant.id_address_view();
    let resolution = if residential_failed {
        None
    } else {
        Some(
            timer
                .time(
                    "resolution",
                    proof_with_retries(
                        context.policy,
                        context.vendors.resolution.as_ref(),
                        &id_applicant,
                    ),
                )
                .await,
        )
    };

    let should_proof_state_id = context
        .config
        .supports_state_id(applicant.state_id_jurisdiction.as_deref());
    let state_id = match &resolution {
        Some(outcome)
            if should_proof_state_id
                && (outcome.success
                    || outcome.failed_result_can_pass_with_additional_verification) =>
        {
            Some(
                timer
                    .time(
                        "state_id",
                        proof_with_retries(
                            context.policy,
                            context.vendors.state_id.as_ref(),
                            &id_applicant,
                        ),
                    )
                    .await,
            )
        }
        _ => None,
    };

    let mut device_stage = StageOutcome::from_vendor(ProofingStage::DeviceProfiling, &device);
    device_stage.skipped = device.vendor_name == DEVICE_PROFILING_DISABLED;
    result.record_stage(device_stage);

    if let Some(outcome) = &residential {
        result.record_stage(StageOutcome::from_vendor(
            ProofingStage::ResidentialAddress,
            outcome,
        ));
    }
    match &resolution {
        Some(outcome) => {
            result.record_stage(StageOutcome::from_vendor(ProofingStage::Resolution, outcome));
            result.absorb_vendor(outcome);
        }
        None => result.record_stage(StageOutcome::skipped(
            ProofingStage::Resolution,
            context.vendors.resolution.vendor_name(),
        )),
    }
    if let Some(outcome) = &residential {
        result.absorb_vendor(outcome);
    }
    match &state_id {
        Some(outcome) => {
            result.record_stage(StageOutcome::from_vendor(ProofingStage::StateId, outcome));
            result.absorb_vendor(outcome);
        }
        None => result.record_stage(StageOutcome::skipped(
            ProofingStage::StateId,
            context.vendors.state_id.vendor_name(),
        )),
    }
    if device.exception_occurred() {
        result.absorb_vendor(&device);
    }

    let adjudication = ResultAdjudicator {
        resolution: resolution.as_ref(),
        residential_resolution: residential.as_ref(),
        state_id: state_id.as_ref(),
        device_profiling: &device,
        should_proof_state_id,
        double_address_verification: verify_both_addresses,
        same_address_as_id: !applicant.has_distinct_residential_address(),
    }
    .adjudicate();

    result.context.adjudication_reason = Some(adjudication.reason);
    if adjudication.success {
        result.errors.clear();
    }
    result.finalize(adjudication.success);

    let summary = ResolutionSummary {
        resolution_success: resolution.as_ref().map(|outcome| outcome.success),
        residential_resolution_success: residential
            .as_ref()
            .or(resolution.as_ref())
            .map(|outcome| outcome.success),
        state_id_success: state_id.as_ref().map(|outcome| outcome.success),
        device_profiling_success: device.success,
    };

    (result, summary)
}

async fn profile_device(
    context: JobContext<'_>,
    applicant: &ApplicantPii,
    options: &JobOptions,
) -> VendorResult {
    let session_id = options
        .threatmetrix_session_id
        .as_deref()
        .map(str::trim)
        .filter(|session| !session.is_empty());

    let Some(session_id) = session_id.filter(|_| context.config.device_profiling_enabled) else {
        let mut disabled = VendorResult::success(DEVICE_PROFILING_DISABLED);
        disabled.review_status = Some(ReviewStatus::Pass);
        disabled.attempts = 0;
        return disabled;
    };

    let profiler = context.vendors.device_profiler.as_ref();
    let request_ip = options.request_ip.as_deref();
    let attempted = call_with_retries(context.policy, profiler.vendor_name(), || {
        profiler.profile(DeviceProfilingRequest {
            session_id,
            request_ip,
            applicant,
        })
    })
    .await;
    vendor_result_from(profiler.vendor_name(), attempted)
}
