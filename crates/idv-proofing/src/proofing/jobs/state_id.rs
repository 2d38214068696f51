use super::JobContext;
use crate::proofing::domain::{ApplicantPii, ProofingJobKind, ProofingStage, ResultId};
use crate::proofing::result::{AamvaStatus, ErrorMap, FailureCode, ProofingResult, StageOutcome};
use crate::proofing::retry::proof_with_retries;
use crate::proofing::timer::Timer;

const VERIFICATION_FAILED_MESSAGE: &str = "Document could not be verified.";

/// In-person proofing: verify the state ID against AAMVA only.
pub(super) async fn run(
    context: JobContext<'_>,
    result_id: ResultId,
    applicant: &ApplicantPii,
    timer: &mut Timer,
) -> ProofingResult {
    let proofer = context.vendors.state_id.as_ref();
    let outcome = timer
        .time("state_id", proof_with_retries(context.policy, proofer, applicant))
        .await;

    if outcome.timed_out {
        tracing::warn!(
            vendor = proofer.vendor_name(),
            step = "ipp_aamva_proofing_job",
            "state id verification timed out"
        );
    } else if outcome.failure == Some(FailureCode::VendorUnavailable) {
        tracing::warn!(
            vendor = proofer.vendor_name(),
            step = "ipp_aamva_proofing_job",
            "state id vendor was unreachable"
        );
    } else if let Some(exception) = &outcome.exception {
        tracing::error!(
            vendor = proofer.vendor_name(),
            step = "ipp_aamva_proofing_job",
            exception = %exception,
            "state id verification raised an exception"
        );
    }

    let mut result = ProofingResult::new(result_id, ProofingJobKind::IppAamva);
    result.record_stage(StageOutcome::from_vendor(ProofingStage::StateId, &outcome));
    result.absorb_vendor(&outcome);

    result.errors = if outcome.success {
        ErrorMap::new()
    } else {
        ErrorMap::from([(
            "verification".to_string(),
            vec![VERIFICATION_FAILED_MESSAGE.to_string()],
        )])
    };
    result.aamva_status = Some(if outcome.success {
        AamvaStatus::Passed
    } else {
        AamvaStatus::Failed
    });
    result.finalize(outcome.success);
    result
}
