use super::JobContext;
use crate::proofing::domain::{ApplicantPii, ProofingJobKind, ProofingStage, ResultId};
use crate::proofing::result::{ProofingResult, StageOutcome};
use crate::proofing::retry::proof_with_retries;
use crate::proofing::timer::Timer;

pub(super) async fn run(
    context: JobContext<'_>,
    result_id: ResultId,
    applicant: &ApplicantPii,
    timer: &mut Timer,
) -> ProofingResult {
    let proofer = context.vendors.address.as_ref();
    let outcome = timer
        .time("address", proof_with_retries(context.policy, proofer, applicant))
        .await;

    let mut result = ProofingResult::new(result_id, ProofingJobKind::Address);
    result.record_stage(StageOutcome::from_vendor(ProofingStage::Address, &outcome));
    result.absorb_vendor(&outcome);
    result.finalize(outcome.success);
    result
}
