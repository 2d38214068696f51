use super::JobContext;
use crate::proofing::domain::{DocumentImages, ProofingJobKind, ProofingStage, ResultId};
use crate::proofing::result::{ProofingResult, StageOutcome, VendorResult};
use crate::proofing::retry::call_with_retries;
use crate::proofing::timer::Timer;

pub(super) async fn run(
    context: JobContext<'_>,
    result_id: ResultId,
    images: &DocumentImages,
    timer: &mut Timer,
) -> ProofingResult {
    let proofer = context.vendors.document.as_ref();
    let attempted = timer
        .time(
            "document",
            call_with_retries(context.policy, proofer.vendor_name(), || {
                proofer.verify(images)
            }),
        )
        .await;

    let mut result = ProofingResult::new(result_id, ProofingJobKind::Document);
    let outcome = match attempted.outcome {
        Ok(verification) => {
            let mut outcome = verification.result;
            outcome.attempts = attempted.attempts;
            if outcome.success {
                result.pii_from_doc = verification.pii_from_doc;
            }
            outcome
        }
        Err(error) => VendorResult::from_error(proofer.vendor_name(), &error, attempted.attempts),
    };

    result.record_stage(StageOutcome::from_vendor(ProofingStage::Document, &outcome));
    result.absorb_vendor(&outcome);
    result.finalize(outcome.success);
    result
}
