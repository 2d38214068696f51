use serde::{Deserialize, Serialize};

use super::result::VendorResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjudicationReason {
    PassResolutionAndStateId,
    PassResolutionWithoutStateId,
    StateIdCoversFailedResolution,
    FailStateId,
    FailResolutionSkipStateId,
    FailResolutionWithoutStateIdCoverage,
    FailDeviceProfilingException,
}

impl AdjudicationReason {
    pub fn label(&self) -> &'static str {
        match self {
            AdjudicationReason::PassResolutionAndStateId => "pass_resolution_and_state_id",
            AdjudicationReason::PassResolutionWithoutStateId => "pass_resolution_without_state_id",
            AdjudicationReason::StateIdCoversFailedResolution => {
                "state_id_covers_failed_resolution"
            }
            AdjudicationReason::FailStateId => "fail_state_id",
            AdjudicationReason::FailResolutionSkipStateId => "fail_resolution_skip_state_id",
            AdjudicationReason::FailResolutionWithoutStateIdCoverage => {
                "fail_resolution_without_state_id_coverage"
            }
            AdjudicationReason::FailDeviceProfilingException => "fail_device_profiling_exception",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjudication {
    pub success: bool,
    pub reason: AdjudicationReason,
}

impl Adjudication {
    fn pass(reason: AdjudicationReason) -> Self {
        Self {
            success: true,
            reason,
        }
    }

    fn fail(reason: AdjudicationReason) -> Self {
        Self {
            success: false,
            reason,
        }
    }
}

/// Combines the stage results of a progressive resolution job into one decision.
///
/// `resolution` is `None` when the id-address resolution was skipped, and `state_id` is
/// `None` when state-ID verification did not run.
#[derive(Debug, Clone)]
pub struct ResultAdjudicator<'a> {
    pub resolution: Option<&'a VendorResult>,
    pub residential_resolution: Option<&'a VendorResult>,
    pub state_id: Option<&'a VendorResult>,
    pub device_profiling: &'a VendorResult,
    pub should_proof_state_id: bool,
    pub double_address_verification: bool,
    pub same_address_as_id: bool,
}

impl ResultAdjudicator<'_> {
    pub fn adjudicate(&self) -> Adjudication {
        // A failed device review is recorded on the stage but does not fail the result.
        if self.device_profiling.exception_occurred() {
            return Adjudication::fail(AdjudicationReason::FailDeviceProfilingException);
        }

        if self.double_address_verification && !self.same_address_as_id {
            if let Some(residential) = self.residential_resolution {
                if !residential.success {
                    return Adjudication::fail(AdjudicationReason::FailResolutionSkipStateId);
                }
            }
        }

        if let Some(state_id) = self.state_id {
            if !state_id.success {
                return Adjudication::fail(AdjudicationReason::FailStateId);
            }
        }

        let Some(resolution) = self.resolution else {
            return Adjudication::fail(AdjudicationReason::FailResolutionWithoutStateIdCoverage);
        };

        if resolution.success {
            return if self.should_proof_state_id && self.state_id.is_some() {
                Adjudication::pass(AdjudicationReason::PassResolutionAndStateId)
            } else {
                Adjudication::pass(AdjudicationReason::PassResolutionWithoutStateId)
            };
        }

        if self.state_id_covers(resolution) {
            Adjudication::pass(AdjudicationReason::StateIdCoversFailedResolution)
        } else {
            Adjudication::fail(AdjudicationReason::FailResolutionWithoutStateIdCoverage)
        }
    }

    fn state_id_covers(&self, resolution: &VendorResult) -> bool {
        let Some(state_id) = self.state_id else {
            return false;
        };
        self.should_proof_state_id
            && state_id.success
            && resolution.failed_result_can_pass_with_additional_verification
            && resolution
                .attributes_requiring_additional_verification
                .iter()
                .all(|attribute| state_id.verified_attributes.contains(attribute))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proofing::domain::PiiAttribute;
    use crate::proofing::result::ReviewStatus;

    struct Fixture {
        resolution: VendorResult,
        residential: VendorResult,
        state_id: VendorResult,
        device: VendorResult,
        should_proof_state_id: bool,
        double_address_verification: bool,
        same_address_as_id: bool,
    }

    impl Fixture {
        fn passing() -> Self {
            Self {
                resolution: VendorResult::success("ResolutionMock"),
                residential: VendorResult::success("ResolutionMock"),
                state_id: VendorResult::success("StateIdMock"),
                device: VendorResult::success("ThreatMetrixMock"),
                should_proof_state_id: true,
                double_address_verification: false,
                same_address_as_id: true,
            }
        }

        fn adjudicate(&self) -> Adjudication {
            ResultAdjudicator {
                resolution: Some(&self.resolution),
                residential_resolution: Some(&self.residential),
                state_id: self.should_proof_state_id.then_some(&self.state_id),
                device_profiling: &self.device,
                should_proof_state_id: self.should_proof_state_id,
                double_address_verification: self.double_address_verification,
                same_address_as_id: self.same_address_as_id,
            }
            .adjudicate()
        }
    }

    fn failed_resolution(requiring: Vec<PiiAttribute>) -> VendorResult {
        let mut result = VendorResult::failure("ResolutionMock", "address", "Unverified address.");
        result.failed_result_can_pass_with_additional_verification = true;
        result.attributes_requiring_additional_verification = requiring;
        result
    }

    #[test]
    fn passes_when_resolution_and_state_id_pass() {
        let outcome = Fixture::passing().adjudicate();
        assert!(outcome.success);
        assert_eq!(outcome.reason, AdjudicationReason::PassResolutionAndStateId);
    }

    #[test]
    fn state_id_covers_failed_attributes() {
        let fixture = Fixture {
            resolution: failed_resolution(vec![PiiAttribute::Dob]),
            state_id: VendorResult::success("StateIdMock")
                .with_verified_attributes(vec![PiiAttribute::Dob, PiiAttribute::Address1]),
            ..Fixture::passing()
        };
        let outcome = fixture.adjudicate();
        assert!(outcome.success);
        assert_eq!(outcome.reason, AdjudicationReason::StateIdCoversFailedResolution);
    }

    #[test]
    fn fails_when_state_id_does_not_cover_failed_attributes() {
        let fixture = Fixture {
            resolution: failed_resolution(vec![PiiAttribute::Address1]),
            state_id: VendorResult::success("StateIdMock")
                .with_verified_attributes(vec![PiiAttribute::Dob]),
            ..Fixture::passing()
        };
        let outcome = fixture.adjudicate();
        assert!(!outcome.success);
        assert_eq!(
            outcome.reason,
            AdjudicationReason::FailResolutionWithoutStateIdCoverage
        );
    }

    #[test]
    fn unsupported_jurisdiction_relies_on_resolution_alone() {
        let failing = Fixture {
            resolution: failed_resolution(vec![PiiAttribute::Dob]),
            should_proof_state_id: false,
            ..Fixture::passing()
        };
        assert!(!failing.adjudicate().success);

        let passing = Fixture {
            should_proof_state_id: false,
            ..Fixture::passing()
        };
        assert_eq!(
            passing.adjudicate(),
            Adjudication::pass(AdjudicationReason::PassResolutionWithoutStateId)
        );
    }

    #[test]
    fn failed_state_id_fails_a_passing_resolution() {
        let fixture = Fixture {
            state_id: VendorResult::failure("StateIdMock", "state_id_number", "Unverified."),
            ..Fixture::passing()
        };
        assert_eq!(
            fixture.adjudicate(),
            Adjudication::fail(AdjudicationReason::FailStateId)
        );
    }

    #[test]
    fn device_review_failure_still_passes() {
        let mut device = VendorResult::failure("ThreatMetrixMock", "review_status", "Review.");
        device.review_status = Some(ReviewStatus::Reject);
        let fixture = Fixture {
            device,
            ..Fixture::passing()
        };
        assert!(fixture.adjudicate().success);
    }

    #[test]
    fn device_exception_fails() {
        let mut device = VendorResult::failure("ThreatMetrixMock", "base", "error");
        device.exception = Some("this is a test value".to_string());
        let fixture = Fixture {
            device,
            ..Fixture::passing()
        };
        assert_eq!(
            fixture.adjudicate(),
            Adjudication::fail(AdjudicationReason::FailDeviceProfilingException)
        );
    }

    #[test]
    fn residential_failure_skips_state_id() {
        let fixture = Fixture {
            residential: VendorResult::failure("ResolutionMock", "address", "Unverified."),
            double_address_verification: true,
            same_address_as_id: false,
            ..Fixture::passing()
        };
        assert_eq!(
            fixture.adjudicate(),
            Adjudication::fail(AdjudicationReason::FailResolutionSkipStateId)
        );
    }

    #[test]
    fn double_address_with_failing_state_id() {
        let fixture = Fixture {
            state_id: VendorResult::failure("StateIdMock", "state_id_number", "Unverified."),
            double_address_verification: true,
            same_address_as_id: false,
            ..Fixture::passing()
        };
        assert_eq!(
            fixture.adjudicate().reason,
            AdjudicationReason::FailStateId
        );
    }
}
