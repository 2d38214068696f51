use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::adjudication::AdjudicationReason;
use super::domain::{PiiAttribute, ProofingJobKind, ProofingStage, ResultId};
use super::vendor::VendorError;

/// `field -> messages`, as rendered to the applicant-facing tier.
pub type ErrorMap = BTreeMap<String, Vec<String>>;

/// Fixed set of user-facing failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    VerificationFailed,
    Timeout,
    VendorUnavailable,
    InvalidInput,
    InternalError,
}

impl FailureCode {
    pub fn code(&self) -> &'static str {
        match self {
            FailureCode::VerificationFailed => "verification_failed",
            FailureCode::Timeout => "timeout",
            FailureCode::VendorUnavailable => "vendor_unavailable",
            FailureCode::InvalidInput => "invalid_input",
            FailureCode::InternalError => "internal_error",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            FailureCode::VerificationFailed => "We could not verify your information.",
            FailureCode::Timeout => "The verification service took too long to respond.",
            FailureCode::VendorUnavailable => "The verification service is unavailable.",
            FailureCode::InvalidInput => "Some required information is missing.",
            FailureCode::InternalError => "Something went wrong while verifying your information.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pass,
    Review,
    Reject,
}

/// Normalized response of a single vendor call (after retries).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorResult {
    pub vendor_name: String,
    pub success: bool,
    #[serde(default)]
    pub errors: ErrorMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureCode>,
    #[serde(default)]
    pub verified_attributes: Vec<PiiAttribute>,
    #[serde(default)]
    pub failed_result_can_pass_with_additional_verification: bool,
    #[serde(default)]
    pub attributes_requiring_additional_verification: Vec<PiiAttribute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_status: Option<ReviewStatus>,
    #[serde(default)]
    pub attempts: u32,
}

impl VendorResult {
    pub fn success(vendor_name: impl Into<String>) -> Self {
        Self {
            vendor_name: vendor_name.into(),
            success: true,
            errors: ErrorMap::new(),
            transaction_id: None,
            timed_out: false,
            exception: None,
            failure: None,
            verified_attributes: Vec::new(),
            failed_result_can_pass_with_additional_verification: false,
            attributes_requiring_additional_verification: Vec::new(),
            review_status: None,
            attempts: 1,
        }
    }

    /// Vendor answered and rejected the applicant.
    pub fn failure(
        vendor_name: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut errors = ErrorMap::new();
        errors.insert(field.into(), vec![message.into()]);
        Self {
            success: false,
            errors,
            failure: Some(FailureCode::VerificationFailed),
            ..Self::success(vendor_name)
        }
    }

    /// Result recorded when the last attempt ended in `error`.
    pub fn from_error(vendor_name: impl Into<String>, error: &VendorError, attempts: u32) -> Self {
        let failure = error.failure_code();
        let mut errors = ErrorMap::new();
        if let VendorError::Validation { missing } = error {
            for attribute in missing {
                errors.insert(
                    attribute.name().to_string(),
                    vec![FailureCode::InvalidInput.message().to_string()],
                );
            }
        }

        Self {
            success: false,
            errors,
            timed_out: matches!(error, VendorError::Timeout { .. }),
            exception: Some(error.to_string()),
            failure: Some(failure),
            attempts,
            ..Self::success(vendor_name)
        }
    }

    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn with_verified_attributes(mut self, attributes: Vec<PiiAttribute>) -> Self {
        self.verified_attributes = attributes;
        self
    }

    pub fn exception_occurred(&self) -> bool {
        self.exception.is_some()
    }
}

/// Per-stage record kept in the result context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: ProofingStage,
    pub vendor_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(default)]
    pub errors: ErrorMap,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_status: Option<ReviewStatus>,
    #[serde(default)]
    pub skipped: bool,
}

impl StageOutcome {
    pub fn from_vendor(stage: ProofingStage, result: &VendorResult) -> Self {
        Self {
            stage,
            vendor_name: result.vendor_name.clone(),
            success: result.success,
            transaction_id: result.transaction_id.clone(),
            timed_out: result.timed_out,
            exception: result.exception.clone(),
            errors: result.errors.clone(),
            attempts: result.attempts,
            review_status: result.review_status,
            skipped: false,
        }
    }

    /// A stage that did not call any vendor.
    pub fn skipped(stage: ProofingStage, vendor_name: impl Into<String>) -> Self {
        Self {
            stage,
            vendor_name: vendor_name.into(),
            success: true,
            transaction_id: None,
            timed_out: false,
            exception: None,
            errors: ErrorMap::new(),
            attempts: 0,
            review_status: None,
            skipped: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProofingContext {
    #[serde(default)]
    pub stages: Vec<StageOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjudication_reason: Option<AdjudicationReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AamvaStatus {
    Passed,
    Failed,
}

/// Result envelope stored under `result_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofingResult {
    pub result_id: ResultId,
    pub kind: ProofingJobKind,
    pub success: bool,
    #[serde(default)]
    pub errors: ErrorMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub job_failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,
    #[serde(default)]
    pub context: ProofingContext,
    #[serde(default)]
    pub timing: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aamva_status: Option<AamvaStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pii_from_doc: Option<serde_json::Value>,
    pub checked_at: DateTime<Utc>,
}

impl ProofingResult {
    pub fn new(result_id: ResultId, kind: ProofingJobKind) -> Self {
        Self {
            result_id,
            kind,
            success: false,
            errors: ErrorMap::new(),
            failure: None,
            exception: None,
            timed_out: false,
            job_failed: false,
            transaction_id: None,
            vendor_name: None,
            context: ProofingContext::default(),
            timing: BTreeMap::new(),
            aamva_status: None,
            pii_from_doc: None,
            checked_at: Utc::now(),
        }
    }

    /// Envelope written when the job itself could not run.
    pub fn job_failed(
        result_id: ResultId,
        kind: ProofingJobKind,
        failure: FailureCode,
        exception: impl Into<String>,
    ) -> Self {
        let mut result = Self::new(result_id, kind);
        result.job_failed = true;
        result.failure = Some(failure);
        result.exception = Some(exception.into());
        result
            .errors
            .insert("base".to_string(), vec![failure.message().to_string()]);
        result
    }

    pub fn record_stage(&mut self, outcome: StageOutcome) {
        self.context.stages.push(outcome);
    }

    pub fn stage(&self, stage: ProofingStage) -> Option<&StageOutcome> {
        self.context.stages.iter().find(|outcome| outcome.stage == stage)
    }

    /// Folds a vendor response into the envelope. Errors are merged, the first exception
    /// and failure code win, and the first transaction id is kept.
    pub fn absorb_vendor(&mut self, result: &VendorResult) {
        for (field, messages) in &result.errors {
            let entry = self.errors.entry(field.clone()).or_default();
            for message in messages {
                if !entry.contains(message) {
                    entry.push(message.clone());
                }
            }
        }
        self.timed_out |= result.timed_out;
        if self.exception.is_none() {
            self.exception = result.exception.clone();
        }
        if !result.success && self.failure.is_none() {
            self.failure = result.failure;
        }
        if self.transaction_id.is_none() {
            self.transaction_id = result.transaction_id.clone();
        }
        if self.vendor_name.is_none() {
            self.vendor_name = Some(result.vendor_name.clone());
        }
    }

    pub fn finalize(&mut self, success: bool) {
        self.success = success;
        if success {
            self.failure = None;
        } else if self.failure.is_none() {
            self.failure = Some(FailureCode::VerificationFailed);
        }
        self.checked_at = Utc::now();
    }

    pub fn exception_occurred(&self) -> bool {
        self.exception.is_some()
    }
}
