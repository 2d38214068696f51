//! Asynchronous identity-proofing pipeline.
//!
//! The web tier encrypts applicant PII and submits a job; a worker decrypts it, calls the
//! proofing vendors under a bounded timeout and retry budget, and stores one encrypted result
//! envelope per `result_id`. The requesting session polls for the result and reads it once.

pub mod adjudication;
pub mod dispatcher;
pub mod domain;
pub mod encryption;
pub mod jobs;
pub mod queue;
pub mod result;
pub mod retry;
pub mod router;
pub mod service;
pub mod session;
pub mod store;
pub mod timer;
pub mod vendor;

#[cfg(test)]
mod tests;

pub use adjudication::{Adjudication, AdjudicationReason, ResultAdjudicator};
pub use dispatcher::{DispatchError, JobOutcome, ProofingDispatcher};
pub use domain::{
    ApplicantPii, DocumentImages, JobOptions, JobRequest, PiiAttribute, ProofingArguments,
    ProofingJobKind, ProofingStage, ResultId, TraceId,
};
pub use encryption::{EncryptedPayload, EncryptionContext, EncryptionError, PayloadEncryptor};
pub use queue::{JobQueue, QueueConfig, QueueError, QueueHandle};
pub use result::{
    AamvaStatus, ErrorMap, FailureCode, ProofingContext, ProofingResult, ReviewStatus,
    StageOutcome, VendorResult,
};
pub use retry::RetryPolicy;
pub use router::proofing_router;
pub use service::{ProofingService, ServiceError, SubmitJob, SubmittedJob};
pub use session::{AsyncState, ProofingSession};
pub use store::{InMemoryResultBackend, ResultBackend, ResultStore, StoreError};
pub use vendor::{
    DeviceProfiler, DeviceProfilingRequest, DocumentProofer, DocumentVerification, Proofer,
    VendorError, VendorSet,
};
