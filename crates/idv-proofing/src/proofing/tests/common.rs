use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing_subscriber::fmt::MakeWriter;

use crate::config::ProofingConfig;
use crate::proofing::domain::{
    ApplicantPii, JobOptions, JobRequest, PiiAttribute, ProofingArguments, ProofingJobKind,
    ResultId, TraceId,
};
use crate::proofing::encryption::{EncryptionContext, PayloadEncryptor, KEY_LEN};
use crate::proofing::result::VendorResult;
use crate::proofing::retry::RetryPolicy;
use crate::proofing::store::{InMemoryResultBackend, ResultBackend, ResultStore, StoreError};
use crate::proofing::vendor::{Proofer, ProoferFut, VendorError, VendorSet};
use crate::proofing::{EncryptedPayload, ProofingDispatcher};

pub(super) fn encryptor() -> PayloadEncryptor {
    PayloadEncryptor::new(&[42u8; KEY_LEN])
}

pub(super) fn applicant() -> ApplicantPii {
    ApplicantPii {
        first_name: Some("Fakey".to_string()),
        last_name: Some("McFakerson".to_string()),
        dob: Some("1938-10-06".to_string()),
        ssn: Some("900-12-3456".to_string()),
        address1: Some("1 Fake Street".to_string()),
        city: Some("Great Falls".to_string()),
        state: Some("VA".to_string()),
        zipcode: Some("22066".to_string()),
        state_id_number: Some("123456789".to_string()),
        state_id_jurisdiction: Some("VA".to_string()),
        state_id_type: Some("drivers_license".to_string()),
        phone: Some("+1 703-555-1212".to_string()),
        same_address_as_id: Some(true),
        ..ApplicantPii::default()
    }
}

/// Applicant whose residential address differs from the address printed on the ID.
pub(super) fn two_address_applicant(residential_zipcode: &str) -> ApplicantPii {
    ApplicantPii {
        zipcode: Some(residential_zipcode.to_string()),
        identity_doc_address1: Some("123 Id Street".to_string()),
        identity_doc_city: Some("Arlington".to_string()),
        identity_doc_address_state: Some("VA".to_string()),
        identity_doc_zipcode: Some("22201".to_string()),
        same_address_as_id: Some(false),
        ..applicant()
    }
}

pub(super) fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        timeout: Duration::from_secs(15),
        initial_interval: Duration::from_millis(1),
        backoff_factor: 2.0,
        interval_randomness: 0.0,
        max_interval: Duration::from_millis(10),
    }
}

pub(super) fn store() -> ResultStore<InMemoryResultBackend> {
    ResultStore::new(
        Arc::new(InMemoryResultBackend::new()),
        encryptor(),
        Duration::from_secs(900),
    )
}

pub(super) fn dispatcher(vendors: VendorSet) -> ProofingDispatcher<InMemoryResultBackend> {
    dispatcher_with_config(vendors, ProofingConfig::default())
}

pub(super) fn dispatcher_with_config(
    vendors: VendorSet,
    config: ProofingConfig,
) -> ProofingDispatcher<InMemoryResultBackend> {
    ProofingDispatcher::new(vendors, store(), encryptor(), config).with_policy(fast_policy())
}

pub(super) fn job(kind: ProofingJobKind, arguments: &ProofingArguments) -> JobRequest {
    job_with_options(kind, arguments, JobOptions::default())
}

pub(super) fn job_with_options(
    kind: ProofingJobKind,
    arguments: &ProofingArguments,
    options: JobOptions,
) -> JobRequest {
    JobRequest {
        kind,
        result_id: ResultId::generate(),
        encrypted_arguments: encrypt(arguments),
        trace_id: TraceId::generate(),
        enqueued_at: Utc::now(),
        options,
    }
}

pub(super) fn encrypt(arguments: &ProofingArguments) -> EncryptedPayload {
    encryptor()
        .seal(arguments, EncryptionContext::ProofingArguments)
        .expect("arguments seal")
}

#[derive(Debug, Clone, Copy)]
pub(super) enum Behavior {
    Hang,
    RefuseConnection,
    Panic,
    Pass,
}

/// Resolution proofer with scripted behavior that counts how often it is called.
#[derive(Debug)]
pub(super) struct ScriptedProofer {
    behavior: Behavior,
    calls: Arc<AtomicU32>,
}

impl ScriptedProofer {
    pub(super) fn new(behavior: Behavior) -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                behavior,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl Proofer for ScriptedProofer {
    fn vendor_name(&self) -> &str {
        "ScriptedResolution"
    }

    fn required_attributes(&self) -> &[PiiAttribute] {
        &[PiiAttribute::FirstName, PiiAttribute::Ssn]
    }

    fn proof<'a>(&'a self, _applicant: &'a ApplicantPii) -> ProoferFut<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior;
        Box::pin(async move {
            match behavior {
                Behavior::Hang => std::future::pending().await,
                Behavior::RefuseConnection => Err(VendorError::Connection {
                    vendor: "ScriptedResolution".to_string(),
                    message: "connection refused".to_string(),
                }),
                Behavior::Panic => panic!("scripted vendor panic"),
                Behavior::Pass => Ok(VendorResult::success("ScriptedResolution")
                    .with_verified_attributes(vec![PiiAttribute::FirstName, PiiAttribute::Ssn])),
            }
        })
    }
}

pub(super) fn vendors_with_resolution(proofer: ScriptedProofer) -> VendorSet {
    VendorSet {
        resolution: Arc::new(proofer),
        ..VendorSet::mock()
    }
}

/// Backend that rejects every write.
#[derive(Debug, Default)]
pub(super) struct UnavailableBackend;

impl ResultBackend for UnavailableBackend {
    fn write(
        &self,
        _key: &str,
        _value: EncryptedPayload,
        _ttl: Duration,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("backend offline".to_string()))
    }

    fn read(&self, _key: &str) -> Result<Option<EncryptedPayload>, StoreError> {
        Err(StoreError::Unavailable("backend offline".to_string()))
    }

    fn take(&self, _key: &str) -> Result<Option<EncryptedPayload>, StoreError> {
        Err(StoreError::Unavailable("backend offline".to_string()))
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// In-memory sink for formatted log output.
#[derive(Debug, Clone, Default)]
pub(super) struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    pub(super) fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish()
    }

    pub(super) fn contents(&self) -> String {
        let buffer = self.buffer.lock().expect("log buffer poisoned");
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .expect("log buffer poisoned")
            .extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
