use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::encryption::EncryptedPayload;

/// Opaque key under which a job's result is stored and polled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultId(pub String);

impl ResultId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlates log lines of one proofing attempt across the web tier and the worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(pub String);

impl TraceId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofingJobKind {
    Resolution,
    Address,
    Document,
    IppAamva,
}

impl ProofingJobKind {
    pub fn label(&self) -> &'static str {
        match self {
            ProofingJobKind::Resolution => "resolution",
            ProofingJobKind::Address => "address",
            ProofingJobKind::Document => "document",
            ProofingJobKind::IppAamva => "ipp_aamva",
        }
    }

    /// Name used for the per-job summary log event.
    pub fn job_name(&self) -> &'static str {
        match self {
            ProofingJobKind::Resolution => "ProofResolution",
            ProofingJobKind::Address => "ProofAddress",
            ProofingJobKind::Document => "ProofDocument",
            ProofingJobKind::IppAamva => "IppAamvaProofing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofingStage {
    Resolution,
    ResidentialAddress,
    StateId,
    Address,
    Document,
    DeviceProfiling,
}

impl ProofingStage {
    pub fn label(&self) -> &'static str {
        match self {
            ProofingStage::Resolution => "resolution",
            ProofingStage::ResidentialAddress => "residential_address",
            ProofingStage::StateId => "state_id",
            ProofingStage::Address => "address",
            ProofingStage::Document => "document",
            ProofingStage::DeviceProfiling => "threatmetrix",
        }
    }
}

/// Attribute names used for required-attribute checks and verified-attribute reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiAttribute {
    FirstName,
    LastName,
    Dob,
    Ssn,
    Address1,
    City,
    State,
    Zipcode,
    StateIdNumber,
    StateIdJurisdiction,
    StateIdType,
    Phone,
}

impl PiiAttribute {
    pub fn name(&self) -> &'static str {
        match self {
            PiiAttribute::FirstName => "first_name",
            PiiAttribute::LastName => "last_name",
            PiiAttribute::Dob => "dob",
            PiiAttribute::Ssn => "ssn",
            PiiAttribute::Address1 => "address1",
            PiiAttribute::City => "city",
            PiiAttribute::State => "state",
            PiiAttribute::Zipcode => "zipcode",
            PiiAttribute::StateIdNumber => "state_id_number",
            PiiAttribute::StateIdJurisdiction => "state_id_jurisdiction",
            PiiAttribute::StateIdType => "state_id_type",
            PiiAttribute::Phone => "phone",
        }
    }
}

/// Applicant PII as decrypted by the worker. Lives for the duration of one job.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantPii {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zipcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_doc_address1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_doc_address2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_doc_city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_doc_address_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_doc_zipcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_address_as_id: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_id_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_id_jurisdiction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_id_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid_prefix: Option<String>,
}

impl ApplicantPii {
    pub fn attribute(&self, attribute: PiiAttribute) -> Option<&str> {
        let value = match attribute {
            PiiAttribute::FirstName => &self.first_name,
            PiiAttribute::LastName => &self.last_name,
            PiiAttribute::Dob => &self.dob,
            PiiAttribute::Ssn => &self.ssn,
            PiiAttribute::Address1 => &self.address1,
            PiiAttribute::City => &self.city,
            PiiAttribute::State => &self.state,
            PiiAttribute::Zipcode => &self.zipcode,
            PiiAttribute::StateIdNumber => &self.state_id_number,
            PiiAttribute::StateIdJurisdiction => &self.state_id_jurisdiction,
            PiiAttribute::StateIdType => &self.state_id_type,
            PiiAttribute::Phone => &self.phone,
        };
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Required attributes that are absent or blank, in the order they were requested.
    pub fn missing_attributes(&self, required: &[PiiAttribute]) -> Vec<PiiAttribute> {
        required
            .iter()
            .copied()
            .filter(|attribute| self.attribute(*attribute).is_none())
            .collect()
    }

    /// True when the applicant entered a residential address that differs from the ID address.
    pub fn has_distinct_residential_address(&self) -> bool {
        self.same_address_as_id == Some(false) && self.identity_doc_address1.is_some()
    }

    /// Applicant with the address fields replaced by the identity-document address.
    pub fn id_address_view(&self) -> ApplicantPii {
        if !self.has_distinct_residential_address() {
            return self.clone();
        }
        ApplicantPii {
            address1: self.identity_doc_address1.clone(),
            address2: self.identity_doc_address2.clone(),
            city: self.identity_doc_city.clone(),
            state: self.identity_doc_address_state.clone(),
            zipcode: self.identity_doc_zipcode.clone(),
            ..self.clone()
        }
    }

    /// Applicant carrying only the residential address, without state-ID details.
    pub fn residential_address_view(&self) -> ApplicantPii {
        ApplicantPii {
            state_id_number: None,
            state_id_jurisdiction: None,
            state_id_type: None,
            identity_doc_address1: None,
            identity_doc_address2: None,
            identity_doc_city: None,
            identity_doc_address_state: None,
            identity_doc_zipcode: None,
            ..self.clone()
        }
    }

    fn present_fields(&self) -> Vec<&'static str> {
        let fields: [(&'static str, bool); 23] = [
            ("first_name", self.first_name.is_some()),
            ("middle_name", self.middle_name.is_some()),
            ("last_name", self.last_name.is_some()),
            ("name_suffix", self.name_suffix.is_some()),
            ("dob", self.dob.is_some()),
            ("ssn", self.ssn.is_some()),
            ("address1", self.address1.is_some()),
            ("address2", self.address2.is_some()),
            ("city", self.city.is_some()),
            ("state", self.state.is_some()),
            ("zipcode", self.zipcode.is_some()),
            ("identity_doc_address1", self.identity_doc_address1.is_some()),
            ("identity_doc_address2", self.identity_doc_address2.is_some()),
            ("identity_doc_city", self.identity_doc_city.is_some()),
            (
                "identity_doc_address_state",
                self.identity_doc_address_state.is_some(),
            ),
            ("identity_doc_zipcode", self.identity_doc_zipcode.is_some()),
            ("same_address_as_id", self.same_address_as_id.is_some()),
            ("state_id_number", self.state_id_number.is_some()),
            ("state_id_jurisdiction", self.state_id_jurisdiction.is_some()),
            ("state_id_type", self.state_id_type.is_some()),
            ("phone", self.phone.is_some()),
            ("email", self.email.is_some()),
            ("uuid", self.uuid.is_some()),
        ];
        fields
            .into_iter()
            .filter_map(|(name, present)| present.then_some(name))
            .collect()
    }
}

impl fmt::Debug for ApplicantPii {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicantPii")
            .field("present", &self.present_fields())
            .finish_non_exhaustive()
    }
}

/// References to the captured document images (storage keys, not bytes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentImages {
    pub front_image: String,
    pub back_image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selfie_image: Option<String>,
}

/// Plaintext carried inside the encrypted arguments of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofingArguments {
    pub applicant_pii: ApplicantPii,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentImages>,
}

impl ProofingArguments {
    pub fn for_applicant(applicant_pii: ApplicantPii) -> Self {
        Self {
            applicant_pii,
            document: None,
        }
    }
}

/// Non-sensitive job parameters that travel next to the ciphertext.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_provider_app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threatmetrix_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_ip: Option<String>,
    #[serde(default)]
    pub ipp_enrollment_in_progress: bool,
    #[serde(default)]
    pub double_address_verification: bool,
}

/// Unit of work handed to the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub kind: ProofingJobKind,
    pub result_id: ResultId,
    pub encrypted_arguments: EncryptedPayload,
    pub trace_id: TraceId,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default)]
    pub options: JobOptions,
}
