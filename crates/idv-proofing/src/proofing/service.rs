use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::domain::{JobOptions, JobRequest, ProofingArguments, ProofingJobKind, ResultId, TraceId};
use super::encryption::{EncryptedPayload, EncryptionContext, EncryptionError, PayloadEncryptor};
use super::queue::{QueueError, QueueHandle};
use super::session::{AsyncState, ProofingSession};
use super::store::{ResultBackend, ResultStore, StoreError};

/// Submission as received from the web tier. The arguments are already encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJob {
    pub kind: ProofingJobKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<ResultId>,
    pub encrypted_arguments: EncryptedPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    #[serde(default)]
    pub options: JobOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub result_id: ResultId,
    pub trace_id: TraceId,
    pub kind: ProofingJobKind,
    pub status: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid proofing request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Encryption(#[from] EncryptionError),
}

/// Front door of the pipeline: accepts jobs, tracks the requesting sessions, and answers
/// polls from the result store.
pub struct ProofingService<B> {
    encryptor: PayloadEncryptor,
    queue: QueueHandle,
    store: ResultStore<B>,
    sessions: Mutex<HashMap<ResultId, ProofingSession>>,
    async_wait_timeout: Duration,
}

impl<B> ProofingService<B>
where
    B: ResultBackend + 'static,
{
    pub fn new(
        encryptor: PayloadEncryptor,
        queue: QueueHandle,
        store: ResultStore<B>,
        async_wait_timeout: Duration,
    ) -> Self {
        Self {
            encryptor,
            queue,
            store,
            sessions: Mutex::new(HashMap::new()),
            async_wait_timeout,
        }
    }

    pub fn submit(&self, request: SubmitJob) -> Result<SubmittedJob, ServiceError> {
        if request.encrypted_arguments.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "encrypted_arguments must not be empty".to_string(),
            ));
        }

        let result_id = request.result_id.unwrap_or_else(ResultId::generate);
        if result_id.as_str().trim().is_empty() {
            return Err(ServiceError::InvalidRequest(
                "result_id must not be blank".to_string(),
            ));
        }
        let trace_id = request.trace_id.unwrap_or_else(TraceId::generate);

        self.queue.enqueue(JobRequest {
            kind: request.kind,
            result_id: result_id.clone(),
            encrypted_arguments: request.encrypted_arguments,
            trace_id: trace_id.clone(),
            enqueued_at: Utc::now(),
            options: request.options,
        })?;

        self.sessions()?
            .insert(result_id.clone(), ProofingSession::new(result_id.clone()));

        tracing::info!(
            kind = request.kind.label(),
            result_id = %result_id,
            trace_id = %trace_id,
            "proofing job enqueued"
        );

        Ok(SubmittedJob {
            result_id,
            trace_id,
            kind: request.kind,
            status: "in_progress".to_string(),
        })
    }

    /// Encrypts plaintext arguments and submits them. Used by in-process callers.
    pub fn enqueue_arguments(
        &self,
        kind: ProofingJobKind,
        arguments: &ProofingArguments,
        options: JobOptions,
    ) -> Result<SubmittedJob, ServiceError> {
        let encrypted_arguments = self
            .encryptor
            .seal(arguments, EncryptionContext::ProofingArguments)?;
        self.submit(SubmitJob {
            kind,
            result_id: None,
            encrypted_arguments,
            trace_id: None,
            options,
        })
    }

    /// Terminal states (`Done`, `Missing`) end the session.
    pub fn poll(&self, result_id: &ResultId) -> Result<AsyncState, ServiceError> {
        let session = match self.sessions()?.get(result_id) {
            Some(session) => session.clone(),
            None => return Ok(AsyncState::None),
        };

        let state = session.poll(&self.store, self.async_wait_timeout)?;
        if state.is_terminal() {
            self.sessions()?.remove(result_id);
        }
        Ok(state)
    }

    /// Forgets sessions that were never polled to completion. A session older than the wait
    /// window plus the result TTL can only ever report `Missing`.
    pub fn purge_stale_sessions(&self) -> Result<usize, ServiceError> {
        let horizon = self.async_wait_timeout + self.store.ttl();
        let mut sessions = self.sessions()?;
        let before = sessions.len();
        sessions.retain(|_, session| session.requested_at.elapsed() <= horizon);
        let purged = before - sessions.len();
        if purged > 0 {
            tracing::debug!(purged, "forgot abandoned proofing sessions");
        }
        Ok(purged)
    }

    /// Sessions still waiting for a result.
    pub fn pending(&self) -> Result<usize, ServiceError> {
        Ok(self.sessions()?.len())
    }

    pub fn store(&self) -> &ResultStore<B> {
        &self.store
    }

    fn sessions(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<ResultId, ProofingSession>>, ServiceError> {
        self.sessions.lock().map_err(|_| {
            ServiceError::Store(StoreError::Unavailable(
                "session map mutex poisoned".to_string(),
            ))
        })
    }
}
