use std::time::Duration;

use tokio::time::Instant;

use super::domain::ResultId;
use super::result::ProofingResult;
use super::store::{ResultBackend, ResultStore, StoreError};

/// Poll state of a submitted job as seen by the requesting session.
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncState {
    /// No job is known for this id.
    None,
    InProgress,
    Done(Box<ProofingResult>),
    /// The wait window elapsed without a result.
    Missing,
}

impl AsyncState {
    pub fn label(&self) -> &'static str {
        match self {
            AsyncState::None => "none",
            AsyncState::InProgress => "in_progress",
            AsyncState::Done(_) => "done",
            AsyncState::Missing => "missing",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AsyncState::Done(_) | AsyncState::Missing)
    }
}

/// Handle kept by the requester between submit and the final poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofingSession {
    pub result_id: ResultId,
    pub requested_at: Instant,
}

impl ProofingSession {
    pub fn new(result_id: ResultId) -> Self {
        Self {
            result_id,
            requested_at: Instant::now(),
        }
    }

    /// Consumes the result when present, so a second poll after `Done` sees nothing.
    pub fn poll<B>(
        &self,
        store: &ResultStore<B>,
        async_wait_timeout: Duration,
    ) -> Result<AsyncState, StoreError>
    where
        B: ResultBackend + 'static,
    {
        if let Some(result) = store.take(&self.result_id)? {
            return Ok(AsyncState::Done(Box::new(result)));
        }

        if self.requested_at.elapsed() > async_wait_timeout {
            Ok(AsyncState::Missing)
        } else {
            Ok(AsyncState::InProgress)
        }
    }
}
