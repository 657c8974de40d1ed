//! Analysis client: one flow invocation per document, with bounded retry.
//!
//! # Output
//! The flow streams output events. Only the most recent non-empty document
//! chunk is kept; chunks are *not* concatenated. A stream that completes
//! without any non-empty chunk is an [`AnalysisFailure::EmptyOutput`].
//!
//! # Retry
//! Errors whose [`RemoteErrorKind`] is transient (access denied, internal
//! server) restart the whole invocation, up to [`RetryPolicy::max_attempts`]
//! attempts in total. After attempt `n` fails the client sleeps
//! `base_delay * 2^n` before trying again. Any other error ends the call
//! immediately.
//!
//! [`AnalysisClient::analyze`] never returns an error type the caller must
//! propagate: every failure mode is an [`AnalysisFailure`] value.

use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::FlowConfig;
use crate::contract::{FlowEvent, FlowInvoker, FlowRequest, InvokeError};

pub use crate::contract::RemoteErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Backoff unit; the wait after attempt `n` is `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisFailure {
    #[error("{error} (gave up after {attempts} attempts)")]
    RetriesExhausted { attempts: u32, error: InvokeError },
    #[error("{0}")]
    Remote(InvokeError),
    #[error("Empty output from flow")]
    EmptyOutput,
}

impl AnalysisFailure {
    /// Attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            AnalysisFailure::RetriesExhausted { attempts, .. } => *attempts,
            AnalysisFailure::Remote(_) | AnalysisFailure::EmptyOutput => 1,
        }
    }
}

pub struct AnalysisClient<F> {
    invoker: F,
    flow: FlowConfig,
    retry: RetryPolicy,
}

impl<F> AnalysisClient<F>
where
    F: FlowInvoker,
{
    pub fn new(invoker: F, flow: FlowConfig) -> Self {
        Self {
            invoker,
            flow,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Analyse `content`; `identifier` names the document in logs only.
    pub async fn analyze(&self, content: &str, identifier: &str) -> Result<String, AnalysisFailure> {
        info!(file = identifier, "Analyzing");
        let request = FlowRequest {
            flow_identifier: self.flow.flow_id.clone(),
            flow_alias_identifier: self.flow.flow_alias_id.clone(),
            document: content.to_string(),
        };

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        let result = loop {
            match self.invoke_once(&request).await {
                Ok(Some(output)) => break Ok(output),
                Ok(None) => break Err(AnalysisFailure::EmptyOutput),
                Err(e) if e.kind.is_transient() && attempt + 1 < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        file = identifier,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient flow error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.kind.is_transient() => {
                    break Err(AnalysisFailure::RetriesExhausted {
                        attempts: attempt + 1,
                        error: e,
                    })
                }
                Err(e) => break Err(AnalysisFailure::Remote(e)),
            }
        };

        match &result {
            Ok(output) => debug!(file = identifier, chars = output.len(), "Flow returned output"),
            Err(e) => error!(file = identifier, error = %e, "Error analyzing file"),
        }
        result
    }

    /// One full invocation: send the request and drain the stream.
    async fn invoke_once(&self, request: &FlowRequest) -> Result<Option<String>, InvokeError> {
        let mut stream = self.invoker.invoke_flow(request).await?;
        let mut final_output = None;
        while let Some(event) = stream.next().await {
            match event? {
                FlowEvent::Output(Some(chunk)) if !chunk.is_empty() => final_output = Some(chunk),
                FlowEvent::Output(_) => {}
                FlowEvent::Completion(reason) => debug!(reason = %reason, "Flow completed"),
                FlowEvent::Other => {}
            }
        }
        Ok(final_output)
    }
}
