//! Policy evaluation: resolve the application, submit a bill of materials,
//! then poll for the verdict.
//!
//! ```text
//! ResolvingApplication -> Submitting -> Polling -> Succeeded | Failed | Aborted
//! ```
//!
//! A `Failure` policy action is a successful evaluation with a negative
//! verdict ([`PolicyVerdict::Violation`]). Everything that stops the
//! evaluation from finishing is an [`AuditError`].

mod bom;
mod http;

pub use bom::build_bom;
pub use http::HttpPolicyTransport;

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PolicyConfig;
use crate::error::{AuditError, AuditResult};
use crate::model::{CoordinateReport, PolicyJob, PolicyResult, PolicyVerdict};

/// The calls a policy server must answer.
#[async_trait]
pub trait PolicyTransport: Send + Sync {
    /// Internal id for a public application id, `None` when unknown.
    async fn resolve_application(&self, public_id: &str) -> AuditResult<Option<String>>;

    async fn submit(&self, internal_id: &str, stage: &str, bom: String) -> AuditResult<PolicyJob>;

    /// `None` while the evaluation is still running.
    async fn poll(&self, job: &PolicyJob) -> AuditResult<Option<PolicyResult>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    ResolvingApplication,
    Submitting,
    Polling,
    Succeeded,
    Failed,
    Aborted,
}

impl PolicyState {
    /// Terminal state for the outcome of [`PolicyEvaluator::evaluate`].
    pub fn of(outcome: &AuditResult<PolicyResult>) -> Self {
        match outcome {
            Ok(result) if result.verdict() == PolicyVerdict::Violation => PolicyState::Failed,
            Ok(_) => PolicyState::Succeeded,
            Err(_) => PolicyState::Aborted,
        }
    }
}

pub struct PolicyEvaluator {
    transport: Box<dyn PolicyTransport>,
    stage: String,
    max_retries: u32,
    poll_interval: Duration,
}

impl PolicyEvaluator {
    pub fn new(transport: Box<dyn PolicyTransport>, config: &PolicyConfig) -> Self {
        Self {
            transport,
            stage: config.stage.clone(),
            max_retries: config.max_retries,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs a full evaluation of `reports` for the application `public_id`.
    ///
    /// Cancelling `cancel` stops the wait between status checks.
    pub async fn evaluate(
        &self,
        public_id: &str,
        reports: &[CoordinateReport],
        cancel: &CancellationToken,
    ) -> AuditResult<PolicyResult> {
        let outcome = self.run(public_id, reports, cancel).await;
        match &outcome {
            Ok(result) => info!(
                state = ?PolicyState::of(&outcome),
                action = ?result.policy_action,
                "Policy evaluation finished"
            ),
            Err(e) => warn!(state = ?PolicyState::Aborted, "Policy evaluation aborted: {}", e),
        }
        outcome
    }

    async fn run(
        &self,
        public_id: &str,
        reports: &[CoordinateReport],
        cancel: &CancellationToken,
    ) -> AuditResult<PolicyResult> {
        debug!(state = ?PolicyState::ResolvingApplication, public_id);
        let internal_id = self
            .transport
            .resolve_application(public_id)
            .await?
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuditError::ApplicationNotFound {
                public_id: public_id.to_string(),
            })?;

        debug!(state = ?PolicyState::Submitting, internal_id = %internal_id, components = reports.len());
        let bom = build_bom(reports)?;
        let job = self.transport.submit(&internal_id, &self.stage, bom).await?;

        debug!(state = ?PolicyState::Polling, status_url = %job.status_url);
        self.poll(&job, cancel).await
    }

    /// Checks the job status at most `max_retries + 1` times, waiting
    /// `poll_interval` between checks. The first terminal body wins.
    /// Cancellation interrupts both an in-flight check and the wait.
    async fn poll(&self, job: &PolicyJob, cancel: &CancellationToken) -> AuditResult<PolicyResult> {
        let attempts = self.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AuditError::Cancelled),
                status = self.transport.poll(job) => status?,
            };

            if let Some(result) = status {
                if result.is_error {
                    return Err(AuditError::PolicyEvaluationFailed {
                        message: result.error_message,
                    });
                }
                return Ok(result);
            }

            if attempt < attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AuditError::Cancelled),
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        Err(AuditError::PollTimeout { attempts })
    }
}
