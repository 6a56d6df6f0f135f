//! Observers for finished requests.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::decision::Decision;
use crate::dispatch::Dispatch;
use crate::request::{RequestId, RequestState};

/// Everything known about one request once it reached a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestReport {
    request_id: RequestId,
    request: String,
    state: RequestState,
    reply: Option<String>,
    decision: Option<Decision>,
    outcome: Option<Dispatch>,
    error: Option<String>,
}

impl RequestReport {
    pub(crate) fn new(request_id: RequestId, request: &str) -> Self {
        Self {
            request_id,
            request: request.to_owned(),
            state: RequestState::Received,
            reply: None,
            decision: None,
            outcome: None,
            error: None,
        }
    }

    pub(crate) fn set_reply(&mut self, reply: &str) {
        self.reply = Some(reply.to_owned());
    }

    pub(crate) fn set_decision(&mut self, decision: &Decision) {
        self.decision = Some(decision.clone());
    }

    pub(crate) fn finish(
        &mut self,
        state: RequestState,
        outcome: Option<&Dispatch>,
        error: Option<String>,
    ) {
        self.state = state;
        self.outcome = outcome.cloned();
        self.error = error;
    }

    /// Request identifier.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// The user's request text.
    #[must_use]
    pub fn request(&self) -> &str {
        &self.request
    }

    /// Terminal state reached.
    #[must_use]
    pub const fn state(&self) -> RequestState {
        self.state
    }

    /// Raw model reply, if the model answered.
    #[must_use]
    pub fn reply(&self) -> Option<&str> {
        self.reply.as_deref()
    }

    /// Parsed decision, if parsing succeeded.
    #[must_use]
    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    /// Dispatch outcome on success.
    #[must_use]
    pub fn outcome(&self) -> Option<&Dispatch> {
        self.outcome.as_ref()
    }

    /// Error text on failure.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Receives a report for every request the mediator finishes.
pub trait OutcomeSink: Send + Sync {
    /// Records one finished request.
    fn record(&self, report: &RequestReport);
}

/// Sink that logs reports through `tracing`.
#[derive(Debug, Default)]
pub struct TracingOutcomeSink;

impl OutcomeSink for TracingOutcomeSink {
    fn record(&self, report: &RequestReport) {
        match (report.outcome(), report.error()) {
            (Some(Dispatch::Completed(invocation)), _) => info!(
                request_id = %report.request_id(),
                capability = invocation.capability(),
                provider = invocation.provider(),
                result = %invocation.text(),
                "request completed"
            ),
            (Some(Dispatch::NoAction), _) => info!(
                request_id = %report.request_id(),
                reply = report.reply().unwrap_or_default(),
                "request needed no capability"
            ),
            (None, error) => warn!(
                request_id = %report.request_id(),
                state = ?report.state(),
                error = error.unwrap_or_default(),
                "request failed"
            ),
        }
    }
}

/// Sink that keeps reports in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<RequestReport>>,
}

impl CollectingSink {
    /// Creates a shareable collecting sink.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Takes every report recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex has been poisoned by a previous panic.
    #[must_use]
    pub fn drain(&self) -> Vec<RequestReport> {
        let mut lock = self.reports.lock().expect("collecting sink poisoned");
        lock.drain(..).collect()
    }
}

impl OutcomeSink for CollectingSink {
    fn record(&self, report: &RequestReport) {
        self.reports
            .lock()
            .expect("collecting sink poisoned")
            .push(report.clone());
    }
}
