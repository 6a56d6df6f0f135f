//! The full mediation pipeline: compile, ask, parse, dispatch.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use bridge_adapters::{AdapterError, CompletionSettings, ModelAdapter, complete};
use bridge_prompts::PromptCompiler;
use bridge_registry::{CapabilityRegistry, RegistryResult, SessionPool};
use thiserror::Error;
use tracing::debug;

use crate::decision::{self, Decision, DecisionError};
use crate::dispatch::{Dispatch, DispatchError, Dispatcher, Invocation};
use crate::request::{RequestEvent, RequestId, RequestLifecycle, RequestLifecycleError};
use crate::sink::{OutcomeSink, RequestReport, TracingOutcomeSink};

/// Result alias for mediated requests.
pub type MediatorResult<T> = Result<T, MediatorError>;

/// Stage at which a mediated request failed.
#[derive(Debug, Error)]
pub enum MediatorError {
    /// The model could not be queried.
    #[error("model query failed: {0}")]
    Model(#[from] AdapterError),

    /// The model reply could not be turned into a decision.
    #[error(transparent)]
    Decision(#[from] DecisionError),

    /// The decision could not be executed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The pipeline attempted an out-of-order stage.
    #[error(transparent)]
    Lifecycle(#[from] RequestLifecycleError),
}

/// Invocations made by [`Mediator::handle_chain`], in call order.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    steps: Vec<Invocation>,
    settled: bool,
}

impl Chain {
    /// Every completed invocation.
    #[must_use]
    pub fn steps(&self) -> &[Invocation] {
        &self.steps
    }

    /// The final invocation, whose result answers the request.
    #[must_use]
    pub fn last(&self) -> Option<&Invocation> {
        self.steps.last()
    }

    /// Whether the model ended the chain before the step limit.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled
    }
}

/// Drives requests through the model and the providers.
///
/// Owns the registry and the warm sessions discovered for it; requests are
/// handled one at a time through `&mut self`.
pub struct Mediator {
    adapter: Arc<dyn ModelAdapter>,
    compiler: PromptCompiler,
    settings: CompletionSettings,
    dispatcher: Dispatcher,
    registry: CapabilityRegistry,
    sessions: SessionPool,
    sink: Arc<dyn OutcomeSink>,
}

impl fmt::Debug for Mediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metadata = self.adapter.metadata();
        f.debug_struct("Mediator")
            .field("provider", &metadata.provider())
            .field("model", &metadata.model())
            .field("capabilities", &self.registry.len())
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl Mediator {
    /// Creates a mediator over a discovered registry and its sessions.
    #[must_use]
    pub fn new(
        adapter: Arc<dyn ModelAdapter>,
        registry: CapabilityRegistry,
        sessions: SessionPool,
    ) -> Self {
        Self {
            adapter,
            compiler: PromptCompiler::default(),
            settings: CompletionSettings::default(),
            dispatcher: Dispatcher::default(),
            registry,
            sessions,
            sink: Arc::new(TracingOutcomeSink),
        }
    }

    /// Replaces the prompt compiler.
    #[must_use]
    pub fn with_compiler(mut self, compiler: PromptCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Replaces the completion settings.
    #[must_use]
    pub fn with_settings(mut self, settings: CompletionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replaces the dispatcher.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Replaces the outcome sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Registry the prompt is compiled from.
    #[must_use]
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Open provider sessions.
    #[must_use]
    pub fn sessions(&self) -> &SessionPool {
        &self.sessions
    }

    /// Prompt that [`Mediator::handle`] would send for `request`.
    #[must_use]
    pub fn compile(&self, request: &str) -> String {
        self.compiler.compile(request, &self.registry)
    }

    /// Runs one request to a terminal state and reports it to the sink.
    ///
    /// # Errors
    ///
    /// Returns the [`MediatorError`] of the first failing stage. Nothing is
    /// retried.
    pub async fn handle(&mut self, request: &str) -> MediatorResult<Dispatch> {
        let mut lifecycle = RequestLifecycle::new(RequestId::random());
        let mut report = RequestReport::new(lifecycle.request_id(), request);

        let outcome = self.run(&mut lifecycle, &mut report, request).await;
        match &outcome {
            Ok(dispatch) => report.finish(lifecycle.state(), Some(dispatch), None),
            Err(err) => {
                if !lifecycle.state().is_terminal() {
                    let _ = lifecycle.transition(RequestEvent::Fail);
                }
                report.finish(lifecycle.state(), None, Some(err.to_string()));
            }
        }

        self.sink.record(&report);
        outcome
    }

    /// Runs up to `max_steps` requests, feeding each result into the next.
    ///
    /// Every step is a separate request through [`Mediator::handle`] with its
    /// own lifecycle and report. From the second step on, the request text
    /// carries the results collected so far. The chain ends when the model
    /// needs no further capability or when `max_steps` invocations have
    /// completed.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step; earlier results are
    /// dropped.
    pub async fn handle_chain(
        &mut self,
        request: &str,
        max_steps: usize,
    ) -> MediatorResult<Chain> {
        let mut steps: Vec<Invocation> = Vec::new();
        while steps.len() < max_steps {
            match self.handle(&follow_up(request, &steps)).await? {
                Dispatch::NoAction => return Ok(Chain { steps, settled: true }),
                Dispatch::Completed(invocation) => {
                    debug!(
                        step = steps.len() + 1,
                        capability = invocation.capability(),
                        "chain step completed"
                    );
                    steps.push(invocation);
                }
            }
        }
        Ok(Chain { steps, settled: false })
    }

    /// Closes every provider session.
    ///
    /// # Errors
    ///
    /// Returns the first session close failure.
    pub async fn shutdown(self) -> RegistryResult<()> {
        self.sessions.shutdown().await
    }

    async fn run(
        &mut self,
        lifecycle: &mut RequestLifecycle,
        report: &mut RequestReport,
        request: &str,
    ) -> MediatorResult<Dispatch> {
        let prompt = self.compiler.compile(request, &self.registry);
        lifecycle.transition(RequestEvent::Compile)?;

        let reply = complete(self.adapter.as_ref(), &prompt, &self.settings).await?;
        lifecycle.transition(RequestEvent::QueryModel)?;
        report.set_reply(&reply);
        debug!(request_id = %lifecycle.request_id(), %reply, "model reply");

        let decision = decision::parse(&reply)?;
        lifecycle.transition(RequestEvent::Parse)?;
        report.set_decision(&decision);

        if decision == Decision::NoActionNeeded {
            lifecycle.transition(RequestEvent::Skip)?;
            return Ok(Dispatch::NoAction);
        }

        lifecycle.transition(RequestEvent::Dispatch)?;
        let dispatch = self
            .dispatcher
            .dispatch(decision, &self.registry, &mut self.sessions)
            .await?;
        lifecycle.transition(RequestEvent::Complete)?;
        Ok(dispatch)
    }
}

fn follow_up(request: &str, steps: &[Invocation]) -> String {
    if steps.is_empty() {
        return request.to_owned();
    }

    let mut text = format!("{request}\n\nCapability results so far:");
    for step in steps {
        let arguments = serde_json::Value::Object(step.arguments().clone());
        let _ = write!(text, "\n- {}({arguments}) = {}", step.capability(), step.text());
    }
    text.push_str(
        "\nIf these results answer the request, reply \"No capability needed.\" \
         Otherwise choose the next capability.",
    );
    text
}
