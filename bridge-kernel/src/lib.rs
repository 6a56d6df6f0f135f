//! Decision parsing, dispatch, and the request pipeline.
//!
//! A request moves through a checked state machine: the prompt is compiled
//! from the registry, the model answers, the reply is parsed into a
//! [`Decision`], and the decision is dispatched to the provider session that
//! owns the named capability. Model text never reaches a provider without
//! passing [`decision::parse`] and registry resolution first.

#![warn(missing_docs, clippy::pedantic)]

pub mod decision;
mod dispatch;
mod mediator;
mod request;
mod sink;

pub use decision::{Decision, DecisionError, DecisionResult};
pub use dispatch::{Dispatch, DispatchError, DispatchResult, Dispatcher, Invocation, dispatch};
pub use mediator::{Chain, Mediator, MediatorError, MediatorResult};
pub use request::{
    RequestEvent, RequestId, RequestLifecycle, RequestLifecycleError, RequestState,
};
pub use sink::{CollectingSink, OutcomeSink, RequestReport, TracingOutcomeSink};
