//! # Filter Module
//!
//! Runs a handler's filter chain around the handler itself.
//!
//! A chain is the concatenation of package, component and method filters,
//! computed once by the registry. Per request:
//!
//! 1. **Forward pass**: each filter's gate runs in order. A gate that
//!    declines (or fails) stops the pass at its index and the handler is
//!    never invoked.
//! 2. **Handler**: invoked only when every gate passed.
//! 3. **Backward pass**: exit hooks of the filters whose gate passed run in
//!    reverse order, whether or not the handler succeeded.
//!
//! Failures from any stage are collected and surfaced after the backward
//! pass, folded into a [`DispatchError::MultiCause`] when there is more
//! than one.
//!
//! Gates decide through their reply: [`Reply::Continue`], a JSON boolean,
//! or [`Reply::Empty`] (continue).

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::binder::{CallContext, HandlerDescriptor, Invoker, Reply};
use crate::error::DispatchError;

/// A registered filter: a gate plus an optional exit hook.
#[derive(Debug, Clone)]
pub struct Filter {
    pub name: String,
    pub gate: Arc<HandlerDescriptor>,
    pub exit: Option<Arc<HandlerDescriptor>>,
}

impl Filter {
    pub fn new(name: impl Into<String>, gate: Arc<HandlerDescriptor>, exit: Option<Arc<HandlerDescriptor>>) -> Self {
        Self {
            name: name.into(),
            gate,
            exit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    NotStarted,
    RunningForward,
    HandlerInvoked,
    ShortCircuited,
    RunningBackward,
    Done,
}

/// Per-request cursor through a filter chain.
#[derive(Debug)]
pub struct FilterChainState {
    state: ChainState,
    /// Number of gates that passed.
    passed: usize,
    errors: Vec<DispatchError>,
}

impl Default for FilterChainState {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterChainState {
    pub fn new() -> Self {
        Self {
            state: ChainState::NotStarted,
            passed: 0,
            errors: Vec::new(),
        }
    }

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    fn advance(&mut self, next: ChainState) {
        debug!(from = ?self.state, to = ?next, passed = self.passed, "Filter chain transition");
        self.state = next;
    }
}

/// How a chain run ended when nothing failed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome {
    /// Every gate passed; the handler's reply.
    Completed(Reply),
    /// Gate `filter` declined; the handler was not invoked.
    ShortCircuited { filter: String },
}

fn gate_decision(filter: &Filter, reply: Reply) -> Result<bool, DispatchError> {
    match reply {
        Reply::Continue(go) => Ok(go),
        Reply::Empty => Ok(true),
        Reply::Value(serde_json::Value::Bool(go)) => Ok(go),
        other => Err(DispatchError::InvalidReply {
            handler: filter.gate.name.clone(),
            expected: "continue",
            got: other.kind(),
        }),
    }
}

/// Run `handler` behind its filter chain.
///
/// # Errors
///
/// Every failure raised by a gate, the handler, or an exit hook, folded
/// with [`DispatchError::aggregate`]. Exit hooks always run first.
pub fn run_chain(
    invoker: &Invoker,
    handler: &HandlerDescriptor,
    ctx: &mut CallContext<'_>,
) -> Result<ChainOutcome, DispatchError> {
    let mut chain = FilterChainState::new();
    let outcome = run_with_state(invoker, handler, ctx, &mut chain);
    match DispatchError::aggregate(chain.errors) {
        Some(err) => Err(err),
        None => Ok(outcome.unwrap_or(ChainOutcome::Completed(Reply::Empty))),
    }
}

fn run_with_state(
    invoker: &Invoker,
    handler: &HandlerDescriptor,
    ctx: &mut CallContext<'_>,
    chain: &mut FilterChainState,
) -> Option<ChainOutcome> {
    let request_id = ctx.request_id();
    chain.advance(ChainState::RunningForward);

    let mut blocked_by = None;
    for filter in &handler.chain {
        match invoker
            .invoke(&filter.gate, ctx)
            .and_then(|reply| gate_decision(filter, reply))
        {
            Ok(true) => chain.passed += 1,
            Ok(false) => {
                info!(
                    request_id = %request_id,
                    handler_name = %handler.name,
                    filter = %filter.name,
                    "Filter short-circuited request"
                );
                blocked_by = Some(filter.name.clone());
                break;
            }
            Err(err) => {
                warn!(
                    request_id = %request_id,
                    filter = %filter.name,
                    error = %err,
                    "Filter gate failed"
                );
                chain.errors.push(err);
                break;
            }
        }
    }

    let mut outcome = None;
    if chain.passed == handler.chain.len() {
        chain.advance(ChainState::HandlerInvoked);
        match invoker.invoke(handler, ctx) {
            Ok(reply) => outcome = Some(ChainOutcome::Completed(reply)),
            Err(err) => chain.errors.push(err),
        }
    } else {
        chain.advance(ChainState::ShortCircuited);
        outcome = blocked_by.map(|filter| ChainOutcome::ShortCircuited { filter });
    }

    chain.advance(ChainState::RunningBackward);
    for filter in handler.chain[..chain.passed].iter().rev() {
        let Some(exit) = &filter.exit else {
            continue;
        };
        if let Err(err) = invoker.invoke(exit, ctx) {
            warn!(
                request_id = %request_id,
                filter = %filter.name,
                error = %err,
                "Filter exit hook failed"
            );
            chain.errors.push(err);
        }
    }
    chain.advance(ChainState::Done);
    outcome
}
