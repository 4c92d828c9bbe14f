//! Request-time chain runner.
//!
//! A chain runs in segments. A segment walks handlers on the current executor
//! until the chain ends, a response is written, or a dispatch step asks to
//! continue elsewhere. [`execute`] then moves the context to the requested
//! executor and runs the next segment there.

use crate::context::{Execution, RequestContext, ServerResponse};
use crate::error::HandlerError;
use crate::worker_pool::{VirtualExecutor, WorkerPool};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Where the next segment of a chain should run.
#[derive(Clone)]
pub(crate) enum Dispatch {
    EventLoop,
    Worker(Arc<WorkerPool>),
    Virtual(VirtualExecutor),
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventLoop => f.write_str("EventLoop"),
            Self::Worker(pool) => write!(f, "Worker({})", pool.name()),
            Self::Virtual(_) => f.write_str("Virtual"),
        }
    }
}

/// Run handlers on the current executor until the segment ends.
pub(crate) fn run_segment(ctx: &mut RequestContext) {
    while let Some(handler) = ctx.next_handler() {
        let kind = handler.kind();
        match catch_unwind(AssertUnwindSafe(|| handler.handle(ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(
                    request_id = %ctx.request_id(),
                    handler = %kind,
                    status = err.status(),
                    error = %err,
                    "Handler failed"
                );
                ctx.fail(err);
            }
            Err(panic) => {
                error!(
                    request_id = %ctx.request_id(),
                    handler = %kind,
                    panic_message = ?panic,
                    "Handler panicked"
                );
                ctx.fail(HandlerError::Internal(format!("{kind} handler panicked")));
            }
        }
        if ctx.has_pending_dispatch() || ctx.is_complete() {
            break;
        }
    }
}

/// Drive `ctx` through its chain, hopping executors as requested, and produce
/// the response.
pub fn execute(mut ctx: RequestContext) -> ServerResponse {
    run_segment(&mut ctx);
    while let Some(dispatch) = ctx.take_dispatch() {
        debug!(
            request_id = %ctx.request_id(),
            from = ?ctx.execution(),
            to = ?dispatch,
            "Dispatching chain segment"
        );
        let next = match dispatch {
            Dispatch::EventLoop => {
                ctx.set_execution(Execution::EventLoop);
                run_segment(&mut ctx);
                Some(ctx)
            }
            Dispatch::Worker(pool) => pool.run_segment(ctx),
            Dispatch::Virtual(executor) => executor.run_segment(ctx),
        };
        ctx = match next {
            Some(ctx) => ctx,
            None => return ServerResponse::plain(503, "Service Unavailable"),
        };
    }
    ctx.into_response()
}
