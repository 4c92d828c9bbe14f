use crate::context::{Execution, RequestContext};
use crate::error::HandlerError;
use crate::executor::Dispatch;
use crate::spi::{HandlerChain, HandlerKind, ReaderInterceptor, ServerRestHandler, WriterInterceptor};
use crate::worker_pool::{VirtualExecutor, WorkerPool};
use std::sync::Arc;

/// Installs the resource's abort chain. Always the first step of a resource chain.
pub struct AbortChainHandler {
    chain: HandlerChain,
}

impl AbortChainHandler {
    pub fn new(chain: HandlerChain) -> Self {
        Self { chain }
    }

    #[must_use]
    pub fn chain(&self) -> &HandlerChain {
        &self.chain
    }
}

impl ServerRestHandler for AbortChainHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        ctx.set_abort_chain(Arc::clone(&self.chain));
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::AbortChain
    }
}

pub type ReaderInterceptors = Arc<[Arc<dyn ReaderInterceptor>]>;
pub type WriterInterceptors = Arc<[Arc<dyn WriterInterceptor>]>;

/// Makes the reader and writer interceptors of a method available to the body
/// reading and writing steps.
pub struct InterceptorHandler {
    readers: Option<ReaderInterceptors>,
    writers: Option<WriterInterceptors>,
}

impl InterceptorHandler {
    pub fn new(readers: Option<ReaderInterceptors>, writers: Option<WriterInterceptors>) -> Self {
        Self { readers, writers }
    }

    #[must_use]
    pub fn readers(&self) -> Option<&ReaderInterceptors> {
        self.readers.as_ref()
    }

    #[must_use]
    pub fn writers(&self) -> Option<&WriterInterceptors> {
        self.writers.as_ref()
    }
}

impl ServerRestHandler for InterceptorHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        ctx.reader_interceptors = self.readers.as_ref().map(Arc::clone);
        ctx.writer_interceptors = self.writers.as_ref().map(Arc::clone);
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Interceptor
    }
}

/// Continues the chain on the blocking worker pool.
pub struct BlockingHandler {
    pool: Arc<WorkerPool>,
}

impl BlockingHandler {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }
}

impl ServerRestHandler for BlockingHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        if ctx.execution() != Execution::Worker {
            ctx.suspend(Dispatch::Worker(Arc::clone(&self.pool)));
        }
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Blocking
    }
}

/// Continues the chain on a dedicated coroutine.
pub struct VirtualThreadHandler {
    executor: VirtualExecutor,
}

impl VirtualThreadHandler {
    pub fn new(executor: VirtualExecutor) -> Self {
        Self { executor }
    }
}

impl ServerRestHandler for VirtualThreadHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        if ctx.execution() != Execution::Virtual {
            ctx.suspend(Dispatch::Virtual(self.executor));
        }
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::VirtualThread
    }
}

/// Marks the rest of the chain as non-blocking: hops back to the calling thread
/// if an earlier step moved the request elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonBlockingHandler;

impl ServerRestHandler for NonBlockingHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        if ctx.execution() != Execution::EventLoop {
            ctx.suspend(Dispatch::EventLoop);
        }
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::NonBlocking
    }
}
