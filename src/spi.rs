//! Extension points shared by deployment and the request runtime.
//!
//! Every step of a handler chain implements [`ServerRestHandler`]. User code plugs
//! in through the filter and interceptor traits, [`EndpointInvoker`] and
//! [`BeanFactory`].

use crate::context::{RequestContext, Response};
use crate::error::HandlerError;
use mime::Mime;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A resource instance or sub-resource returned by a locator.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// An immutable handler chain shared by every request routed to it.
pub type HandlerChain = Arc<[Arc<dyn ServerRestHandler>]>;

/// Closed set of handler step kinds, used for introspection and chain comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    AbortChain,
    Interceptor,
    Blocking,
    VirtualThread,
    NonBlocking,
    FormBody,
    RequestFilter,
    PreMatchRequestFilter,
    ResponseFilter,
    Input,
    RequestDeserialize,
    Instance,
    PerRequestInstance,
    Parameter,
    Invocation,
    ResourceLocator,
    Response,
    FixedProduces,
    VariableProduces,
    ResponseWriter,
    SseResponseWriter,
    Exception,
    Initial,
    ClassRouting,
    MediaTypeMapper,
    Custom,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One step of a handler chain.
pub trait ServerRestHandler: Send + Sync {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError>;

    fn kind(&self) -> HandlerKind {
        HandlerKind::Custom
    }
}

impl fmt::Debug for dyn ServerRestHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Produces instances of resources, interceptors and other managed objects.
pub trait BeanFactory<T>: Send + Sync {
    fn create_instance(&self) -> T;
}

impl<T, F> BeanFactory<T> for F
where
    F: Fn() -> T + Send + Sync,
{
    fn create_instance(&self) -> T {
        self()
    }
}

/// A sub-resource returned by a locator method, routed by its class name.
#[derive(Clone)]
pub struct SubResource {
    pub class_name: String,
    pub instance: Instance,
}

impl fmt::Debug for SubResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubResource")
            .field("class_name", &self.class_name)
            .finish_non_exhaustive()
    }
}

/// What an endpoint invocation produced.
#[derive(Debug, Clone)]
pub enum EndpointResult {
    /// Entity to be written with the negotiated writer.
    Entity(Value),
    /// A fully built response.
    Response(Response),
    /// Locator result, dispatched further by the resource locator step.
    SubResource(SubResource),
    /// `void` methods.
    Empty,
}

/// Calls the endpoint with the resolved instance and extracted arguments.
pub trait EndpointInvoker: Send + Sync {
    fn invoke(
        &self,
        instance: Option<&Instance>,
        args: &[Value],
    ) -> Result<EndpointResult, HandlerError>;
}

impl<F> EndpointInvoker for F
where
    F: Fn(Option<&Instance>, &[Value]) -> Result<EndpointResult, HandlerError> + Send + Sync,
{
    fn invoke(
        &self,
        instance: Option<&Instance>,
        args: &[Value],
    ) -> Result<EndpointResult, HandlerError> {
        self(instance, args)
    }
}

/// Runs before the endpoint. A filter aborts with [`RequestContext::abort_with`].
pub trait ContainerRequestFilter: Send + Sync {
    fn filter(&self, ctx: &mut RequestContext) -> Result<(), HandlerError>;
}

impl<F> ContainerRequestFilter for F
where
    F: Fn(&mut RequestContext) -> Result<(), HandlerError> + Send + Sync,
{
    fn filter(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        self(ctx)
    }
}

/// Runs after the response has been created and before it is written.
pub trait ContainerResponseFilter: Send + Sync {
    fn filter(&self, ctx: &RequestContext, response: &mut Response) -> Result<(), HandlerError>;
}

impl<F> ContainerResponseFilter for F
where
    F: Fn(&RequestContext, &mut Response) -> Result<(), HandlerError> + Send + Sync,
{
    fn filter(&self, ctx: &RequestContext, response: &mut Response) -> Result<(), HandlerError> {
        self(ctx, response)
    }
}

/// Wraps request body reading.
pub trait ReaderInterceptor: Send + Sync {
    fn around_read(&self, body: Vec<u8>, media_type: &Mime) -> Result<Vec<u8>, HandlerError>;
}

/// Wraps response body writing.
pub trait WriterInterceptor: Send + Sync {
    fn around_write(&self, body: Vec<u8>, media_type: &Mime) -> Result<Vec<u8>, HandlerError>;
}
