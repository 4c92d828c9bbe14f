//! # Handler Steps
//!
//! Every step deployment can put into a handler chain. Each one is a small
//! [`ServerRestHandler`](crate::spi::ServerRestHandler) that reads and writes the
//! [`RequestContext`](crate::context::RequestContext); the order of the steps is
//! decided entirely at build time.
//!
//! | Step | Role |
//! |---|---|
//! | `AbortChainHandler` | installs the resource's abort chain |
//! | `InterceptorHandler` | exposes reader/writer interceptors |
//! | `BlockingHandler`, `VirtualThreadHandler`, `NonBlockingHandler` | executor hops |
//! | `FormBodyHandler`, `InputHandler`, `RequestDeserializeHandler` | request body |
//! | `ResourceRequestFilterHandler`, `ResourceResponseFilterHandler` | filters |
//! | `InstanceHandler`, `PerRequestInstanceHandler` | resource instance |
//! | `ParameterHandler`, `InvocationHandler` | arguments and the call |
//! | `FixedProducesHandler`, `VariableProducesHandler` | response media type |
//! | `ResponseHandler`, `ResponseWriterHandler`, `SseResponseWriterHandler` | output |
//! | `ExceptionHandler` | failure mapping in abort chains |
//! | `InitialHandler`, `ClassRoutingHandler`, `MediaTypeMapper`, `ResourceLocatorHandler` | routing |

mod body;
mod filters;
mod flow;
mod invocation;
mod response;
mod routing;

#[cfg(test)]
mod tests;

pub use body::{parse_multipart, parse_urlencoded, FormBodyHandler, InputHandler, RequestDeserializeHandler};
pub use filters::{ResourceRequestFilterHandler, ResourceResponseFilterHandler};
pub use flow::{
    AbortChainHandler, BlockingHandler, InterceptorHandler, NonBlockingHandler, ReaderInterceptors,
    VirtualThreadHandler, WriterInterceptors,
};
pub use invocation::{InstanceHandler, InvocationHandler, ParameterHandler, PerRequestInstanceHandler};
pub use response::{
    ExceptionHandler, FixedProducesHandler, ResponseHandler, ResponseWriterHandler, SseResponseWriterHandler,
    VariableProducesHandler,
};
pub use routing::{
    strip_deployment_prefix, strip_matrix_params, ClassRoutingHandler, InitialHandler, MediaTypeMapper,
    ResourceLocatorHandler,
};
