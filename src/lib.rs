//! # brrtrest
//!
//! **brrtrest** turns static descriptions of REST resource classes into an
//! immutable routing tree and one pre-built handler chain per resource method,
//! then runs requests through those chains on `may` coroutines.
//!
//! ## Overview
//!
//! All decisions that can be taken once are taken at deployment time: template
//! precedence, interceptor ordering, where a blocking hop happens, which body
//! writer serialises an entity, how each parameter is extracted and converted.
//! A request only walks the chain it was routed to.
//!
//! ## Architecture
//!
//! - **[`template`]** - URI templates (`/widgets/{id}`, `{path: .*}`) compiled to
//!   anchored regexes with a total specificity order
//! - **[`mapping`]** - ordered template tables returning the first match plus
//!   captured values and the unmatched remainder
//! - **[`model`]** - resource classes, methods, parameters, interceptor
//!   registrations, features and chain customizers
//! - **[`deployment`]** - builds the chains and the class → method → template
//!   routing tables
//! - **[`handlers`]** - every step a chain can contain
//! - **[`executor`]** - drives a [`context::RequestContext`] through its chain,
//!   switching to the abort chain on failure
//! - **[`serialisers`]**, **[`parameters`]**, **[`exceptions`]** - body readers and
//!   writers, parameter extraction and conversion, exception mapping
//! - **[`manifest`]** and **[`cli`]** - YAML deployment descriptions and the
//!   `brrtrest` inspection tool
//!
//! ### Deployment flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant User
//!     participant Mgr as RuntimeDeploymentManager
//!     participant Int as RuntimeInterceptorDeployment
//!     participant Res as RuntimeResourceDeployment
//!     participant Map as RuntimeMappingDeployment
//!
//!     User->>Mgr: deploy(DeploymentInfo)
//!     Mgr->>Mgr: apply Features, sort interceptors
//!     Mgr->>Int: instantiate global and name-bound interceptors
//!     loop every resource method
//!         Mgr->>Res: build_resource_method
//!         Res->>Int: for_method(ResourceInfo)
//!         Int-->>Res: filters and interceptors for this method
//!         Res-->>Mgr: RuntimeResource (handler chain, abort chain, score)
//!     end
//!     Mgr->>Map: build_method_mapper / build_class_mapper
//!     Map-->>Mgr: ClassMapper per class template
//!     Mgr-->>User: Deployment
//! ```
//!
//! ### Request flow
//!
//! ```text
//! Deployment::handle
//!   └─ pre-match filters → InitialHandler (prefix, class template)
//!        └─ ClassRoutingHandler (HTTP method, method template)
//!             └─ RuntimeResource::handler_chain
//!                  filters → [blocking hop] → body → instance → parameters
//!                  → invocation → writer selection → response filters → writer
//!             on failure: abort chain (exception mapping → response → writer)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use brrtrest::context::ServerRequest;
//! use brrtrest::deployment::{DeploymentInfo, RuntimeDeploymentManager};
//! use brrtrest::model::{MethodParameter, ResourceClass, ServerResourceMethod, TypeDescriptor};
//! use brrtrest::spi::{EndpointResult, Instance};
//! use http::Method;
//! use std::sync::Arc;
//!
//! let get = ServerResourceMethod::new(
//!     "get",
//!     Some(Method::GET),
//!     Some("{id}"),
//!     Arc::new(|_: Option<&Instance>, args: &[serde_json::Value]| {
//!         Ok(EndpointResult::Entity(serde_json::json!({ "id": args[0] })))
//!     }),
//! )
//! .with_parameter(MethodParameter::path("id", TypeDescriptor::class("Long")))
//! .with_produces(vec![mime::APPLICATION_JSON]);
//!
//! let class = ResourceClass::new("Widgets", Some("/widgets"), Arc::new(|| Arc::new(()) as Instance))
//!     .with_method(get);
//! let deployment = RuntimeDeploymentManager::deploy(DeploymentInfo::new().with_resource_class(class))?;
//! let response = deployment.handle(ServerRequest::new(Method::GET, "/widgets/7"));
//! assert_eq!(response.status, 200);
//! ```
//!
//! ## Logging
//!
//! The library emits `tracing` events only. Binaries install a subscriber with
//! [`logging::init_logging_with_config`]; see [`logging`] for the `BRRTR_LOG_*`
//! variables.

pub mod cli;
pub mod context;
pub mod deployment;
pub mod echo;
pub mod error;
pub mod exceptions;
pub mod executor;
pub mod handlers;
pub mod logging;
pub mod manifest;
pub mod mapping;
pub mod media;
pub mod model;
pub mod parameters;
pub mod runtime_config;
pub mod serialisers;
pub mod spi;
pub mod template;
pub mod worker_pool;

pub use context::{RequestContext, ServerRequest, ServerResponse};
pub use deployment::{Deployment, DeploymentInfo, RuntimeDeploymentManager};
pub use error::{DeploymentError, HandlerError};
pub use runtime_config::RuntimeConfig;
pub use template::URITemplate;
