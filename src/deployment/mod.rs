//! # Deployment
//!
//! Build-time assembly of the routing tree and handler chains.
//!
//! [`RuntimeDeploymentManager::deploy`] takes a [`DeploymentInfo`] and produces an
//! immutable [`Deployment`]:
//!
//! 1. features and interceptors are registered and instantiated
//!    ([`RuntimeInterceptorDeployment`]),
//! 2. every resource method becomes a [`RuntimeResource`] with a fixed handler
//!    chain and abort chain ([`RuntimeResourceDeployment`]),
//! 3. resources are folded into class template → HTTP method → method template
//!    tables ([`RuntimeMappingDeployment`]).
//!
//! Nothing built here is mutated afterwards; requests only read it.

mod info;
mod interceptors;
mod manager;
mod mapping;
mod resource;
mod score;

pub use info::DeploymentInfo;
pub use interceptors::{MethodInterceptorContext, RuntimeInterceptorDeployment};
pub use manager::{Deployment, RuntimeDeploymentManager};
pub use mapping::RuntimeMappingDeployment;
pub use resource::RuntimeResourceDeployment;
pub use score::{Category, Diagnostic, Score};

use crate::mapping::RequestMapper;
use crate::media::ServerMediaType;
use crate::model::{ClassExceptionMapper, ResourceInfo, TypeDescriptor};
use crate::spi::{BeanFactory, EndpointInvoker, HandlerChain, Instance};
use crate::template::URITemplate;
use http::Method;
use mime::Mime;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// One deployed resource method: its routing keys and its handler chains.
#[derive(Clone)]
pub struct RuntimeResource {
    /// `None` for sub-resource locators.
    pub http_method: Option<Method>,
    pub path: Option<URITemplate>,
    pub class_path: Option<URITemplate>,
    pub produces: ServerMediaType,
    pub consumes: Vec<Mime>,
    pub invoker: Arc<dyn EndpointInvoker>,
    pub factory: Arc<dyn BeanFactory<Instance>>,
    pub handler_chain: HandlerChain,
    /// Run when any step of `handler_chain` aborts or fails.
    pub abort_chain: HandlerChain,
    pub method_name: String,
    pub parameter_types: Vec<TypeDescriptor>,
    pub return_type: TypeDescriptor,
    pub blocking: bool,
    pub class_name: String,
    pub resource_info: ResourceInfo,
    /// Position of every named path variable in the request's parameter array.
    pub path_parameter_indexes: BTreeMap<String, usize>,
    pub score: Score,
    pub sse_element_type: Option<String>,
    pub class_exception_mappers: Vec<ClassExceptionMapper>,
}

impl RuntimeResource {
    /// `Class#method`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}#{}", self.class_name, self.method_name)
    }
}

impl fmt::Debug for RuntimeResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeResource")
            .field("class_name", &self.class_name)
            .field("method_name", &self.method_name)
            .field("http_method", &self.http_method)
            .field("path", &self.path.as_ref().map(URITemplate::template))
            .field("handler_chain", &self.handler_chain)
            .field("path_parameter_indexes", &self.path_parameter_indexes)
            .finish_non_exhaustive()
    }
}

/// Routing table of one class template: HTTP method (`None` for locators) to
/// method templates.
pub type ClassMapper = HashMap<Option<Method>, RequestMapper<Arc<RuntimeResource>>>;

/// Routing tables of every class usable as a sub-resource, by class name.
pub type LocatorRegistry = HashMap<String, ClassMapper>;

/// Value of the root table: the chain continuing after a class template match.
#[derive(Clone)]
pub struct InitialMatch {
    pub handlers: HandlerChain,
    /// Path variables of the class template and its longest method template.
    pub max_params: usize,
}

impl fmt::Debug for InitialMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitialMatch")
            .field("handlers", &self.handlers)
            .field("max_params", &self.max_params)
            .finish()
    }
}
