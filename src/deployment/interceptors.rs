//! Interceptor registry of a deployment.
//!
//! Every registered filter and interceptor is instantiated exactly once, in
//! priority order. Methods without name bindings or dynamic registrations share
//! the precomputed global handlers; everything else gets a fresh merge.

use crate::handlers::{InterceptorHandler, ResourceRequestFilterHandler, ResourceResponseFilterHandler};
use crate::model::{
    DynamicFeature, DynamicFeatureContext, ResourceInfo, ResourceInterceptor, ResourceInterceptors,
};
use crate::spi::{ContainerRequestFilter, ContainerResponseFilter, ReaderInterceptor, ServerRestHandler, WriterInterceptor};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// A registration together with its single instance.
struct Instantiated<T: ?Sized> {
    registration: ResourceInterceptor<T>,
    instance: Arc<T>,
}

fn instantiate<T: ?Sized>(registrations: &[ResourceInterceptor<T>]) -> Vec<Instantiated<T>> {
    let mut sorted: Vec<ResourceInterceptor<T>> = registrations.to_vec();
    sorted.sort_by_key(ResourceInterceptor::sort_key);
    sorted
        .into_iter()
        .map(|registration| {
            let instance = registration.factory.create_instance();
            Instantiated { registration, instance }
        })
        .collect()
}

/// Global, then method specific, then matching name-bound, stable-sorted by
/// priority so equal priorities keep that order.
fn merge<'a, T: ?Sized>(
    global: &'a [Instantiated<T>],
    dynamic: &'a [Instantiated<T>],
    name_bound: &'a [Instantiated<T>],
    bindings: &BTreeSet<String>,
) -> Vec<&'a Instantiated<T>> {
    let mut merged: Vec<&Instantiated<T>> = global
        .iter()
        .chain(dynamic)
        .chain(
            name_bound
                .iter()
                .filter(|i| i.registration.name_bindings.is_subset(bindings)),
        )
        .collect();
    merged.sort_by_key(|i| i.registration.priority);
    merged
}

fn request_filter_handler(i: &Instantiated<dyn ContainerRequestFilter>, pre_match: bool) -> Arc<ResourceRequestFilterHandler> {
    Arc::new(ResourceRequestFilterHandler::new(
        Arc::clone(&i.instance),
        pre_match,
        i.registration.non_blocking_required,
        i.registration.read_body,
    ))
}

fn interceptor_handler(
    readers: Vec<Arc<dyn ReaderInterceptor>>,
    writers: Vec<Arc<dyn WriterInterceptor>>,
) -> Option<Arc<InterceptorHandler>> {
    if readers.is_empty() && writers.is_empty() {
        return None;
    }
    let readers = (!readers.is_empty()).then(|| Arc::from(readers));
    let writers = (!writers.is_empty()).then(|| Arc::from(writers));
    Some(Arc::new(InterceptorHandler::new(readers, writers)))
}

/// Instantiated interceptors of a deployment plus the handlers shared by every
/// method that only sees global interceptors.
pub struct RuntimeInterceptorDeployment {
    global_request: Vec<Instantiated<dyn ContainerRequestFilter>>,
    name_request: Vec<Instantiated<dyn ContainerRequestFilter>>,
    pre_match_request: Vec<Instantiated<dyn ContainerRequestFilter>>,
    global_response: Vec<Instantiated<dyn ContainerResponseFilter>>,
    name_response: Vec<Instantiated<dyn ContainerResponseFilter>>,
    global_reader: Vec<Instantiated<dyn ReaderInterceptor>>,
    name_reader: Vec<Instantiated<dyn ReaderInterceptor>>,
    global_writer: Vec<Instantiated<dyn WriterInterceptor>>,
    name_writer: Vec<Instantiated<dyn WriterInterceptor>>,
    global_request_handlers: Vec<Arc<ResourceRequestFilterHandler>>,
    global_response_handlers: Vec<Arc<dyn ServerRestHandler>>,
    global_interceptor_handler: Option<Arc<InterceptorHandler>>,
    dynamic_features: Vec<Arc<dyn DynamicFeature>>,
}

impl RuntimeInterceptorDeployment {
    pub fn new(interceptors: &ResourceInterceptors, dynamic_features: Vec<Arc<dyn DynamicFeature>>) -> Self {
        let requests = &interceptors.container_request_filters;
        let global_request = instantiate(requests.global());
        let global_response = instantiate(interceptors.container_response_filters.global());
        let global_reader = instantiate(interceptors.reader_interceptors.global());
        let global_writer = instantiate(interceptors.writer_interceptors.global());

        let global_request_handlers = global_request
            .iter()
            .map(|i| request_filter_handler(i, false))
            .collect();
        let global_response_handlers = global_response
            .iter()
            .map(|i| {
                Arc::new(ResourceResponseFilterHandler::new(Arc::clone(&i.instance))) as Arc<dyn ServerRestHandler>
            })
            .collect();
        let global_interceptor_handler = interceptor_handler(
            global_reader.iter().map(|i| Arc::clone(&i.instance)).collect(),
            global_writer.iter().map(|i| Arc::clone(&i.instance)).collect(),
        );

        let deployment = Self {
            name_request: instantiate(requests.name_bound()),
            pre_match_request: instantiate(requests.pre_match()),
            name_response: instantiate(interceptors.container_response_filters.name_bound()),
            name_reader: instantiate(interceptors.reader_interceptors.name_bound()),
            name_writer: instantiate(interceptors.writer_interceptors.name_bound()),
            global_request,
            global_response,
            global_reader,
            global_writer,
            global_request_handlers,
            global_response_handlers,
            global_interceptor_handler,
            dynamic_features,
        };
        debug!(
            request_filters = deployment.global_request.len() + deployment.name_request.len(),
            pre_match_filters = deployment.pre_match_request.len(),
            response_filters = deployment.global_response.len() + deployment.name_response.len(),
            reader_interceptors = deployment.global_reader.len() + deployment.name_reader.len(),
            writer_interceptors = deployment.global_writer.len() + deployment.name_writer.len(),
            dynamic_features = deployment.dynamic_features.len(),
            "Interceptors instantiated"
        );
        deployment
    }

    /// Reader/writer step for chains that only see global interceptors.
    #[must_use]
    pub fn global_interceptor_handler(&self) -> Option<&Arc<InterceptorHandler>> {
        self.global_interceptor_handler.as_ref()
    }

    #[must_use]
    pub fn global_request_filter_handlers(&self) -> &[Arc<ResourceRequestFilterHandler>] {
        &self.global_request_handlers
    }

    #[must_use]
    pub fn global_response_filter_handlers(&self) -> &[Arc<dyn ServerRestHandler>] {
        &self.global_response_handlers
    }

    /// Handlers for filters that run before routing, in priority order.
    #[must_use]
    pub fn pre_match_handlers(&self) -> Vec<Arc<dyn ServerRestHandler>> {
        self.pre_match_request
            .iter()
            .map(|i| request_filter_handler(i, true) as Arc<dyn ServerRestHandler>)
            .collect()
    }

    /// Interceptor view for one method. Dynamic features are evaluated here,
    /// once per method.
    #[must_use]
    pub fn for_method(&self, info: &ResourceInfo) -> MethodInterceptorContext<'_> {
        let mut dynamic = ResourceInterceptors::default();
        if !self.dynamic_features.is_empty() {
            let mut ctx = DynamicFeatureContext::default();
            for feature in &self.dynamic_features {
                feature.configure(info, &mut ctx);
            }
            dynamic = ctx.into_interceptors();
        }
        MethodInterceptorContext {
            deployment: self,
            bindings: info.name_bindings.clone(),
            request: instantiate(dynamic.container_request_filters.global()),
            response: instantiate(dynamic.container_response_filters.global()),
            reader: instantiate(dynamic.reader_interceptors.global()),
            writer: instantiate(dynamic.writer_interceptors.global()),
        }
    }
}

/// What one method sees of the registry.
pub struct MethodInterceptorContext<'a> {
    deployment: &'a RuntimeInterceptorDeployment,
    bindings: BTreeSet<String>,
    request: Vec<Instantiated<dyn ContainerRequestFilter>>,
    response: Vec<Instantiated<dyn ContainerResponseFilter>>,
    reader: Vec<Instantiated<dyn ReaderInterceptor>>,
    writer: Vec<Instantiated<dyn WriterInterceptor>>,
}

impl MethodInterceptorContext<'_> {
    /// Whether the global reader/writer step can be reused as is.
    fn reuses_global_interceptors(&self) -> bool {
        let d = self.deployment;
        let no_dynamic = self.reader.is_empty() && self.writer.is_empty();
        no_dynamic && (self.bindings.is_empty() || (d.name_reader.is_empty() && d.name_writer.is_empty()))
    }

    /// Request filters for the method in execution order.
    #[must_use]
    pub fn setup_request_filter_handler(&self) -> Vec<Arc<ResourceRequestFilterHandler>> {
        let d = self.deployment;
        if self.request.is_empty() && (self.bindings.is_empty() || d.name_request.is_empty()) {
            return d.global_request_handlers.clone();
        }
        merge(&d.global_request, &self.request, &d.name_request, &self.bindings)
            .into_iter()
            .map(|i| request_filter_handler(i, false))
            .collect()
    }

    /// Response filters for the method in execution order.
    #[must_use]
    pub fn setup_response_filter_handler(&self) -> Vec<Arc<dyn ServerRestHandler>> {
        let d = self.deployment;
        if self.response.is_empty() && (self.bindings.is_empty() || d.name_response.is_empty()) {
            return d.global_response_handlers.clone();
        }
        merge(&d.global_response, &self.response, &d.name_response, &self.bindings)
            .into_iter()
            .map(|i| {
                Arc::new(ResourceResponseFilterHandler::new(Arc::clone(&i.instance))) as Arc<dyn ServerRestHandler>
            })
            .collect()
    }

    /// The reader/writer step, or `None` when the method has no interceptors.
    #[must_use]
    pub fn setup_interceptor_handler(&self) -> Option<Arc<InterceptorHandler>> {
        let d = self.deployment;
        if self.reuses_global_interceptors() {
            return d.global_interceptor_handler.clone();
        }
        let readers = merge(&d.global_reader, &self.reader, &d.name_reader, &self.bindings)
            .into_iter()
            .map(|i| Arc::clone(&i.instance))
            .collect();
        let writers = merge(&d.global_writer, &self.writer, &d.name_writer, &self.bindings)
            .into_iter()
            .map(|i| Arc::clone(&i.instance))
            .collect();
        interceptor_handler(readers, writers)
    }

    #[must_use]
    pub fn has_writer_interceptors(&self) -> bool {
        let d = self.deployment;
        if self.reuses_global_interceptors() {
            return d
                .global_interceptor_handler
                .as_ref()
                .is_some_and(|h| h.writers().is_some());
        }
        !merge(&d.global_writer, &self.writer, &d.name_writer, &self.bindings).is_empty()
    }
}
