use super::interceptor::{ResourceInterceptor, ResourceInterceptors};
use crate::exceptions::{ExceptionMapper, ExceptionMapping};
use crate::spi::{ContainerRequestFilter, ContainerResponseFilter, ReaderInterceptor, WriterInterceptor};
use http::Method;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Deployment-wide configuration assembled from features.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Configuration {
    pub enabled_features: Vec<String>,
    pub properties: BTreeMap<String, Value>,
}

impl Configuration {
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    #[must_use]
    pub fn is_enabled(&self, feature: &str) -> bool {
        self.enabled_features.iter().any(|f| f == feature)
    }
}

/// What a [`Feature`] may register while it is configured.
pub struct FeatureContext<'a> {
    interceptors: &'a mut ResourceInterceptors,
    exception_mapping: &'a mut ExceptionMapping,
    properties: &'a mut BTreeMap<String, Value>,
    filters_registered: bool,
}

impl<'a> FeatureContext<'a> {
    pub(crate) fn new(
        interceptors: &'a mut ResourceInterceptors,
        exception_mapping: &'a mut ExceptionMapping,
        properties: &'a mut BTreeMap<String, Value>,
    ) -> Self {
        Self {
            interceptors,
            exception_mapping,
            properties,
            filters_registered: false,
        }
    }

    pub fn register_request_filter(&mut self, filter: ResourceInterceptor<dyn ContainerRequestFilter>) {
        self.interceptors.add_request_filter(filter);
        self.filters_registered = true;
    }

    pub fn register_response_filter(&mut self, filter: ResourceInterceptor<dyn ContainerResponseFilter>) {
        self.interceptors.add_response_filter(filter);
        self.filters_registered = true;
    }

    pub fn register_reader_interceptor(&mut self, interceptor: ResourceInterceptor<dyn ReaderInterceptor>) {
        self.interceptors.add_reader_interceptor(interceptor);
        self.filters_registered = true;
    }

    pub fn register_writer_interceptor(&mut self, interceptor: ResourceInterceptor<dyn WriterInterceptor>) {
        self.interceptors.add_writer_interceptor(interceptor);
        self.filters_registered = true;
    }

    pub fn register_exception_mapper(&mut self, kind: &str, priority: i32, mapper: Arc<dyn ExceptionMapper>) {
        self.exception_mapping.add(kind, priority, mapper);
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: Value) {
        self.properties.insert(name.into(), value);
    }

    /// Whether anything was registered that requires re-sorting interceptors.
    #[must_use]
    pub(crate) fn filters_registered(&self) -> bool {
        self.filters_registered
    }
}

/// Configures the deployment once at startup. Returns whether it enabled itself.
pub trait Feature: Send + Sync {
    fn name(&self) -> &str;

    fn configure(&self, ctx: &mut FeatureContext<'_>) -> bool;
}

/// Static view of a resource method handed to dynamic features.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub class_name: String,
    pub method_name: String,
    pub http_method: Option<Method>,
    pub path: Option<String>,
    pub name_bindings: BTreeSet<String>,
}

/// Collects interceptors a dynamic feature registers for one method.
#[derive(Default)]
pub struct DynamicFeatureContext {
    interceptors: ResourceInterceptors,
}

impl DynamicFeatureContext {
    pub fn register_request_filter(&mut self, filter: ResourceInterceptor<dyn ContainerRequestFilter>) {
        self.interceptors.add_request_filter(strip_bindings(filter));
    }

    pub fn register_response_filter(&mut self, filter: ResourceInterceptor<dyn ContainerResponseFilter>) {
        self.interceptors.add_response_filter(strip_bindings(filter));
    }

    pub fn register_reader_interceptor(&mut self, interceptor: ResourceInterceptor<dyn ReaderInterceptor>) {
        self.interceptors.add_reader_interceptor(strip_bindings(interceptor));
    }

    pub fn register_writer_interceptor(&mut self, interceptor: ResourceInterceptor<dyn WriterInterceptor>) {
        self.interceptors.add_writer_interceptor(strip_bindings(interceptor));
    }

    pub(crate) fn into_interceptors(mut self) -> ResourceInterceptors {
        self.interceptors.sort();
        self.interceptors
    }
}

// Registrations made for a specific method apply to it regardless of bindings.
fn strip_bindings<T: ?Sized>(mut interceptor: ResourceInterceptor<T>) -> ResourceInterceptor<T> {
    interceptor.name_bindings.clear();
    interceptor.pre_matching = false;
    interceptor
}

/// Decides per resource method which extra interceptors apply.
pub trait DynamicFeature: Send + Sync {
    fn configure(&self, info: &ResourceInfo, ctx: &mut DynamicFeatureContext);
}
