use crate::exceptions::{ExceptionMapper, ExceptionMapping};
use crate::model::{DynamicFeature, Feature, HandlerChainCustomizer, ResourceClass, ResourceInterceptors};
use crate::parameters::{ContextProducer, ContextResolvers, ParamConverterProvider, ParamConverterProviders};
use crate::runtime_config::RuntimeConfig;
use crate::serialisers::ServerSerialisers;
use std::sync::Arc;

/// Everything a deployment is built from.
///
/// Mutable only until it is handed to
/// [`RuntimeDeploymentManager::deploy`](super::RuntimeDeploymentManager::deploy).
pub struct DeploymentInfo {
    pub(crate) resource_classes: Vec<ResourceClass>,
    pub(crate) locatable_resource_classes: Vec<ResourceClass>,
    pub(crate) interceptors: ResourceInterceptors,
    pub(crate) features: Vec<Arc<dyn Feature>>,
    pub(crate) dynamic_features: Vec<Arc<dyn DynamicFeature>>,
    pub(crate) exception_mapping: ExceptionMapping,
    pub(crate) serialisers: ServerSerialisers,
    pub(crate) param_converter_providers: ParamConverterProviders,
    pub(crate) context_resolvers: ContextResolvers,
    pub(crate) global_customizers: Vec<Arc<dyn HandlerChainCustomizer>>,
    pub(crate) config: RuntimeConfig,
}

impl Default for DeploymentInfo {
    fn default() -> Self {
        Self {
            resource_classes: Vec::new(),
            locatable_resource_classes: Vec::new(),
            interceptors: ResourceInterceptors::default(),
            features: Vec::new(),
            dynamic_features: Vec::new(),
            exception_mapping: ExceptionMapping::default(),
            serialisers: ServerSerialisers::with_builtins(),
            param_converter_providers: ParamConverterProviders::default(),
            context_resolvers: ContextResolvers::with_builtins(),
            global_customizers: Vec::new(),
            config: RuntimeConfig::default(),
        }
    }
}

impl DeploymentInfo {
    /// Built-in serialisers and context types, default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_resource_class(mut self, class: ResourceClass) -> Self {
        self.resource_classes.push(class);
        self
    }

    /// A class reachable only through sub-resource locators.
    #[must_use]
    pub fn with_locatable_resource_class(mut self, class: ResourceClass) -> Self {
        self.locatable_resource_classes.push(class);
        self
    }

    /// Filters and interceptors registered up front.
    pub fn interceptors_mut(&mut self) -> &mut ResourceInterceptors {
        &mut self.interceptors
    }

    #[must_use]
    pub fn with_interceptors(mut self, interceptors: ResourceInterceptors) -> Self {
        self.interceptors = interceptors;
        self
    }

    #[must_use]
    pub fn with_feature(mut self, feature: Arc<dyn Feature>) -> Self {
        self.features.push(feature);
        self
    }

    #[must_use]
    pub fn with_dynamic_feature(mut self, feature: Arc<dyn DynamicFeature>) -> Self {
        self.dynamic_features.push(feature);
        self
    }

    #[must_use]
    pub fn with_exception_mapper(mut self, kind: &str, priority: i32, mapper: Arc<dyn ExceptionMapper>) -> Self {
        self.exception_mapping.add(kind, priority, mapper);
        self
    }

    #[must_use]
    pub fn with_serialisers(mut self, serialisers: ServerSerialisers) -> Self {
        self.serialisers = serialisers;
        self
    }

    pub fn serialisers_mut(&mut self) -> &mut ServerSerialisers {
        &mut self.serialisers
    }

    #[must_use]
    pub fn with_param_converter_provider(mut self, priority: i32, provider: Arc<dyn ParamConverterProvider>) -> Self {
        self.param_converter_providers.add(priority, provider);
        self
    }

    #[must_use]
    pub fn with_context_producer(mut self, type_name: &str, producer: Arc<dyn ContextProducer>) -> Self {
        self.context_resolvers.register(type_name, producer);
        self
    }

    /// A customizer consulted for every method, before the method's own.
    #[must_use]
    pub fn with_handler_customizer(mut self, customizer: Arc<dyn HandlerChainCustomizer>) -> Self {
        self.global_customizers.push(customizer);
        self
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn resource_classes(&self) -> &[ResourceClass] {
        &self.resource_classes
    }

    #[must_use]
    pub fn locatable_resource_classes(&self) -> &[ResourceClass] {
        &self.locatable_resource_classes
    }
}
