//! Top-level deployment build and the resulting request entry point.

use super::info::DeploymentInfo;
use super::interceptors::RuntimeInterceptorDeployment;
use super::mapping::RuntimeMappingDeployment;
use super::resource::RuntimeResourceDeployment;
use super::{InitialMatch, LocatorRegistry, RuntimeResource};
use crate::context::{RequestContext, ServerRequest, ServerResponse};
use crate::error::DeploymentError;
use crate::exceptions::ExceptionMapping;
use crate::executor;
use crate::handlers::{
    ClassRoutingHandler, ExceptionHandler, InitialHandler, ResourceLocatorHandler, ResponseHandler,
    ResponseWriterHandler,
};
use crate::mapping::RequestMapper;
use crate::model::{Configuration, FeatureContext, ResourceClass};
use crate::parameters::{ContextResolvers, ParamConverterProviders};
use crate::serialisers::ServerSerialisers;
use crate::spi::{HandlerChain, ServerRestHandler};
use crate::template::URITemplate;
use crate::worker_pool::{WorkerPool, WorkerPoolMetrics};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Builds [`Deployment`]s.
pub struct RuntimeDeploymentManager;

impl RuntimeDeploymentManager {
    /// Build every handler chain and routing table described by `info`.
    ///
    /// Any configuration problem fails the whole build.
    pub fn deploy(info: DeploymentInfo) -> Result<Deployment, DeploymentError> {
        let started = Instant::now();
        let DeploymentInfo {
            resource_classes,
            locatable_resource_classes,
            mut interceptors,
            features,
            dynamic_features,
            mut exception_mapping,
            serialisers,
            param_converter_providers,
            context_resolvers,
            global_customizers,
            config,
        } = info;

        let mut configuration = Configuration::default();
        let mut filters_registered = false;
        for feature in &features {
            let mut ctx = FeatureContext::new(&mut interceptors, &mut exception_mapping, &mut configuration.properties);
            let enabled = feature.configure(&mut ctx);
            filters_registered |= ctx.filters_registered();
            if enabled {
                configuration.enabled_features.push(feature.name().to_string());
            }
        }
        if filters_registered {
            interceptors.sort();
        }

        let interceptor_deployment = RuntimeInterceptorDeployment::new(&interceptors, dynamic_features);
        let serialisers = Arc::new(serialisers);
        let exception_mapping = Arc::new(exception_mapping);
        let context_resolvers = Arc::new(context_resolvers);
        let locators: Arc<OnceCell<LocatorRegistry>> = Arc::new(OnceCell::new());
        let builder = RuntimeResourceDeployment::new(
            &interceptor_deployment,
            Arc::clone(&serialisers),
            Arc::clone(&exception_mapping),
            &param_converter_providers,
            Arc::clone(&context_resolvers),
            &global_customizers,
            &config,
            Arc::new(ResourceLocatorHandler::new(Arc::clone(&locators))),
        );

        // Every class can be returned by a locator, not only the locatable ones.
        let mut locator_registry = LocatorRegistry::new();
        for class in locatable_resource_classes.iter().chain(&resource_classes) {
            let built = class
                .methods
                .iter()
                .map(|m| builder.build_resource_method(class, m, true, None).map(Arc::new))
                .collect::<Result<Vec<_>, _>>()?;
            let mapper = RuntimeMappingDeployment::build_class_mapper(RuntimeMappingDeployment::build_method_mapper(
                &built,
            )?);
            locator_registry.insert(class.class_name.clone(), mapper);
        }

        let mut by_class_template: Vec<(URITemplate, Vec<&ResourceClass>)> = Vec::new();
        for class in &resource_classes {
            let template = URITemplate::new(class.path.as_deref().unwrap_or("/"), true)?;
            match by_class_template.iter_mut().find(|(t, _)| *t == template) {
                Some((_, classes)) => classes.push(class),
                None => by_class_template.push((template, vec![class])),
            }
        }

        let mut resources: Vec<Arc<RuntimeResource>> = Vec::new();
        let mut class_entries = Vec::with_capacity(by_class_template.len());
        for (template, classes) in by_class_template {
            let mut built = Vec::new();
            for class in classes {
                let class_path = class.path.as_ref().map(|_| &template);
                for method in &class.methods {
                    built.push(Arc::new(builder.build_resource_method(class, method, false, class_path)?));
                }
            }
            let mapper = RuntimeMappingDeployment::build_class_mapper(RuntimeMappingDeployment::build_method_mapper(
                &built,
            )?);
            let class_params = template.count_path_param_names();
            let max_params = class_params + mapper.values().map(RequestMapper::max_params).max().unwrap_or(0);
            debug!(
                template = %template.template(),
                methods = built.len(),
                max_params,
                "Class template routed"
            );
            let routing: Arc<dyn ServerRestHandler> = Arc::new(ClassRoutingHandler::new(mapper, class_params));
            class_entries.push((
                template,
                InitialMatch {
                    handlers: Arc::from(vec![routing]),
                    max_params,
                },
            ));
            resources.extend(built);
        }
        if locators.set(locator_registry).is_err() {
            warn!("Locator registry was already filled");
        }

        let prefix = deployment_prefix(config.root_path.as_deref(), config.application_path.as_deref());

        let mut abort: Vec<Arc<dyn ServerRestHandler>> = Vec::new();
        if let Some(h) = interceptor_deployment.global_interceptor_handler() {
            abort.push(Arc::clone(h) as Arc<dyn ServerRestHandler>);
        }
        abort.push(Arc::new(ExceptionHandler::new(Arc::clone(&exception_mapping))));
        abort.extend(interceptor_deployment.global_response_filter_handlers().iter().map(Arc::clone));
        abort.push(Arc::new(ResponseHandler));
        abort.push(Arc::new(ResponseWriterHandler::new(Arc::clone(&serialisers))));
        let abort_chain: HandlerChain = Arc::from(abort);

        let pre_match_handlers = interceptor_deployment.pre_match_handlers();
        let initial = Arc::new(InitialHandler::new(prefix.clone(), RequestMapper::new(class_entries)));
        let mut chain = pre_match_handlers.clone();
        chain.push(Arc::clone(&initial) as Arc<dyn ServerRestHandler>);

        let worker_pool = builder.worker_pool().map(Arc::clone);
        info!(
            prefix = %prefix,
            class_templates = initial.mapper().len(),
            resources = resources.len(),
            locatable_classes = locators.get().map_or(0, |r| r.len()),
            pre_match_filters = pre_match_handlers.len(),
            features = ?configuration.enabled_features,
            blocking_pool = worker_pool.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Deployment built"
        );

        Ok(Deployment {
            prefix,
            configuration,
            exception_mapping,
            context_resolvers,
            serialisers,
            param_converter_providers,
            abort_chain,
            pre_match_handlers,
            initial,
            initial_chain: Arc::from(chain),
            resources,
            worker_pool,
        })
    }
}

/// `trim`, one leading slash, no trailing slash, and `/` alone becomes empty.
fn sanitize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Root path followed by the application path.
#[must_use]
pub fn deployment_prefix(root_path: Option<&str>, application_path: Option<&str>) -> String {
    let mut prefix = root_path.map(sanitize_path).unwrap_or_default();
    if let Some(app) = application_path {
        prefix.push_str(&sanitize_path(app));
    }
    prefix
}

/// An immutable, fully built deployment shared by every request.
pub struct Deployment {
    prefix: String,
    configuration: Configuration,
    exception_mapping: Arc<ExceptionMapping>,
    context_resolvers: Arc<ContextResolvers>,
    serialisers: Arc<ServerSerialisers>,
    param_converter_providers: ParamConverterProviders,
    abort_chain: HandlerChain,
    pre_match_handlers: Vec<Arc<dyn ServerRestHandler>>,
    initial: Arc<InitialHandler>,
    initial_chain: HandlerChain,
    resources: Vec<Arc<RuntimeResource>>,
    worker_pool: Option<Arc<WorkerPool>>,
}

impl Deployment {
    /// Route and execute one request.
    pub fn handle(&self, request: ServerRequest) -> ServerResponse {
        let mut ctx = RequestContext::new(request, Arc::clone(&self.abort_chain));
        ctx.restart_chain(Arc::clone(&self.initial_chain));
        executor::execute(ctx)
    }

    #[inline]
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    #[must_use]
    pub fn exception_mapping(&self) -> &ExceptionMapping {
        &self.exception_mapping
    }

    #[must_use]
    pub fn context_resolvers(&self) -> &ContextResolvers {
        &self.context_resolvers
    }

    #[must_use]
    pub fn serialisers(&self) -> &ServerSerialisers {
        &self.serialisers
    }

    #[must_use]
    pub fn param_converter_providers(&self) -> &ParamConverterProviders {
        &self.param_converter_providers
    }

    /// Chain run for failures before a resource was matched.
    #[must_use]
    pub fn abort_chain(&self) -> &HandlerChain {
        &self.abort_chain
    }

    #[must_use]
    pub fn pre_match_handlers(&self) -> &[Arc<dyn ServerRestHandler>] {
        &self.pre_match_handlers
    }

    /// Class templates in routing order.
    #[must_use]
    pub fn class_mapper(&self) -> &RequestMapper<InitialMatch> {
        self.initial.mapper()
    }

    /// Every routable resource, in build order.
    #[must_use]
    pub fn resources(&self) -> &[Arc<RuntimeResource>] {
        &self.resources
    }

    /// Metrics of the blocking pool, when any method is blocking.
    #[must_use]
    pub fn worker_pool_metrics(&self) -> Option<&WorkerPoolMetrics> {
        self.worker_pool.as_deref().map(|pool| &**pool.metrics())
    }
}
