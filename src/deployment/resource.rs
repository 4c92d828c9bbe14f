//! Builds the handler chain and abort chain of one resource method.

use super::interceptors::RuntimeInterceptorDeployment;
use super::score::{Category, Diagnostic, Score};
use super::RuntimeResource;
use crate::error::DeploymentError;
use crate::exceptions::ExceptionMapping;
use crate::handlers::{
    AbortChainHandler, BlockingHandler, ExceptionHandler, FixedProducesHandler, FormBodyHandler, InputHandler,
    InstanceHandler, InvocationHandler, NonBlockingHandler, ParameterHandler, PerRequestInstanceHandler,
    RequestDeserializeHandler, ResourceLocatorHandler, ResponseHandler, ResponseWriterHandler,
    SseResponseWriterHandler, VariableProducesHandler, VirtualThreadHandler,
};
use crate::media::{self, ServerMediaType};
use crate::model::types::names;
use crate::model::{
    HandlerChainCustomizer, InstanceScope, MethodParameter, ParameterType, Phase, ResourceClass, ResourceInfo,
    ServerResourceMethod, TypeDescriptor,
};
use crate::parameters::{
    AsyncResponseExtractor, BeanField, BodyParamExtractor, ContextParamExtractor, ContextResolvers,
    CookieParamExtractor, FormParamExtractor, FormValueKind, HeaderParamExtractor, InjectParamExtractor,
    LocatableResourcePathParamExtractor, MatrixParamExtractor, MultipartDataInputExtractor, NullParamExtractor,
    ParamConverterProviders, ParameterConverter, ParameterExtractor, PathParamExtractor, QueryParamExtractor,
    RuntimeResolvedConverter,
};
use crate::runtime_config::RuntimeConfig;
use crate::serialisers::{DynamicEntityWriter, EntityWriter, FixedEntityWriter, FixedEntityWriterArray, ServerSerialisers};
use crate::spi::{HandlerChain, ServerRestHandler};
use crate::template::URITemplate;
use crate::worker_pool::{VirtualExecutor, WorkerPool};
use once_cell::unsync::OnceCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Form field types delivered as uploaded file metadata.
const FILE_TYPES: &[&str] = &["File", "Path", "InputStream", "FileUpload"];

/// Turns resource methods into [`RuntimeResource`]s.
///
/// Shares one set of collaborators across every method of a deployment. The
/// blocking worker pool is created the first time a blocking method is built.
pub struct RuntimeResourceDeployment<'a> {
    interceptors: &'a RuntimeInterceptorDeployment,
    serialisers: Arc<ServerSerialisers>,
    exception_mapping: Arc<ExceptionMapping>,
    converter_providers: &'a ParamConverterProviders,
    context_resolvers: Arc<ContextResolvers>,
    global_customizers: &'a [Arc<dyn HandlerChainCustomizer>],
    config: &'a RuntimeConfig,
    locator_handler: Arc<dyn ServerRestHandler>,
    worker_pool: OnceCell<Arc<WorkerPool>>,
    virtual_executor: VirtualExecutor,
}

impl<'a> RuntimeResourceDeployment<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        interceptors: &'a RuntimeInterceptorDeployment,
        serialisers: Arc<ServerSerialisers>,
        exception_mapping: Arc<ExceptionMapping>,
        converter_providers: &'a ParamConverterProviders,
        context_resolvers: Arc<ContextResolvers>,
        global_customizers: &'a [Arc<dyn HandlerChainCustomizer>],
        config: &'a RuntimeConfig,
        locator_handler: Arc<ResourceLocatorHandler>,
    ) -> Self {
        Self {
            interceptors,
            serialisers,
            exception_mapping,
            converter_providers,
            context_resolvers,
            global_customizers,
            config,
            locator_handler,
            worker_pool: OnceCell::new(),
            virtual_executor: VirtualExecutor::new(config.stack_size),
        }
    }

    /// The blocking pool, if any blocking method has been built.
    #[must_use]
    pub fn worker_pool(&self) -> Option<&Arc<WorkerPool>> {
        self.worker_pool.get()
    }

    fn blocking_handler(&self) -> Arc<dyn ServerRestHandler> {
        let pool = self.worker_pool.get_or_init(|| {
            // SAFETY: pool workers only run chain segments, which own their
            // context and use no thread-local state across yields.
            Arc::new(unsafe { WorkerPool::new("blocking", self.config.worker_pool_config()) })
        });
        Arc::new(BlockingHandler::new(Arc::clone(pool)))
    }

    fn customizers<'m>(&'m self, method: &'m ServerResourceMethod) -> impl Iterator<Item = &'m Arc<dyn HandlerChainCustomizer>> {
        self.global_customizers.iter().chain(&method.customizers)
    }

    fn add_customized(
        &self,
        handlers: &mut Vec<Arc<dyn ServerRestHandler>>,
        phase: Phase,
        class: &ResourceClass,
        method: &ServerResourceMethod,
    ) {
        for customizer in self.customizers(method) {
            handlers.extend(customizer.handlers(phase, class, method));
        }
    }

    /// Build the chains of `method`.
    ///
    /// `locatable` resources are reached through a locator, which has already
    /// resolved the instance; they get no instance step. `class_path` is `None`
    /// for root and locatable resources.
    pub fn build_resource_method(
        &self,
        class: &ResourceClass,
        method: &ServerResourceMethod,
        locatable: bool,
        class_path: Option<&URITemplate>,
    ) -> Result<RuntimeResource, DeploymentError> {
        let qualified = method.qualified_name(&class.class_name);
        let method_path = method
            .path
            .as_deref()
            .map(|p| URITemplate::new(p, method.is_locator()))
            .transpose()?;

        let mut path_parameter_indexes = BTreeMap::new();
        let names = class_path
            .into_iter()
            .flat_map(URITemplate::param_names)
            .chain(method_path.iter().flat_map(URITemplate::param_names));
        for (index, name) in names.enumerate() {
            path_parameter_indexes.insert(name.to_string(), index);
        }

        let body_params = method
            .parameters
            .iter()
            .filter(|p| p.parameter_type == ParameterType::Body)
            .count();
        if body_params > 1 {
            return Err(DeploymentError::MultipleBodyParameters { method: qualified });
        }
        let body_param = method
            .parameters
            .iter()
            .find(|p| p.parameter_type == ParameterType::Body);

        let info = ResourceInfo {
            class_name: class.class_name.clone(),
            method_name: method.name.clone(),
            http_method: method.http_method.clone(),
            path: method.path.clone(),
            name_bindings: class.bindings_for(method),
        };
        let interceptors = self.interceptors.for_method(&info);

        let returns_async_file = method.return_type.effective_return_type().is_raw(names::ASYNC_FILE);
        if returns_async_file && interceptors.has_writer_interceptors() {
            return Err(DeploymentError::AsyncFileWithWriterInterceptors { method: qualified });
        }

        let mut score = Score::default();
        let mut handlers: Vec<Arc<dyn ServerRestHandler>> = Vec::new();

        self.add_customized(&mut handlers, Phase::AfterMatch, class, method);

        let interceptor_handler = interceptors
            .setup_interceptor_handler()
            .map(|h| h as Arc<dyn ServerRestHandler>);
        if let Some(h) = &interceptor_handler {
            handlers.push(Arc::clone(h));
        }

        let mut blocking_index = None;
        let mut dispatched = false;
        if !self.config.default_blocking {
            if method.run_on_virtual_thread {
                if method.blocking {
                    error!(
                        method = %qualified,
                        "Method is marked both blocking and virtual-thread; running it on a virtual thread"
                    );
                }
                blocking_index = Some(handlers.len());
                handlers.push(Arc::new(VirtualThreadHandler::new(self.virtual_executor)));
                score.add(Category::Execution, Diagnostic::ExecutionVirtualThread);
                dispatched = true;
            } else if method.blocking {
                blocking_index = Some(handlers.len());
                handlers.push(self.blocking_handler());
                score.add(Category::Execution, Diagnostic::ExecutionBlocking);
                dispatched = true;
            } else {
                handlers.push(Arc::new(NonBlockingHandler));
                score.add(Category::Execution, Diagnostic::ExecutionNonBlocking);
            }
        }

        let reads_form = method.is_form_param_required() || method.is_multipart();
        if reads_form {
            handlers.push(Arc::new(FormBodyHandler));
        }

        if !method.is_locator() {
            let mut in_order = Vec::new();
            let mut needs_body = Vec::new();
            let mut insert_at = blocking_index;
            for filter in interceptors.setup_request_filter_handler() {
                match insert_at {
                    Some(at) if filter.is_non_blocking_required() => {
                        handlers.insert(at, filter as Arc<dyn ServerRestHandler>);
                        insert_at = Some(at + 1);
                    }
                    _ if filter.is_read_body() => needs_body.push(filter),
                    _ => in_order.push(filter),
                }
            }
            handlers.extend(in_order.into_iter().map(|f| f as Arc<dyn ServerRestHandler>));
            if !needs_body.is_empty() {
                if !reads_form {
                    handlers.push(Arc::new(FormBodyHandler));
                }
                handlers.extend(needs_body.into_iter().map(|f| f as Arc<dyn ServerRestHandler>));
            }
        }

        if let Some(body) = body_param {
            // Form methods have already read the body.
            if !reads_form && !self.config.default_blocking && !dispatched {
                handlers.push(Arc::new(InputHandler::new(self.config.input_buffer_size)));
                handlers.push(Arc::new(NonBlockingHandler));
            }
            handlers.push(Arc::new(RequestDeserializeHandler::new(
                body.generic_type.clone(),
                method.consumes.clone(),
                Arc::clone(&self.serialisers),
            )));
        }

        self.add_customized(&mut handlers, Phase::ResolveMethodParameters, class, method);

        let instance_handler: Option<Arc<dyn ServerRestHandler>> = if locatable {
            None
        } else {
            Some(match class.scope {
                InstanceScope::Singleton => {
                    score.add(Category::Resource, Diagnostic::ResourceSingleton);
                    Arc::new(InstanceHandler::new(class.factory.create_instance()))
                }
                InstanceScope::PerRequest => {
                    score.add(Category::Resource, Diagnostic::ResourcePerRequest);
                    Arc::new(PerRequestInstanceHandler::new(Arc::clone(&class.factory)))
                }
            })
        };
        if let Some(h) = &instance_handler {
            handlers.push(Arc::clone(h));
        }

        for (index, param) in method.parameters.iter().enumerate() {
            let extractor = self.extractor(param, &qualified, &path_parameter_indexes, locatable)?;
            let converter = self.converter(param, &qualified)?;
            handlers.push(Arc::new(ParameterHandler::new(
                index,
                param.name.clone(),
                param.parameter_type,
                param.default_value.clone(),
                param.single,
                extractor,
                converter,
            )));
        }

        self.add_customized(&mut handlers, Phase::BeforeMethodInvoke, class, method);

        let invocation = self
            .customizers(method)
            .find_map(|c| c.alternate_invocation_handler(&method.invoker))
            .unwrap_or_else(|| Arc::new(InvocationHandler::new(Arc::clone(&method.invoker))));
        handlers.push(invocation);

        self.add_customized(&mut handlers, Phase::AfterMethodInvoke, class, method);
        self.add_customized(&mut handlers, Phase::AfterMethodInvokeSecondRound, class, method);

        if method.is_locator() {
            handlers.push(Arc::clone(&self.locator_handler));
        } else if !method.sse {
            if let Some(h) = self.produces_handler(method, &qualified, &mut score) {
                handlers.push(h);
            }
        }

        let response_filters = interceptors.setup_response_filter_handler();
        let writer: Arc<dyn ServerRestHandler> = Arc::new(ResponseWriterHandler::new(Arc::clone(&self.serialisers)));
        if method.sse {
            handlers.push(Arc::new(SseResponseWriterHandler));
        } else {
            handlers.push(Arc::new(ResponseHandler));
            self.add_customized(&mut handlers, Phase::AfterResponseCreated, class, method);
            handlers.extend(response_filters.iter().map(Arc::clone));
            handlers.push(Arc::clone(&writer));
        }

        let mut abort: Vec<Arc<dyn ServerRestHandler>> = Vec::new();
        if !class.exception_mappers.is_empty() {
            if let Some(h) = &instance_handler {
                abort.push(Arc::clone(h));
            }
        }
        if let Some(h) = &interceptor_handler {
            abort.push(Arc::clone(h));
        }
        abort.push(Arc::new(ExceptionHandler::new(Arc::clone(&self.exception_mapping))));
        abort.push(Arc::new(ResponseHandler));
        abort.extend(response_filters.iter().map(Arc::clone));
        abort.push(writer);
        let abort_chain: HandlerChain = Arc::from(abort);

        handlers.insert(0, Arc::new(AbortChainHandler::new(Arc::clone(&abort_chain))));

        debug!(
            class_name = %class.class_name,
            method_name = %method.name,
            http_method = ?method.http_method,
            path = ?method.path,
            handlers = handlers.len(),
            abort_handlers = abort_chain.len(),
            score = score.total(),
            "Resource method built"
        );

        Ok(RuntimeResource {
            http_method: method.http_method.clone(),
            path: method_path,
            class_path: class_path.cloned(),
            produces: ServerMediaType::new(&method.produces),
            consumes: method.consumes.clone(),
            invoker: Arc::clone(&method.invoker),
            factory: Arc::clone(&class.factory),
            handler_chain: Arc::from(handlers),
            abort_chain,
            method_name: method.name.clone(),
            parameter_types: method.parameters.iter().map(|p| p.declared_type.clone()).collect(),
            return_type: method.return_type.clone(),
            blocking: method.blocking,
            class_name: class.class_name.clone(),
            resource_info: info,
            path_parameter_indexes,
            score,
            sse_element_type: method.sse_element_type.clone(),
            class_exception_mappers: class.exception_mappers.clone(),
        })
    }

    /// The step fixing the response media type and writer, if one is needed.
    fn produces_handler(
        &self,
        method: &ServerResourceMethod,
        qualified: &str,
        score: &mut Score,
    ) -> Option<Arc<dyn ServerRestHandler>> {
        let return_type = method.return_type.effective_return_type();
        if return_type.is_raw(names::RESPONSE) {
            score.add(Category::Writer, Diagnostic::WriterRunTime);
            return None;
        }
        let variable = || {
            Arc::new(VariableProducesHandler::new(
                ServerMediaType::new(&method.produces),
                Arc::clone(&self.serialisers),
            )) as Arc<dyn ServerRestHandler>
        };
        match method.produces.as_slice() {
            [] => {
                score.add(Category::Writer, Diagnostic::WriterRunTime);
                None
            }
            [single] if media::is_wildcard(single) => {
                score.add(Category::Writer, Diagnostic::WriterRunTime);
                Some(variable())
            }
            [_] if return_type.is_void() => {
                score.add(Category::Writer, Diagnostic::WriterNotRequired);
                None
            }
            [single] => match self.serialisers.find_build_time_writers(return_type, &method.produces) {
                None => {
                    score.add(Category::Writer, Diagnostic::WriterRunTime);
                    let writer: Arc<dyn EntityWriter> = Arc::new(DynamicEntityWriter::new(Arc::clone(&self.serialisers)));
                    Some(Arc::new(FixedProducesHandler::new(single.clone(), writer)))
                }
                Some(writers) if writers.is_empty() => {
                    warn!(
                        method = %qualified,
                        return_type = %return_type,
                        media_type = %single,
                        "No writer found at build time; the writer is chosen per request"
                    );
                    score.add(Category::Writer, Diagnostic::WriterRunTime);
                    Some(variable())
                }
                Some(writers) if writers.len() == 1 || writers[0].is_all_writeable() => {
                    let first = Arc::clone(&writers[0]);
                    let name = first.name().to_string();
                    score.add(
                        Category::Writer,
                        if first.is_all_writeable() {
                            Diagnostic::WriterBuildTimeDirect(name)
                        } else {
                            Diagnostic::WriterBuildTime(name)
                        },
                    );
                    let writer: Arc<dyn EntityWriter> = Arc::new(FixedEntityWriter::new(first, single.clone()));
                    Some(Arc::new(FixedProducesHandler::new(single.clone(), writer)))
                }
                Some(writers) => {
                    let names = writers.iter().map(|w| w.name().to_string()).collect();
                    score.add(Category::Writer, Diagnostic::WriterBuildTimeMultiple(names));
                    let writer: Arc<dyn EntityWriter> = Arc::new(FixedEntityWriterArray::new(writers, single.clone()));
                    Some(Arc::new(FixedProducesHandler::new(single.clone(), writer)))
                }
            },
            _ => {
                score.add(Category::Writer, Diagnostic::WriterRunTime);
                Some(variable())
            }
        }
    }

    fn converter(
        &self,
        param: &MethodParameter,
        qualified: &str,
    ) -> Result<Option<Arc<dyn ParameterConverter>>, DeploymentError> {
        let Some(supplier) = &param.converter else {
            return Ok(None);
        };
        let mut converter = supplier();
        if self.converter_providers.is_empty() {
            return Ok(Some(Arc::from(converter)));
        }
        let unresolved = |e: crate::parameters::ElementTypeError| DeploymentError::UnresolvedConverterType {
            method: qualified.to_string(),
            parameter: param.name.clone(),
            generic_type: e.generic_type,
            reason: e.reason,
        };
        converter
            .init(self.converter_providers, &param.declared_type, &param.generic_type)
            .map_err(unresolved)?;
        let mut resolved = RuntimeResolvedConverter::new(converter);
        resolved
            .init(self.converter_providers, &param.declared_type, &param.generic_type)
            .map_err(unresolved)?;
        Ok(Some(Arc::new(resolved)))
    }

    fn extractor(
        &self,
        param: &MethodParameter,
        qualified: &str,
        path_parameter_indexes: &BTreeMap<String, usize>,
        locatable: bool,
    ) -> Result<Arc<dyn ParameterExtractor>, DeploymentError> {
        let name = param.name.clone();
        let single = param.single;
        let encoded = param.encoded;
        Ok(match param.parameter_type {
            ParameterType::Path => match path_parameter_indexes.get(&param.name) {
                Some(&index) => Arc::new(PathParamExtractor { index, encoded, single }),
                None if locatable => Arc::new(LocatableResourcePathParamExtractor { name }),
                None => Arc::new(NullParamExtractor),
            },
            ParameterType::Query => Arc::new(QueryParamExtractor { name, single, encoded }),
            ParameterType::Header => Arc::new(HeaderParamExtractor { name, single }),
            ParameterType::Cookie => Arc::new(CookieParamExtractor { name }),
            ParameterType::Matrix => Arc::new(MatrixParamExtractor { name, single, encoded }),
            ParameterType::Form => Arc::new(FormParamExtractor {
                name,
                single,
                encoded,
                kind: self.form_value_kind(param),
            }),
            ParameterType::Body => Arc::new(BodyParamExtractor),
            ParameterType::Context => Arc::new(ContextParamExtractor {
                type_name: param.generic_type.raw_name().unwrap_or(names::OBJECT).to_string(),
                resolvers: Arc::clone(&self.context_resolvers),
            }),
            ParameterType::Bean | ParameterType::MultiPartForm => {
                let fields = param
                    .bean_fields
                    .iter()
                    .map(|field| {
                        Ok(BeanField {
                            name: field.name.clone(),
                            extractor: self.extractor(field, qualified, path_parameter_indexes, locatable)?,
                            converter: self.converter(field, qualified)?,
                            default_value: field.default_value.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>, DeploymentError>>()?;
                Arc::new(InjectParamExtractor { fields })
            }
            ParameterType::AsyncResponse => Arc::new(AsyncResponseExtractor),
            ParameterType::MultiPartDataInput => Arc::new(MultipartDataInputExtractor),
            ParameterType::Custom => match &param.custom_extractor {
                Some(extractor) => Arc::clone(extractor),
                None => {
                    return Err(DeploymentError::MissingCustomExtractor {
                        method: qualified.to_string(),
                        parameter: param.name.clone(),
                        parameter_type: param.parameter_type,
                    })
                }
            },
        })
    }

    fn form_value_kind(&self, param: &MethodParameter) -> FormValueKind {
        if let Some(media_type) = &param.part_type {
            return FormValueKind::Part {
                media_type: media_type.clone(),
                declared: param.generic_type.clone(),
                serialisers: Arc::clone(&self.serialisers),
            };
        }
        let element: &TypeDescriptor = if param.single {
            &param.generic_type
        } else {
            param.generic_type.type_arguments().first().unwrap_or(&param.generic_type)
        };
        match element.raw_name() {
            Some(names::BYTES) => FormValueKind::Bytes,
            Some(raw) if FILE_TYPES.contains(&raw) => FormValueKind::File,
            _ => FormValueKind::Text,
        }
    }
}
