use super::customizer::HandlerChainCustomizer;
use super::types::{names, TypeDescriptor};
use crate::exceptions::ResourceExceptionMapper;
use crate::parameters::{converters, ConverterSupplier, ParameterExtractor};
use crate::spi::{BeanFactory, EndpointInvoker, Instance};
use http::Method;
use mime::Mime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Lifecycle of resource instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceScope {
    /// A new instance for every request.
    #[default]
    PerRequest,
    /// One instance created at deployment and shared.
    Singleton,
}

/// Where a method parameter's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    Path,
    Query,
    Header,
    Cookie,
    Form,
    Body,
    Matrix,
    Context,
    Bean,
    AsyncResponse,
    MultiPartForm,
    MultiPartDataInput,
    Custom,
}

impl ParameterType {
    /// Parameters whose raw value is text that may need conversion.
    #[must_use]
    pub fn is_string_based(self) -> bool {
        matches!(
            self,
            Self::Path | Self::Query | Self::Header | Self::Cookie | Self::Form | Self::Matrix
        )
    }
}

/// One parameter of a resource method.
#[derive(Clone)]
pub struct MethodParameter {
    pub name: String,
    pub parameter_type: ParameterType,
    pub declared_type: TypeDescriptor,
    pub generic_type: TypeDescriptor,
    /// `false` for collection-valued parameters.
    pub single: bool,
    pub obtained_as_collection: bool,
    pub optional: bool,
    /// Skip percent-decoding.
    pub encoded: bool,
    pub default_value: Option<String>,
    pub converter: Option<ConverterSupplier>,
    pub custom_extractor: Option<Arc<dyn ParameterExtractor>>,
    /// Fields of a `Bean`/`MultiPartForm` aggregate.
    pub bean_fields: Vec<MethodParameter>,
    /// Declared media type of a multipart part.
    pub part_type: Option<Mime>,
}

impl MethodParameter {
    /// Describe a parameter. Collection and optional flags and the converter are
    /// derived from `generic_type`.
    pub fn new(name: impl Into<String>, parameter_type: ParameterType, generic_type: TypeDescriptor) -> Self {
        let raw = generic_type.raw_name().unwrap_or(names::OBJECT).to_string();
        let collection = matches!(raw.as_str(), names::LIST | names::SET | names::SORTED_SET);
        let optional = raw == names::OPTIONAL;
        let converter = if parameter_type.is_string_based() {
            converters::supplier_for(&generic_type)
        } else {
            None
        };
        Self {
            name: name.into(),
            parameter_type,
            declared_type: TypeDescriptor::Class(raw),
            generic_type,
            single: !collection,
            obtained_as_collection: collection,
            optional,
            encoded: false,
            default_value: None,
            converter,
            custom_extractor: None,
            bean_fields: Vec::new(),
            part_type: None,
        }
    }

    pub fn path(name: &str, ty: TypeDescriptor) -> Self {
        Self::new(name, ParameterType::Path, ty)
    }

    pub fn query(name: &str, ty: TypeDescriptor) -> Self {
        Self::new(name, ParameterType::Query, ty)
    }

    pub fn header(name: &str, ty: TypeDescriptor) -> Self {
        Self::new(name, ParameterType::Header, ty)
    }

    pub fn form(name: &str, ty: TypeDescriptor) -> Self {
        Self::new(name, ParameterType::Form, ty)
    }

    pub fn body(ty: TypeDescriptor) -> Self {
        Self::new("body", ParameterType::Body, ty)
    }

    pub fn context(ty: TypeDescriptor) -> Self {
        let name = ty.to_string();
        Self::new(name, ParameterType::Context, ty)
    }

    #[must_use]
    pub fn with_default(mut self, value: &str) -> Self {
        self.default_value = Some(value.to_string());
        self
    }

    #[must_use]
    pub fn encoded(mut self) -> Self {
        self.encoded = true;
        self
    }

    #[must_use]
    pub fn with_converter(mut self, converter: ConverterSupplier) -> Self {
        self.converter = Some(converter);
        self
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn ParameterExtractor>) -> Self {
        self.custom_extractor = Some(extractor);
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: Vec<MethodParameter>) -> Self {
        self.bean_fields = fields;
        self
    }

    #[must_use]
    pub fn with_part_type(mut self, media_type: Mime) -> Self {
        self.part_type = Some(media_type);
        self
    }

    fn any(&self, pred: &dyn Fn(&MethodParameter) -> bool) -> bool {
        pred(self) || self.bean_fields.iter().any(|f| f.any(pred))
    }
}

impl fmt::Debug for MethodParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodParameter")
            .field("name", &self.name)
            .field("parameter_type", &self.parameter_type)
            .field("generic_type", &self.generic_type.to_string())
            .field("single", &self.single)
            .field("optional", &self.optional)
            .finish_non_exhaustive()
    }
}

/// A resource method: an endpoint (`http_method` set) or a sub-resource locator.
#[derive(Clone)]
pub struct ServerResourceMethod {
    pub name: String,
    pub http_method: Option<Method>,
    pub path: Option<String>,
    pub produces: Vec<Mime>,
    pub consumes: Vec<Mime>,
    pub parameters: Vec<MethodParameter>,
    pub return_type: TypeDescriptor,
    pub blocking: bool,
    pub run_on_virtual_thread: bool,
    pub sse: bool,
    pub sse_element_type: Option<String>,
    pub form_param_required: bool,
    pub multipart: bool,
    pub name_bindings: BTreeSet<String>,
    pub invoker: Arc<dyn EndpointInvoker>,
    pub customizers: Vec<Arc<dyn HandlerChainCustomizer>>,
}

impl ServerResourceMethod {
    pub fn new(
        name: impl Into<String>,
        http_method: Option<Method>,
        path: Option<&str>,
        invoker: Arc<dyn EndpointInvoker>,
    ) -> Self {
        Self {
            name: name.into(),
            http_method,
            path: path.map(str::to_string),
            produces: Vec::new(),
            consumes: Vec::new(),
            parameters: Vec::new(),
            return_type: TypeDescriptor::class(names::OBJECT),
            blocking: false,
            run_on_virtual_thread: false,
            sse: false,
            sse_element_type: None,
            form_param_required: false,
            multipart: false,
            name_bindings: BTreeSet::new(),
            invoker,
            customizers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_parameter(mut self, parameter: MethodParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    #[must_use]
    pub fn with_produces(mut self, produces: Vec<Mime>) -> Self {
        self.produces = produces;
        self
    }

    #[must_use]
    pub fn with_consumes(mut self, consumes: Vec<Mime>) -> Self {
        self.consumes = consumes;
        self
    }

    #[must_use]
    pub fn with_return_type(mut self, return_type: TypeDescriptor) -> Self {
        self.return_type = return_type;
        self
    }

    #[must_use]
    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    #[must_use]
    pub fn on_virtual_thread(mut self) -> Self {
        self.run_on_virtual_thread = true;
        self
    }

    #[must_use]
    pub fn server_sent_events(mut self, element_type: Option<&str>) -> Self {
        self.sse = true;
        self.sse_element_type = element_type.map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_name_binding(mut self, binding: &str) -> Self {
        self.name_bindings.insert(binding.to_string());
        self
    }

    #[must_use]
    pub fn with_customizer(mut self, customizer: Arc<dyn HandlerChainCustomizer>) -> Self {
        self.customizers.push(customizer);
        self
    }

    #[must_use]
    pub fn is_locator(&self) -> bool {
        self.http_method.is_none()
    }

    /// Form parameters anywhere in the signature, including bean fields.
    #[must_use]
    pub fn is_form_param_required(&self) -> bool {
        self.form_param_required
            || self
                .parameters
                .iter()
                .any(|p| p.any(&|p| p.parameter_type == ParameterType::Form))
    }

    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.multipart
            || self.parameters.iter().any(|p| {
                p.any(&|p| {
                    matches!(
                        p.parameter_type,
                        ParameterType::MultiPartForm | ParameterType::MultiPartDataInput
                    )
                })
            })
    }

    /// `Class#method`, used in logs and errors.
    #[must_use]
    pub fn qualified_name(&self, class_name: &str) -> String {
        format!("{class_name}#{}", self.name)
    }
}

impl fmt::Debug for ServerResourceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerResourceMethod")
            .field("name", &self.name)
            .field("http_method", &self.http_method)
            .field("path", &self.path)
            .field("blocking", &self.blocking)
            .finish_non_exhaustive()
    }
}

/// A class-level exception mapper: invoked with the resource instance.
#[derive(Clone)]
pub struct ClassExceptionMapper {
    /// [`crate::error::HandlerError::kind`] handled by this mapper.
    pub kind: String,
    pub mapper: Arc<dyn ResourceExceptionMapper>,
}

/// A resource class and its methods.
#[derive(Clone)]
pub struct ResourceClass {
    pub class_name: String,
    /// `None` for root-level resources and sub-resources.
    pub path: Option<String>,
    pub scope: InstanceScope,
    pub factory: Arc<dyn BeanFactory<Instance>>,
    pub methods: Vec<ServerResourceMethod>,
    pub exception_mappers: Vec<ClassExceptionMapper>,
    /// Bindings applied to every method of the class.
    pub name_bindings: BTreeSet<String>,
}

impl ResourceClass {
    pub fn new(
        class_name: impl Into<String>,
        path: Option<&str>,
        factory: Arc<dyn BeanFactory<Instance>>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            path: path.map(str::to_string),
            scope: InstanceScope::PerRequest,
            factory,
            methods: Vec::new(),
            exception_mappers: Vec::new(),
            name_bindings: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn singleton(mut self) -> Self {
        self.scope = InstanceScope::Singleton;
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: ServerResourceMethod) -> Self {
        self.methods.push(method);
        self
    }

    #[must_use]
    pub fn with_exception_mapper(mut self, kind: &str, mapper: Arc<dyn ResourceExceptionMapper>) -> Self {
        self.exception_mappers.push(ClassExceptionMapper {
            kind: kind.to_string(),
            mapper,
        });
        self
    }

    #[must_use]
    pub fn with_name_binding(mut self, binding: &str) -> Self {
        self.name_bindings.insert(binding.to_string());
        self
    }

    /// Class bindings plus the method's own.
    #[must_use]
    pub fn bindings_for(&self, method: &ServerResourceMethod) -> BTreeSet<String> {
        self.name_bindings
            .union(&method.name_bindings)
            .cloned()
            .collect()
    }
}

impl fmt::Debug for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceClass")
            .field("class_name", &self.class_name)
            .field("path", &self.path)
            .field("scope", &self.scope)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}
