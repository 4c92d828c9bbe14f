//! YAML deployment manifests.
//!
//! A manifest describes resource classes, their methods and a set of tracing
//! filters without any code. Every method is served by an [`EchoInvoker`], which
//! makes manifests useful for inspecting chains and routing tables:
//!
//! ```yaml
//! config:
//!   root_path: /api
//! resources:
//!   - class: Widgets
//!     path: /widgets
//!     methods:
//!       - name: get
//!         method: GET
//!         path: "{id}"
//!         produces: [application/json]
//!         params:
//!           - { name: id, source: path, type: Long }
//! filters:
//!   - { name: audit, kind: response, priority: 100, bindings: [audited] }
//! ```

use crate::context::{RequestContext, Response};
use crate::deployment::DeploymentInfo;
use crate::echo::EchoInvoker;
use crate::error::{DeploymentError, HandlerError};
use crate::model::{
    InstanceScope, MethodParameter, ParameterType, ResourceClass, ResourceInterceptor, ServerResourceMethod,
    TypeDescriptor, PRIORITY_USER,
};
use crate::runtime_config::RuntimeConfig;
use crate::spi::{ContainerRequestFilter, ContainerResponseFilter, Instance};
use http::Method;
use mime::Mime;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Property listing the request filters that ran, in order.
pub const FILTERS_PROPERTY: &str = "manifest.filters";
/// Response header listing the response filters that ran, in order.
pub const FILTERS_HEADER: &str = "X-Filters";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub config: RuntimeConfig,
    #[serde(default)]
    pub resources: Vec<ClassManifest>,
    /// Classes reachable only through locators.
    #[serde(default)]
    pub locatables: Vec<ClassManifest>,
    #[serde(default)]
    pub filters: Vec<FilterManifest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassManifest {
    pub class: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub scope: InstanceScope,
    #[serde(default)]
    pub bindings: Vec<String>,
    #[serde(default)]
    pub methods: Vec<MethodManifest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodManifest {
    pub name: String,
    /// Omitted for sub-resource locators.
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub produces: Vec<String>,
    #[serde(default)]
    pub consumes: Vec<String>,
    #[serde(default)]
    pub returns: Option<TypeDescriptor>,
    #[serde(default)]
    pub blocking: bool,
    #[serde(default)]
    pub virtual_thread: bool,
    #[serde(default)]
    pub sse: bool,
    #[serde(default)]
    pub bindings: Vec<String>,
    /// Class returned by a locator method.
    #[serde(default)]
    pub locates: Option<String>,
    #[serde(default)]
    pub params: Vec<ParamManifest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamManifest {
    #[serde(default)]
    pub name: Option<String>,
    pub source: ParameterType,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub encoded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Request,
    Response,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterManifest {
    pub name: String,
    pub kind: FilterKind,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub bindings: Vec<String>,
    #[serde(default)]
    pub pre_matching: bool,
    #[serde(default)]
    pub non_blocking: bool,
    #[serde(default)]
    pub read_body: bool,
}

fn default_priority() -> i32 {
    PRIORITY_USER
}

fn manifest_err(msg: impl Into<String>) -> DeploymentError {
    DeploymentError::Manifest(msg.into())
}

fn parse_media_types(types: &[String]) -> Result<Vec<Mime>, DeploymentError> {
    types
        .iter()
        .map(|t| t.parse::<Mime>().map_err(|_| DeploymentError::InvalidMediaType(t.clone())))
        .collect()
}

/// Records its name in [`FILTERS_PROPERTY`].
struct TracingRequestFilter {
    name: String,
}

impl ContainerRequestFilter for TracingRequestFilter {
    fn filter(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        debug!(filter = %self.name, path = %ctx.request().path, "Request filter");
        let mut seen = match ctx.property(FILTERS_PROPERTY) {
            Some(Value::Array(names)) => names.clone(),
            _ => Vec::new(),
        };
        seen.push(Value::String(self.name.clone()));
        ctx.set_property(FILTERS_PROPERTY, Value::Array(seen));
        Ok(())
    }
}

/// Appends its name to [`FILTERS_HEADER`].
struct TracingResponseFilter {
    name: String,
}

impl ContainerResponseFilter for TracingResponseFilter {
    fn filter(&self, ctx: &RequestContext, response: &mut Response) -> Result<(), HandlerError> {
        debug!(filter = %self.name, path = %ctx.request().path, status = response.status, "Response filter");
        let value = match response.header(FILTERS_HEADER) {
            Some(existing) => format!("{existing}, {}", self.name),
            None => self.name.clone(),
        };
        response.set_header(FILTERS_HEADER, &value);
        Ok(())
    }
}

impl Manifest {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DeploymentError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, DeploymentError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| manifest_err(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml_str(&yaml)
    }

    /// Convert to a [`DeploymentInfo`] with built-in serialisers.
    pub fn into_deployment_info(self) -> Result<DeploymentInfo, DeploymentError> {
        let mut info = DeploymentInfo::new().with_config(self.config);
        for class in &self.resources {
            info = info.with_resource_class(class.to_resource_class()?);
        }
        for class in &self.locatables {
            if class.path.is_some() {
                return Err(manifest_err(format!("locatable class {} must not declare a path", class.class)));
            }
            info = info.with_locatable_resource_class(class.to_resource_class()?);
        }
        for filter in &self.filters {
            filter.register(&mut info)?;
        }
        Ok(info)
    }
}

impl ClassManifest {
    fn to_resource_class(&self) -> Result<ResourceClass, DeploymentError> {
        let factory = || Arc::new(()) as Instance;
        let mut class = ResourceClass::new(&self.class, self.path.as_deref(), Arc::new(factory));
        if self.scope == InstanceScope::Singleton {
            class = class.singleton();
        }
        for binding in &self.bindings {
            class = class.with_name_binding(binding);
        }
        for method in &self.methods {
            class = class.with_method(method.to_resource_method(&self.class)?);
        }
        Ok(class)
    }
}

impl MethodManifest {
    fn to_resource_method(&self, class_name: &str) -> Result<ServerResourceMethod, DeploymentError> {
        let http_method = self
            .method
            .as_deref()
            .map(|m| {
                Method::from_bytes(m.trim().to_uppercase().as_bytes())
                    .map_err(|_| manifest_err(format!("invalid HTTP method '{m}' on {class_name}#{}", self.name)))
            })
            .transpose()?;
        match (&http_method, &self.locates) {
            (Some(_), Some(_)) => {
                return Err(manifest_err(format!(
                    "{class_name}#{} has an HTTP method and cannot locate a sub-resource",
                    self.name
                )))
            }
            (None, None) => {
                return Err(manifest_err(format!(
                    "{class_name}#{} needs either an HTTP method or a located class",
                    self.name
                )))
            }
            _ => {}
        }

        let names = self
            .params
            .iter()
            .map(|p| p.name.clone().unwrap_or_else(|| p.ty.to_string()))
            .collect();
        let mut invoker = EchoInvoker::new(format!("{class_name}#{}", self.name), names);
        if let Some(located) = &self.locates {
            invoker = invoker.locating(located);
        }

        let mut method = ServerResourceMethod::new(&self.name, http_method, self.path.as_deref(), Arc::new(invoker))
            .with_produces(parse_media_types(&self.produces)?)
            .with_consumes(parse_media_types(&self.consumes)?);
        if let Some(returns) = &self.returns {
            method = method.with_return_type(returns.clone());
        }
        if self.blocking {
            method = method.blocking();
        }
        if self.virtual_thread {
            method = method.on_virtual_thread();
        }
        if self.sse {
            method = method.server_sent_events(self.returns.as_ref().map(ToString::to_string).as_deref());
        }
        for binding in &self.bindings {
            method = method.with_name_binding(binding);
        }
        for param in &self.params {
            method = method.with_parameter(param.to_parameter()?);
        }
        Ok(method)
    }
}

impl ParamManifest {
    fn to_parameter(&self) -> Result<MethodParameter, DeploymentError> {
        let name = match (&self.name, self.source) {
            (Some(name), _) => name.clone(),
            (None, ParameterType::Body) => "body".to_string(),
            (None, ParameterType::Context) => self.ty.to_string(),
            (None, source) => return Err(manifest_err(format!("{source:?} parameter needs a name"))),
        };
        if matches!(
            self.source,
            ParameterType::Custom | ParameterType::Bean | ParameterType::MultiPartForm
        ) {
            return Err(manifest_err(format!(
                "parameter '{name}': {:?} parameters cannot be declared in a manifest",
                self.source
            )));
        }
        let mut parameter = MethodParameter::new(name, self.source, self.ty.clone());
        if let Some(default) = &self.default {
            parameter = parameter.with_default(default);
        }
        if self.encoded {
            parameter = parameter.encoded();
        }
        Ok(parameter)
    }
}

impl FilterManifest {
    fn register(&self, info: &mut DeploymentInfo) -> Result<(), DeploymentError> {
        match self.kind {
            FilterKind::Request => {
                let filter: Arc<dyn ContainerRequestFilter> = Arc::new(TracingRequestFilter {
                    name: self.name.clone(),
                });
                let mut registration = self.apply(ResourceInterceptor::of_instance(&self.name, filter));
                if self.pre_matching {
                    registration = registration.pre_matching();
                }
                if self.non_blocking {
                    registration = registration.non_blocking();
                }
                if self.read_body {
                    registration = registration.reading_body();
                }
                info.interceptors_mut().add_request_filter(registration);
            }
            FilterKind::Response => {
                if self.pre_matching || self.non_blocking || self.read_body {
                    return Err(manifest_err(format!(
                        "response filter {} only accepts name, priority and bindings",
                        self.name
                    )));
                }
                let filter: Arc<dyn ContainerResponseFilter> = Arc::new(TracingResponseFilter {
                    name: self.name.clone(),
                });
                let registration = self.apply(ResourceInterceptor::of_instance(&self.name, filter));
                info.interceptors_mut().add_response_filter(registration);
            }
        }
        Ok(())
    }

    fn apply<T: ?Sized>(&self, mut registration: ResourceInterceptor<T>) -> ResourceInterceptor<T> {
        registration = registration.with_priority(self.priority);
        for binding in &self.bindings {
            registration = registration.with_name_binding(binding);
        }
        registration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDGETS: &str = r#"
config:
  root_path: /api
resources:
  - class: Widgets
    path: /widgets
    scope: singleton
    methods:
      - name: get
        method: get
        path: "{id}"
        produces: [application/json]
        returns: Widget
        params:
          - { name: id, source: path, type: Long }
          - { name: verbose, source: query, type: boolean, default: "false" }
      - name: parts
        path: "{id}/parts"
        locates: Parts
locatables:
  - class: Parts
    methods:
      - { name: list, method: GET, produces: [application/json] }
filters:
  - { name: audit, kind: response, priority: 100, bindings: [audited] }
  - { name: trace, kind: request, non_blocking: true }
"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::from_yaml_str(WIDGETS).unwrap();
        assert_eq!(manifest.config.root_path.as_deref(), Some("/api"));
        assert_eq!(manifest.resources.len(), 1);
        assert_eq!(manifest.resources[0].scope, InstanceScope::Singleton);
        let get = &manifest.resources[0].methods[0];
        assert_eq!(get.params[0].source, ParameterType::Path);
        assert_eq!(get.params[1].default.as_deref(), Some("false"));
        assert_eq!(manifest.filters[0].kind, FilterKind::Response);
        assert_eq!(manifest.filters[1].priority, PRIORITY_USER);
    }

    #[test]
    fn test_into_deployment_info() {
        let info = Manifest::from_yaml_str(WIDGETS).unwrap().into_deployment_info().unwrap();
        assert_eq!(info.resource_classes.len(), 1);
        assert_eq!(info.locatable_resource_classes.len(), 1);
        let methods = &info.resource_classes[0].methods;
        assert_eq!(methods[0].http_method, Some(Method::GET));
        assert_eq!(methods[0].return_type, TypeDescriptor::class("Widget"));
        assert!(methods[1].is_locator());
        assert_eq!(info.interceptors.container_response_filters.name_bound().len(), 1);
        assert_eq!(info.interceptors.container_request_filters.global().len(), 1);
        assert!(info.interceptors.container_request_filters.global()[0].non_blocking_required);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Manifest::from_yaml_str("resources: []\nroutes: []\n").unwrap_err();
        assert!(matches!(err, DeploymentError::Yaml(_)));
    }

    #[test]
    fn test_method_needs_verb_or_locator() {
        let yaml = r#"
resources:
  - class: A
    path: /a
    methods:
      - { name: broken }
"#;
        let Err(err) = Manifest::from_yaml_str(yaml).unwrap().into_deployment_info() else {
            panic!("manifest must be rejected");
        };
        assert!(matches!(err, DeploymentError::Manifest(_)));
    }

    #[test]
    fn test_bad_media_type_rejected() {
        let yaml = r#"
resources:
  - class: A
    path: /a
    methods:
      - { name: get, method: GET, produces: ["not a type"] }
"#;
        let Err(err) = Manifest::from_yaml_str(yaml).unwrap().into_deployment_info() else {
            panic!("manifest must be rejected");
        };
        assert!(matches!(err, DeploymentError::InvalidMediaType(_)));
    }

    #[test]
    fn test_unnamed_query_parameter_rejected() {
        let yaml = r#"
resources:
  - class: A
    path: /a
    methods:
      - name: get
        method: GET
        params: [{ source: query, type: String }]
"#;
        let Err(err) = Manifest::from_yaml_str(yaml).unwrap().into_deployment_info() else {
            panic!("manifest must be rejected");
        };
        assert!(matches!(err, DeploymentError::Manifest(_)));
    }
}
