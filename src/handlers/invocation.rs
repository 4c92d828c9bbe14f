use crate::context::RequestContext;
use crate::error::HandlerError;
use crate::model::ParameterType;
use crate::parameters::{ParameterConverter, ParameterExtractor};
use crate::spi::{BeanFactory, EndpointInvoker, EndpointResult, HandlerKind, Instance, ServerRestHandler};
use serde_json::Value;
use std::sync::Arc;

/// Supplies the singleton instance created at deployment.
pub struct InstanceHandler {
    instance: Instance,
}

impl InstanceHandler {
    pub fn new(instance: Instance) -> Self {
        Self { instance }
    }
}

impl ServerRestHandler for InstanceHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        if ctx.instance.is_none() {
            ctx.instance = Some(Arc::clone(&self.instance));
        }
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Instance
    }
}

/// Creates a fresh instance for the request.
pub struct PerRequestInstanceHandler {
    factory: Arc<dyn BeanFactory<Instance>>,
}

impl PerRequestInstanceHandler {
    pub fn new(factory: Arc<dyn BeanFactory<Instance>>) -> Self {
        Self { factory }
    }
}

impl ServerRestHandler for PerRequestInstanceHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        if ctx.instance.is_none() {
            ctx.instance = Some(self.factory.create_instance());
        }
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::PerRequestInstance
    }
}

/// Extracts, defaults and converts one method argument.
pub struct ParameterHandler {
    index: usize,
    name: String,
    parameter_type: ParameterType,
    default_value: Option<String>,
    single: bool,
    extractor: Arc<dyn ParameterExtractor>,
    converter: Option<Arc<dyn ParameterConverter>>,
}

impl ParameterHandler {
    pub fn new(
        index: usize,
        name: impl Into<String>,
        parameter_type: ParameterType,
        default_value: Option<String>,
        single: bool,
        extractor: Arc<dyn ParameterExtractor>,
        converter: Option<Arc<dyn ParameterConverter>>,
    ) -> Self {
        Self {
            index,
            name: name.into(),
            parameter_type,
            default_value,
            single,
            extractor,
            converter,
        }
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parameter_type(&self) -> ParameterType {
        self.parameter_type
    }

    // Bad values in the URI mean the resource does not exist.
    fn conversion_error(&self, err: HandlerError) -> HandlerError {
        match err {
            HandlerError::Web { status: 400, message } => {
                let status = match self.parameter_type {
                    ParameterType::Path | ParameterType::Query | ParameterType::Matrix => 404,
                    _ => 400,
                };
                HandlerError::web(status, format!("parameter '{}': {message}", self.name))
            }
            other => other,
        }
    }
}

impl ServerRestHandler for ParameterHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        let mut value = self.extractor.extract(ctx)?;
        let absent = match &value {
            Value::Null => true,
            Value::Array(items) => items.is_empty(),
            _ => false,
        };
        if absent {
            if let Some(default) = &self.default_value {
                value = if self.single {
                    Value::String(default.clone())
                } else {
                    Value::Array(vec![Value::String(default.clone())])
                };
            }
        }
        if let Some(converter) = &self.converter {
            value = converter.convert(value).map_err(|e| self.conversion_error(e))?;
        }
        if ctx.parameters.len() <= self.index {
            ctx.parameters.resize(self.index + 1, Value::Null);
        }
        ctx.parameters[self.index] = value;
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Parameter
    }
}

/// Calls the endpoint and records what it produced.
pub struct InvocationHandler {
    invoker: Arc<dyn EndpointInvoker>,
}

impl InvocationHandler {
    pub fn new(invoker: Arc<dyn EndpointInvoker>) -> Self {
        Self { invoker }
    }
}

impl ServerRestHandler for InvocationHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        let result = self.invoker.invoke(ctx.instance.as_ref(), &ctx.parameters)?;
        match result {
            EndpointResult::Entity(entity) => ctx.result = Some(entity),
            EndpointResult::Response(response) => {
                ctx.result = None;
                ctx.set_response(response);
            }
            EndpointResult::SubResource(sub) => ctx.sub_resource = Some(sub),
            EndpointResult::Empty => ctx.result = None,
        }
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Invocation
    }
}
