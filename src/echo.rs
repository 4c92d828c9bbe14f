//! Invoker used by manifest-declared methods: it echoes its arguments back.

use crate::error::HandlerError;
use crate::spi::{EndpointInvoker, EndpointResult, Instance, SubResource};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Answers with `{"resource": "Class#method", "args": {name: value, ..}}`, or
/// hands the request to `locates` when the method is a sub-resource locator.
#[derive(Debug, Clone)]
pub struct EchoInvoker {
    resource: String,
    parameter_names: Vec<String>,
    locates: Option<String>,
}

impl EchoInvoker {
    pub fn new(resource: impl Into<String>, parameter_names: Vec<String>) -> Self {
        Self {
            resource: resource.into(),
            parameter_names,
            locates: None,
        }
    }

    /// Return a sub-resource of class `class_name` instead of an entity.
    #[must_use]
    pub fn locating(mut self, class_name: &str) -> Self {
        self.locates = Some(class_name.to_string());
        self
    }
}

impl EndpointInvoker for EchoInvoker {
    fn invoke(&self, _instance: Option<&Instance>, args: &[Value]) -> Result<EndpointResult, HandlerError> {
        if let Some(class_name) = &self.locates {
            return Ok(EndpointResult::SubResource(SubResource {
                class_name: class_name.clone(),
                instance: Arc::new(()),
            }));
        }
        let mut echoed = Map::new();
        for (i, value) in args.iter().enumerate() {
            let name = self
                .parameter_names
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("arg{i}"));
            echoed.insert(name, value.clone());
        }
        Ok(EndpointResult::Entity(json!({
            "resource": self.resource,
            "args": echoed,
        })))
    }
}
