//! Mapping of request-time failures to responses.

use crate::context::Response;
use crate::error::HandlerError;
use crate::spi::Instance;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Turns a failure into a response.
pub trait ExceptionMapper: Send + Sync {
    fn to_response(&self, err: &HandlerError) -> Response;
}

impl<F> ExceptionMapper for F
where
    F: Fn(&HandlerError) -> Response + Send + Sync,
{
    fn to_response(&self, err: &HandlerError) -> Response {
        self(err)
    }
}

/// A mapper declared on a resource class, invoked with that class's instance.
/// Returning `None` falls through to the global mappers.
pub trait ResourceExceptionMapper: Send + Sync {
    fn to_response(&self, instance: Option<&Instance>, err: &HandlerError) -> Option<Response>;
}

impl<F> ResourceExceptionMapper for F
where
    F: Fn(Option<&Instance>, &HandlerError) -> Option<Response> + Send + Sync,
{
    fn to_response(&self, instance: Option<&Instance>, err: &HandlerError) -> Option<Response> {
        self(instance, err)
    }
}

/// Global exception mappers keyed by [`HandlerError::kind`]. When two mappers
/// claim the same kind the lower priority value wins.
#[derive(Default, Clone)]
pub struct ExceptionMapping {
    mappers: HashMap<String, (i32, Arc<dyn ExceptionMapper>)>,
}

impl ExceptionMapping {
    pub fn add(&mut self, kind: &str, priority: i32, mapper: Arc<dyn ExceptionMapper>) {
        match self.mappers.get(kind) {
            Some((existing, _)) if *existing <= priority => {
                debug!(kind = %kind, priority, existing = *existing, "Ignoring lower priority exception mapper");
            }
            _ => {
                self.mappers.insert(kind.to_string(), (priority, mapper));
            }
        }
    }

    #[must_use]
    pub fn map(&self, err: &HandlerError) -> Option<Response> {
        self.mappers
            .get(err.kind())
            .map(|(_, mapper)| mapper.to_response(err))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lower_priority_value_wins() {
        let mut mapping = ExceptionMapping::default();
        let low: Arc<dyn ExceptionMapper> =
            Arc::new(|_: &HandlerError| Response::new(418).with_entity(json!("low")));
        let high: Arc<dyn ExceptionMapper> =
            Arc::new(|_: &HandlerError| Response::new(409).with_entity(json!("high")));
        mapping.add("Conflict", 10, low);
        mapping.add("Conflict", 100, high);

        let err = HandlerError::application("Conflict", "dup");
        assert_eq!(mapping.map(&err).map(|r| r.status), Some(418));
        assert!(mapping.map(&HandlerError::not_found()).is_none());
        assert_eq!(mapping.len(), 1);
    }
}
