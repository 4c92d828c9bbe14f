use super::ParameterConverter;
use crate::context::{decode_component, FormPart, RequestContext};
use crate::error::HandlerError;
use crate::model::TypeDescriptor;
use crate::serialisers::ServerSerialisers;
use mime::Mime;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Pulls the raw value of one parameter out of the request.
pub trait ParameterExtractor: Send + Sync {
    fn extract(&self, ctx: &mut RequestContext) -> Result<Value, HandlerError>;
}

impl<F> ParameterExtractor for F
where
    F: Fn(&mut RequestContext) -> Result<Value, HandlerError> + Send + Sync,
{
    fn extract(&self, ctx: &mut RequestContext) -> Result<Value, HandlerError> {
        self(ctx)
    }
}

fn collect(values: Vec<String>, single: bool) -> Value {
    if single {
        values.into_iter().next().map_or(Value::Null, Value::String)
    } else {
        Value::Array(values.into_iter().map(Value::String).collect())
    }
}

/// A path variable of the current match, by position.
#[derive(Debug, Clone, Copy)]
pub struct PathParamExtractor {
    pub index: usize,
    pub encoded: bool,
    pub single: bool,
}

impl ParameterExtractor for PathParamExtractor {
    fn extract(&self, ctx: &mut RequestContext) -> Result<Value, HandlerError> {
        let Some(raw) = ctx.path_param(self.index) else {
            return Ok(Value::Null);
        };
        let value = if self.encoded {
            raw.to_string()
        } else {
            decode_component(raw)
        };
        Ok(collect(vec![value], self.single))
    }
}

/// A path variable matched by a parent resource, looked up by name. Used for
/// sub-resources whose own templates do not declare the variable.
#[derive(Debug, Clone)]
pub struct LocatableResourcePathParamExtractor {
    pub name: String,
}

impl ParameterExtractor for LocatableResourcePathParamExtractor {
    fn extract(&self, ctx: &mut RequestContext) -> Result<Value, HandlerError> {
        Ok(ctx
            .path_param_by_name(&self.name)
            .map_or(Value::Null, |v| Value::String(decode_component(v))))
    }
}

/// A path parameter with no matching template variable: always absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullParamExtractor;

impl ParameterExtractor for NullParamExtractor {
    fn extract(&self, _ctx: &mut RequestContext) -> Result<Value, HandlerError> {
        Ok(Value::Null)
    }
}

#[derive(Debug, Clone)]
pub struct QueryParamExtractor {
    pub name: String,
    pub single: bool,
    pub encoded: bool,
}

impl ParameterExtractor for QueryParamExtractor {
    fn extract(&self, ctx: &mut RequestContext) -> Result<Value, HandlerError> {
        Ok(collect(ctx.request().query_values(&self.name, self.encoded), self.single))
    }
}

#[derive(Debug, Clone)]
pub struct HeaderParamExtractor {
    pub name: String,
    pub single: bool,
}

impl ParameterExtractor for HeaderParamExtractor {
    fn extract(&self, ctx: &mut RequestContext) -> Result<Value, HandlerError> {
        let request = ctx.request();
        if self.single {
            return Ok(request
                .header(&self.name)
                .map_or(Value::Null, |v| Value::String(v.to_string())));
        }
        Ok(collect(request.header_values(&self.name), false))
    }
}

#[derive(Debug, Clone)]
pub struct CookieParamExtractor {
    pub name: String,
}

impl ParameterExtractor for CookieParamExtractor {
    fn extract(&self, ctx: &mut RequestContext) -> Result<Value, HandlerError> {
        Ok(ctx.request().cookie(&self.name).map_or(Value::Null, Value::String))
    }
}

/// `;name=value` pairs attached to any path segment.
#[derive(Debug, Clone)]
pub struct MatrixParamExtractor {
    pub name: String,
    pub single: bool,
    pub encoded: bool,
}

impl ParameterExtractor for MatrixParamExtractor {
    fn extract(&self, ctx: &mut RequestContext) -> Result<Value, HandlerError> {
        let values = ctx
            .request()
            .path
            .split('/')
            .flat_map(|segment| segment.split(';').skip(1))
            .filter_map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (k == self.name).then(|| if self.encoded { v.to_string() } else { decode_component(v) })
            })
            .collect();
        Ok(collect(values, self.single))
    }
}

/// How a form field is handed to the method.
#[derive(Clone)]
pub enum FormValueKind {
    Text,
    Bytes,
    /// File metadata and content of an uploaded part.
    File,
    /// A part read with a body reader for its declared media type.
    Part {
        media_type: Mime,
        declared: TypeDescriptor,
        serialisers: Arc<ServerSerialisers>,
    },
}

#[derive(Clone)]
pub struct FormParamExtractor {
    pub name: String,
    pub single: bool,
    pub encoded: bool,
    pub kind: FormValueKind,
}

impl FormParamExtractor {
    fn part_value(&self, part: &FormPart) -> Result<Value, HandlerError> {
        match &self.kind {
            FormValueKind::Text => {
                let text = String::from_utf8_lossy(&part.value).into_owned();
                Ok(Value::String(if self.encoded {
                    urlencoding::encode(&text).into_owned()
                } else {
                    text
                }))
            }
            FormValueKind::Bytes => Ok(Value::Array(part.value.iter().map(|b| Value::from(*b)).collect())),
            FormValueKind::File => Ok(json!({
                "name": part.name,
                "fileName": part.filename,
                "contentType": part.content_type,
                "size": part.value.len(),
                "content": String::from_utf8_lossy(&part.value),
            })),
            FormValueKind::Part {
                media_type,
                declared,
                serialisers,
            } => {
                let sent = part
                    .content_type
                    .as_deref()
                    .and_then(|c| c.parse::<Mime>().ok())
                    .unwrap_or_else(|| media_type.clone());
                let reader = serialisers
                    .find_readers(declared, &sent)
                    .into_iter()
                    .next()
                    .ok_or_else(HandlerError::unsupported_media_type)?;
                reader.read_from(declared, &sent, &part.value)
            }
        }
    }
}

impl ParameterExtractor for FormParamExtractor {
    fn extract(&self, ctx: &mut RequestContext) -> Result<Value, HandlerError> {
        let Some(form) = ctx.form() else {
            return Ok(Value::Null);
        };
        if self.single {
            return form.first(&self.name).map_or(Ok(Value::Null), |p| self.part_value(p));
        }
        form.get(&self.name)
            .map(|p| self.part_value(p))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

/// The deserialised request entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyParamExtractor;

impl ParameterExtractor for BodyParamExtractor {
    fn extract(&self, ctx: &mut RequestContext) -> Result<Value, HandlerError> {
        Ok(ctx.request_entity.take().unwrap_or(Value::Null))
    }
}

/// Produces a context object (headers, URI info ...) from the request.
pub trait ContextProducer: Send + Sync {
    fn produce(&self, ctx: &RequestContext) -> Value;
}

impl<F> ContextProducer for F
where
    F: Fn(&RequestContext) -> Value + Send + Sync,
{
    fn produce(&self, ctx: &RequestContext) -> Value {
        self(ctx)
    }
}

/// Context types injectable into resource methods, by type name.
#[derive(Clone, Default)]
pub struct ContextResolvers {
    producers: HashMap<String, Arc<dyn ContextProducer>>,
}

impl ContextResolvers {
    /// `HttpHeaders`, `UriInfo`, `Request` and `RequestId`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut r = Self::default();
        r.register(
            "HttpHeaders",
            Arc::new(|ctx: &RequestContext| {
                let mut headers = Map::new();
                for (k, v) in &ctx.request().headers {
                    headers.insert(k.to_ascii_lowercase(), Value::String(v.clone()));
                }
                Value::Object(headers)
            }),
        );
        r.register(
            "UriInfo",
            Arc::new(|ctx: &RequestContext| {
                json!({
                    "path": ctx.request().path,
                    "query": ctx.request().query,
                    "remainingPath": ctx.remaining_path(),
                })
            }),
        );
        r.register(
            "Request",
            Arc::new(|ctx: &RequestContext| json!({ "method": ctx.request().method.as_str() })),
        );
        r.register(
            "RequestId",
            Arc::new(|ctx: &RequestContext| Value::String(ctx.request_id().to_string())),
        );
        r
    }

    pub fn register(&mut self, type_name: &str, producer: Arc<dyn ContextProducer>) {
        self.producers.insert(type_name.to_string(), producer);
    }

    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.producers.contains_key(type_name)
    }

    #[must_use]
    pub fn resolve(&self, type_name: &str, ctx: &RequestContext) -> Option<Value> {
        self.producers.get(type_name).map(|p| p.produce(ctx))
    }
}

pub struct ContextParamExtractor {
    pub type_name: String,
    pub resolvers: Arc<ContextResolvers>,
}

impl ParameterExtractor for ContextParamExtractor {
    fn extract(&self, ctx: &mut RequestContext) -> Result<Value, HandlerError> {
        match self.resolvers.resolve(&self.type_name, ctx) {
            Some(v) => Ok(v),
            None => {
                debug!(type_name = %self.type_name, "No context producer registered");
                Ok(Value::Null)
            }
        }
    }
}

/// One field of an aggregate parameter.
pub struct BeanField {
    pub name: String,
    pub extractor: Arc<dyn ParameterExtractor>,
    pub converter: Option<Arc<dyn ParameterConverter>>,
    pub default_value: Option<String>,
}

/// Builds an object from several extracted fields (a bean or multipart form).
pub struct InjectParamExtractor {
    pub fields: Vec<BeanField>,
}

impl ParameterExtractor for InjectParamExtractor {
    fn extract(&self, ctx: &mut RequestContext) -> Result<Value, HandlerError> {
        let mut out = Map::new();
        for field in &self.fields {
            let mut value = field.extractor.extract(ctx)?;
            if value.is_null() {
                if let Some(default) = &field.default_value {
                    value = Value::String(default.clone());
                }
            }
            if let Some(converter) = &field.converter {
                value = converter.convert(value)?;
            }
            out.insert(field.name.clone(), value);
        }
        Ok(Value::Object(out))
    }
}

/// Marks the request as completed asynchronously by the method.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncResponseExtractor;

impl ParameterExtractor for AsyncResponseExtractor {
    fn extract(&self, ctx: &mut RequestContext) -> Result<Value, HandlerError> {
        ctx.async_response = true;
        Ok(json!({ "requestId": ctx.request_id().to_string() }))
    }
}

/// Every part of a multipart body.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultipartDataInputExtractor;

impl ParameterExtractor for MultipartDataInputExtractor {
    fn extract(&self, ctx: &mut RequestContext) -> Result<Value, HandlerError> {
        let Some(form) = ctx.form() else {
            return Ok(Value::Array(Vec::new()));
        };
        Ok(Value::Array(
            form.parts
                .iter()
                .map(|p| {
                    json!({
                        "name": p.name,
                        "fileName": p.filename,
                        "contentType": p.content_type,
                        "value": String::from_utf8_lossy(&p.value),
                    })
                })
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{FormData, ServerRequest};
    use http::Method;

    fn ctx(target: &str) -> RequestContext {
        RequestContext::new(ServerRequest::new(Method::GET, target), Arc::from(Vec::new()))
    }

    #[test]
    fn test_path_param_decoding() {
        let mut c = ctx("/a/x%20y");
        c.set_path_param(0, None, "x%20y");
        let decoded = PathParamExtractor { index: 0, encoded: false, single: true };
        let raw = PathParamExtractor { index: 0, encoded: true, single: true };
        assert_eq!(decoded.extract(&mut c).unwrap(), json!("x y"));
        assert_eq!(raw.extract(&mut c).unwrap(), json!("x%20y"));
        let missing = PathParamExtractor { index: 3, encoded: false, single: true };
        assert_eq!(missing.extract(&mut c).unwrap(), Value::Null);
    }

    #[test]
    fn test_query_single_and_multi() {
        let mut c = ctx("/a?t=1&t=2");
        let single = QueryParamExtractor { name: "t".into(), single: true, encoded: false };
        let multi = QueryParamExtractor { name: "t".into(), single: false, encoded: false };
        assert_eq!(single.extract(&mut c).unwrap(), json!("1"));
        assert_eq!(multi.extract(&mut c).unwrap(), json!(["1", "2"]));
    }

    #[test]
    fn test_matrix_params() {
        let mut c = ctx("/cars;color=red/2024;trim=base%20x");
        let color = MatrixParamExtractor { name: "color".into(), single: true, encoded: false };
        let trim = MatrixParamExtractor { name: "trim".into(), single: true, encoded: false };
        assert_eq!(color.extract(&mut c).unwrap(), json!("red"));
        assert_eq!(trim.extract(&mut c).unwrap(), json!("base x"));
    }

    #[test]
    fn test_form_fields() {
        let mut c = ctx("/f");
        c.form = Some(FormData {
            parts: vec![
                FormPart { name: "n".into(), value: b"a".to_vec(), filename: None, content_type: None },
                FormPart { name: "n".into(), value: b"b".to_vec(), filename: None, content_type: None },
            ],
        });
        let multi = FormParamExtractor { name: "n".into(), single: false, encoded: false, kind: FormValueKind::Text };
        assert_eq!(multi.extract(&mut c).unwrap(), json!(["a", "b"]));
    }

    #[test]
    fn test_context_resolvers() {
        let mut c = ctx("/ctx?q=1");
        let extractor = ContextParamExtractor {
            type_name: "UriInfo".into(),
            resolvers: Arc::new(ContextResolvers::with_builtins()),
        };
        assert_eq!(extractor.extract(&mut c).unwrap()["path"], json!("/ctx"));
        let unknown = ContextParamExtractor {
            type_name: "Nope".into(),
            resolvers: Arc::new(ContextResolvers::default()),
        };
        assert_eq!(unknown.extract(&mut c).unwrap(), Value::Null);
    }
}
