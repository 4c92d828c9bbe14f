use crate::context::{HeaderVec, RequestContext, Response, ServerResponse};
use crate::error::HandlerError;
use crate::exceptions::ExceptionMapping;
use crate::media::{self, ServerMediaType};
use crate::serialisers::{DynamicEntityWriter, EntityWriter, ServerSerialisers};
use crate::spi::{HandlerKind, ServerRestHandler};
use mime::Mime;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error};

/// Turns the invocation result into a response unless one already exists.
/// `null` and absent results become 204.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseHandler;

impl ServerRestHandler for ResponseHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        if ctx.response().is_some() {
            return Ok(());
        }
        let response = match ctx.result.take() {
            None | Some(Value::Null) => Response::no_content(),
            Some(entity) => Response::ok(entity),
        };
        ctx.set_response(response);
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Response
    }
}

/// A single produced media type with its writer fixed at build time.
pub struct FixedProducesHandler {
    media_type: Mime,
    writer: Arc<dyn EntityWriter>,
}

impl FixedProducesHandler {
    pub fn new(media_type: Mime, writer: Arc<dyn EntityWriter>) -> Self {
        Self { media_type, writer }
    }

    #[must_use]
    pub fn media_type(&self) -> &Mime {
        &self.media_type
    }
}

impl ServerRestHandler for FixedProducesHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        if let Some(accept) = ctx.request().header("accept").filter(|h| !h.trim().is_empty()) {
            let acceptable = media::parse_accept(accept)
                .iter()
                .any(|wanted| media::is_compatible_with_suffix(wanted, &self.media_type));
            if !acceptable {
                return Err(HandlerError::not_acceptable());
            }
        }
        ctx.response_media_type = Some(self.media_type.clone());
        ctx.entity_writer = Some(Arc::clone(&self.writer));
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::FixedProduces
    }
}

/// Negotiates the response media type per request; the writer is chosen when
/// the entity is written.
pub struct VariableProducesHandler {
    produces: ServerMediaType,
    writer: Arc<dyn EntityWriter>,
}

impl VariableProducesHandler {
    pub fn new(produces: ServerMediaType, serialisers: Arc<ServerSerialisers>) -> Self {
        Self {
            produces,
            writer: Arc::new(DynamicEntityWriter::new(serialisers)),
        }
    }
}

impl ServerRestHandler for VariableProducesHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        let chosen = self
            .produces
            .negotiate(ctx.request().header("accept"))
            .ok_or_else(HandlerError::not_acceptable)?;
        ctx.response_media_type = Some(chosen);
        ctx.entity_writer = Some(Arc::clone(&self.writer));
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::VariableProduces
    }
}

/// Serialises the response entity and completes the request.
pub struct ResponseWriterHandler {
    fallback: Arc<dyn EntityWriter>,
}

impl ResponseWriterHandler {
    /// `serialisers` back the writer used when no produces step chose one.
    pub fn new(serialisers: Arc<ServerSerialisers>) -> Self {
        Self {
            fallback: Arc::new(DynamicEntityWriter::new(serialisers)),
        }
    }
}

impl ServerRestHandler for ResponseWriterHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        let response = ctx.take_response().unwrap_or_else(Response::no_content);
        let Response {
            status,
            mut headers,
            entity,
            media_type,
        } = response;

        let body = match entity {
            None => Vec::new(),
            Some(entity) => {
                let media_type = media_type.or_else(|| ctx.response_media_type.clone());
                let writer = ctx
                    .entity_writer
                    .as_ref()
                    .map_or_else(|| Arc::clone(&self.fallback), Arc::clone);
                let (mut bytes, written_as) = writer.write(ctx, &entity, media_type.as_ref())?;
                if let Some(interceptors) = &ctx.writer_interceptors {
                    for interceptor in interceptors.iter() {
                        bytes = interceptor.around_write(bytes, &written_as)?;
                    }
                }
                if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
                    headers.push(("Content-Type".to_string(), written_as.to_string()));
                }
                bytes
            }
        };

        debug!(request_id = %ctx.request_id(), status, bytes = body.len(), "Response written");
        ctx.complete(ServerResponse { status, headers, body });
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::ResponseWriter
    }
}

/// Writes the result as a `text/event-stream`: one event per array element.
#[derive(Debug, Default, Clone, Copy)]
pub struct SseResponseWriterHandler;

impl SseResponseWriterHandler {
    fn event(item: &Value) -> String {
        let data = match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let mut out = String::new();
        for line in data.lines() {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

impl ServerRestHandler for SseResponseWriterHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        let entity = match ctx.take_response() {
            Some(response) => response.entity,
            None => ctx.result.take(),
        };
        let body: String = match entity {
            None | Some(Value::Null) => String::new(),
            Some(Value::Array(items)) => items.iter().map(Self::event).collect(),
            Some(single) => Self::event(&single),
        };
        let mut headers = HeaderVec::new();
        headers.push(("Content-Type".to_string(), mime::TEXT_EVENT_STREAM.to_string()));
        ctx.complete(ServerResponse {
            status: 200,
            headers,
            body: body.into_bytes(),
        });
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::SseResponseWriter
    }
}

/// Maps the recorded failure to a response: class mappers of the matched
/// resource first, then the global mappers, then the failure's own status.
pub struct ExceptionHandler {
    mapping: Arc<ExceptionMapping>,
}

impl ExceptionHandler {
    pub fn new(mapping: Arc<ExceptionMapping>) -> Self {
        Self { mapping }
    }

    fn map_with_class_mappers(ctx: &RequestContext, err: &HandlerError) -> Option<Response> {
        let target = ctx.target()?;
        target
            .class_exception_mappers
            .iter()
            .filter(|m| m.kind == err.kind())
            .find_map(|m| m.mapper.to_response(ctx.instance(), err))
    }
}

impl ServerRestHandler for ExceptionHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        let Some(err) = ctx.take_throwable() else {
            return Ok(());
        };
        let response = Self::map_with_class_mappers(ctx, &err)
            .or_else(|| self.mapping.map(&err))
            .unwrap_or_else(|| match &err {
                HandlerError::Web { status, message } => {
                    Response::new(*status).with_entity(json!({ "error": message }))
                }
                other => {
                    error!(request_id = %ctx.request_id(), error = %other, "Unhandled request failure");
                    Response::new(500).with_entity(json!({ "error": "Internal Server Error" }))
                }
            });
        ctx.set_response(response);
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Exception
    }
}
