use super::{MessageBodyWriter, ServerSerialisers};
use crate::context::RequestContext;
use crate::error::HandlerError;
use crate::media;
use mime::Mime;
use serde_json::Value;
use std::sync::Arc;

/// Serialises a response entity, returning the body and its media type.
///
/// `media_type` is the type already chosen for the response, if any.
pub trait EntityWriter: Send + Sync {
    fn write(
        &self,
        ctx: &RequestContext,
        entity: &Value,
        media_type: Option<&Mime>,
    ) -> Result<(Vec<u8>, Mime), HandlerError>;
}

/// One writer fixed at build time.
pub struct FixedEntityWriter {
    writer: Arc<dyn MessageBodyWriter>,
    media_type: Mime,
}

impl FixedEntityWriter {
    pub fn new(writer: Arc<dyn MessageBodyWriter>, media_type: Mime) -> Self {
        Self { writer, media_type }
    }
}

impl EntityWriter for FixedEntityWriter {
    fn write(
        &self,
        _ctx: &RequestContext,
        entity: &Value,
        media_type: Option<&Mime>,
    ) -> Result<(Vec<u8>, Mime), HandlerError> {
        let media_type = media_type.unwrap_or(&self.media_type);
        if !self.writer.is_writeable(entity, media_type) {
            return Err(HandlerError::Internal(format!(
                "writer '{}' cannot serialise the entity as {media_type}",
                self.writer.name()
            )));
        }
        let body = self.writer.write_to(entity, media_type)?;
        Ok((body, media_type.clone()))
    }
}

/// Several candidate writers fixed at build time, tried in order.
pub struct FixedEntityWriterArray {
    writers: Vec<Arc<dyn MessageBodyWriter>>,
    media_type: Mime,
}

impl FixedEntityWriterArray {
    pub fn new(writers: Vec<Arc<dyn MessageBodyWriter>>, media_type: Mime) -> Self {
        Self { writers, media_type }
    }
}

impl EntityWriter for FixedEntityWriterArray {
    fn write(
        &self,
        _ctx: &RequestContext,
        entity: &Value,
        media_type: Option<&Mime>,
    ) -> Result<(Vec<u8>, Mime), HandlerError> {
        let media_type = media_type.unwrap_or(&self.media_type);
        let writer = self
            .writers
            .iter()
            .find(|w| w.is_writeable(entity, media_type))
            .ok_or_else(|| HandlerError::Internal(format!("no writer for {media_type}")))?;
        Ok((writer.write_to(entity, media_type)?, media_type.clone()))
    }
}

/// Chooses the writer per request from the registry.
pub struct DynamicEntityWriter {
    serialisers: Arc<ServerSerialisers>,
}

impl DynamicEntityWriter {
    pub fn new(serialisers: Arc<ServerSerialisers>) -> Self {
        Self { serialisers }
    }
}

impl EntityWriter for DynamicEntityWriter {
    fn write(
        &self,
        ctx: &RequestContext,
        entity: &Value,
        media_type: Option<&Mime>,
    ) -> Result<(Vec<u8>, Mime), HandlerError> {
        if let Some(media_type) = media_type.filter(|m| !media::is_wildcard(m)) {
            let writer = self
                .serialisers
                .find_writers(entity, media_type)
                .into_iter()
                .next()
                .ok_or_else(|| HandlerError::Internal(format!("no writer for {media_type}")))?;
            return Ok((writer.write_to(entity, media_type)?, media_type.clone()));
        }

        let accepted = match ctx.request().header("accept") {
            Some(header) if !header.trim().is_empty() => media::parse_accept(header),
            _ => vec![mime::STAR_STAR],
        };
        let (writer, chosen) = self
            .serialisers
            .select_writer(entity, &accepted)
            .ok_or_else(HandlerError::not_acceptable)?;
        Ok((writer.write_to(entity, &chosen)?, chosen))
    }
}
