use crate::context::{decode_component, FormData, FormPart, RequestContext};
use crate::error::HandlerError;
use crate::media;
use crate::model::TypeDescriptor;
use crate::serialisers::ServerSerialisers;
use crate::spi::{HandlerKind, ServerRestHandler};
use mime::Mime;
use std::sync::Arc;
use tracing::debug;

/// Reads the request body in chunks of `buffer_size` bytes into the context,
/// ahead of a non-blocking deserialisation step.
#[derive(Debug, Clone, Copy)]
pub struct InputHandler {
    buffer_size: usize,
}

impl InputHandler {
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }
}

impl ServerRestHandler for InputHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        if ctx.input.is_some() {
            return Ok(());
        }
        let body = &ctx.request().body;
        let mut input = Vec::with_capacity(body.len());
        let mut chunks = 0usize;
        for chunk in body.chunks(self.buffer_size) {
            input.extend_from_slice(chunk);
            chunks += 1;
        }
        debug!(
            request_id = %ctx.request_id(),
            bytes = input.len(),
            chunks,
            "Request body buffered"
        );
        ctx.input = Some(input);
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Input
    }
}

/// Parses `application/x-www-form-urlencoded` and `multipart/form-data` bodies.
/// Parsing happens once even if the step appears twice in a chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormBodyHandler;

impl ServerRestHandler for FormBodyHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        if ctx.form.is_some() {
            return Ok(());
        }
        let Some(content_type) = ctx.request().content_type() else {
            return Ok(());
        };
        let body = ctx.input.as_deref().unwrap_or(&ctx.request().body);
        let form = if content_type.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() {
            parse_urlencoded(body)
        } else if content_type.essence_str() == mime::MULTIPART_FORM_DATA.essence_str() {
            let boundary = content_type
                .get_param(mime::BOUNDARY)
                .ok_or_else(|| HandlerError::bad_request("multipart body without boundary"))?;
            parse_multipart(body, boundary.as_str())?
        } else {
            return Ok(());
        };
        ctx.form = Some(form);
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::FormBody
    }
}

/// Split an urlencoded body into fields.
#[must_use]
pub fn parse_urlencoded(body: &[u8]) -> FormData {
    let text = String::from_utf8_lossy(body);
    let parts = text
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            FormPart {
                name: decode_component(k),
                value: decode_component(v).into_bytes(),
                filename: None,
                content_type: None,
            }
        })
        .collect();
    FormData { parts }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn disposition_param(header: &str, key: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|item| {
        let (k, v) = item.split_once('=')?;
        k.trim()
            .eq_ignore_ascii_case(key)
            .then(|| v.trim().trim_matches('"').to_string())
    })
}

/// Split a `multipart/form-data` body on `boundary`.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Result<FormData, HandlerError> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();
    let malformed = || HandlerError::bad_request("malformed multipart body");

    let mut rest = &body[find(body, delimiter).ok_or_else(malformed)? + delimiter.len()..];
    let mut parts = Vec::new();
    loop {
        if rest.starts_with(b"--") {
            break;
        }
        rest = rest.strip_prefix(b"\r\n").ok_or_else(malformed)?;
        let end = find(rest, delimiter).ok_or_else(malformed)?;
        let section = &rest[..end];
        rest = &rest[end + delimiter.len()..];

        let split = find(section, b"\r\n\r\n").ok_or_else(malformed)?;
        let head = String::from_utf8_lossy(&section[..split]);
        let mut value = &section[split + 4..];
        if let Some(trimmed) = value.strip_suffix(b"\r\n") {
            value = trimmed;
        }

        let mut name = None;
        let mut filename = None;
        let mut content_type = None;
        for line in head.lines() {
            let Some((key, val)) = line.split_once(':') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("content-disposition") {
                name = disposition_param(val, "name");
                filename = disposition_param(val, "filename");
            } else if key.trim().eq_ignore_ascii_case("content-type") {
                content_type = Some(val.trim().to_string());
            }
        }
        parts.push(FormPart {
            name: name.ok_or_else(malformed)?,
            value: value.to_vec(),
            filename,
            content_type,
        });
    }
    Ok(FormData { parts })
}

/// Reads the request entity with the first matching body reader.
pub struct RequestDeserializeHandler {
    declared: TypeDescriptor,
    consumes: Vec<Mime>,
    serialisers: Arc<ServerSerialisers>,
}

impl RequestDeserializeHandler {
    pub fn new(declared: TypeDescriptor, consumes: Vec<Mime>, serialisers: Arc<ServerSerialisers>) -> Self {
        Self {
            declared,
            consumes,
            serialisers,
        }
    }
}

impl ServerRestHandler for RequestDeserializeHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        let sent = ctx.request().content_type();
        if let Some(sent) = &sent {
            if !self.consumes.is_empty() && !self.consumes.iter().any(|c| media::is_compatible_with_suffix(c, sent)) {
                return Err(HandlerError::unsupported_media_type());
            }
        }
        let media_type = sent
            .or_else(|| self.consumes.first().filter(|m| !media::is_wildcard(m)).cloned())
            .unwrap_or(mime::APPLICATION_OCTET_STREAM);

        let mut body = match ctx.input.take() {
            Some(input) => input,
            None => ctx.request().body.clone(),
        };
        if let Some(interceptors) = ctx.reader_interceptors.as_ref().map(Arc::clone) {
            for interceptor in interceptors.iter() {
                body = interceptor.around_read(body, &media_type)?;
            }
        }

        let reader = self
            .serialisers
            .find_readers(&self.declared, &media_type)
            .into_iter()
            .next()
            .ok_or_else(HandlerError::unsupported_media_type)?;
        ctx.request_entity = Some(reader.read_from(&self.declared, &media_type, &body)?);
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::RequestDeserialize
    }
}
