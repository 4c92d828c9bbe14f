//! # Request Context
//!
//! [`RequestContext`] is the per-request state that walks a handler chain. It is
//! owned by exactly one executor at a time and moves between the calling thread,
//! the blocking worker pool and virtual-thread coroutines when a dispatch step asks
//! for it, so no field is ever shared between requests.
//!
//! The context also carries the request-scoped flow control:
//!
//! - [`RequestContext::abort_with`] ends normal processing with a response and
//!   switches to the abort chain
//! - a handler returning `Err` switches to the abort chain with the error recorded
//! - [`RequestContext::restart`] replaces the chain (routing steps)

use crate::deployment::RuntimeResource;
use crate::error::HandlerError;
use crate::executor::Dispatch;
use crate::serialisers::EntityWriter;
use crate::spi::{HandlerChain, Instance, ReaderInterceptor, ServerRestHandler, SubResource, WriterInterceptor};
use http::Method;
use mime::Mime;
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::error;

/// Header storage, inline for the common case of a handful of headers.
pub type HeaderVec = SmallVec<[(String, String); 8]>;

/// Name/value pairs of every path variable matched so far.
pub type ParamVec = SmallVec<[(Arc<str>, String); 8]>;

/// Request identifier backed by a ULID.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(ulid::Ulid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(Self)
    }
}

fn find_header<'a>(headers: &'a HeaderVec, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// An inbound HTTP request as seen by the runtime.
#[derive(Debug, Clone)]
pub struct ServerRequest {
    pub method: Method,
    /// Raw path, without the query string.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderVec,
    pub body: Vec<u8>,
}

impl ServerRequest {
    /// Build a request from a method and a request target such as `/a/b?x=1`.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (target.to_string(), None),
        };
        Self {
            method,
            path,
            query,
            headers: HeaderVec::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Every value of a header, splitting comma separated lists.
    #[must_use]
    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .flat_map(|(_, v)| v.split(','))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    }

    #[must_use]
    pub fn content_type(&self) -> Option<Mime> {
        self.header("content-type").and_then(|v| v.parse().ok())
    }

    /// Query parameters in order of appearance. Values are decoded unless `encoded`.
    #[must_use]
    pub fn query_values(&self, name: &str, encoded: bool) -> Vec<String> {
        let Some(query) = &self.query else {
            return Vec::new();
        };
        query
            .split('&')
            .filter_map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_component(k) == name).then(|| {
                    if encoded {
                        v.to_string()
                    } else {
                        decode_component(v)
                    }
                })
            })
            .collect()
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("cookie"))
            .flat_map(|(_, v)| v.split(';'))
            .filter_map(|c| c.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    }
}

/// Percent-decode a URL component, treating `+` as a space.
#[must_use]
pub fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// A response under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderVec,
    pub entity: Option<Value>,
    pub media_type: Option<Mime>,
}

impl Response {
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderVec::new(),
            entity: None,
            media_type: None,
        }
    }

    #[must_use]
    pub fn ok(entity: Value) -> Self {
        Self::new(200).with_entity(entity)
    }

    #[must_use]
    pub fn no_content() -> Self {
        Self::new(204)
    }

    #[must_use]
    pub fn with_entity(mut self, entity: Value) -> Self {
        self.entity = Some(entity);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    #[must_use]
    pub fn with_media_type(mut self, media_type: Mime) -> Self {
        self.media_type = Some(media_type);
        self
    }

    /// Replace any existing value of `name`.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// The bytes sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerResponse {
    pub status: u16,
    pub headers: HeaderVec,
    pub body: Vec<u8>,
}

impl ServerResponse {
    /// A `text/plain` response, used when no writer is available.
    #[must_use]
    pub fn plain(status: u16, message: &str) -> Self {
        let mut headers = HeaderVec::new();
        headers.push(("Content-Type".to_string(), "text/plain".to_string()));
        Self {
            status,
            headers,
            body: message.as_bytes().to_vec(),
        }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    #[must_use]
    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or("")
    }

    /// Parse the body as JSON.
    #[must_use]
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Where the current segment of a chain runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Execution {
    /// The thread that called [`crate::deployment::Deployment::handle`].
    EventLoop,
    /// The blocking worker pool.
    Worker,
    /// A dedicated coroutine for this request.
    Virtual,
}

/// One part of a parsed form body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    pub name: String,
    pub value: Vec<u8>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

/// A parsed `application/x-www-form-urlencoded` or `multipart/form-data` body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    pub parts: Vec<FormPart>,
}

impl FormData {
    pub fn get<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FormPart> + 'a {
        self.parts.iter().filter(move |p| p.name == name)
    }

    #[must_use]
    pub fn first(&self, name: &str) -> Option<&FormPart> {
        self.parts.iter().find(|p| p.name == name)
    }
}

/// Per-request state walked through a handler chain.
pub struct RequestContext {
    request_id: RequestId,
    request: ServerRequest,
    pub(crate) remaining_path: String,
    handlers: HandlerChain,
    abort_handlers: HandlerChain,
    position: usize,
    in_abort_chain: bool,
    path_params: SmallVec<[String; 8]>,
    matched_params: ParamVec,
    target: Option<Arc<RuntimeResource>>,
    pub(crate) instance: Option<Instance>,
    pub(crate) parameters: Vec<Value>,
    pub(crate) result: Option<Value>,
    pub(crate) sub_resource: Option<SubResource>,
    response: Option<Response>,
    throwable: Option<HandlerError>,
    pub(crate) entity_writer: Option<Arc<dyn EntityWriter>>,
    pub(crate) response_media_type: Option<Mime>,
    pub(crate) reader_interceptors: Option<Arc<[Arc<dyn ReaderInterceptor>]>>,
    pub(crate) writer_interceptors: Option<Arc<[Arc<dyn WriterInterceptor>]>>,
    pub(crate) input: Option<Vec<u8>>,
    pub(crate) request_entity: Option<Value>,
    pub(crate) form: Option<FormData>,
    pub(crate) async_response: bool,
    execution: Execution,
    pending: Option<Dispatch>,
    output: Option<ServerResponse>,
    properties: BTreeMap<String, Value>,
}

impl RequestContext {
    /// A fresh context whose chain and abort chain are both `abort_chain` until
    /// routing installs the real chain.
    pub fn new(request: ServerRequest, abort_chain: HandlerChain) -> Self {
        let request_id = request
            .header("x-request-id")
            .and_then(|h| h.parse().ok())
            .unwrap_or_default();
        let remaining_path = request.path.clone();
        Self {
            request_id,
            request,
            remaining_path,
            handlers: Arc::clone(&abort_chain),
            abort_handlers: abort_chain,
            position: 0,
            in_abort_chain: false,
            path_params: SmallVec::new(),
            matched_params: ParamVec::new(),
            target: None,
            instance: None,
            parameters: Vec::new(),
            result: None,
            sub_resource: None,
            response: None,
            throwable: None,
            entity_writer: None,
            response_media_type: None,
            reader_interceptors: None,
            writer_interceptors: None,
            input: None,
            request_entity: None,
            form: None,
            async_response: false,
            execution: Execution::EventLoop,
            pending: None,
            output: None,
            properties: BTreeMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[inline]
    #[must_use]
    pub fn request(&self) -> &ServerRequest {
        &self.request
    }

    /// Pre-match filters may rewrite the method, path or headers before routing.
    pub fn request_mut(&mut self) -> &mut ServerRequest {
        &mut self.request
    }

    /// Path still to be matched by the next routing step.
    #[must_use]
    pub fn remaining_path(&self) -> &str {
        &self.remaining_path
    }

    #[inline]
    #[must_use]
    pub fn execution(&self) -> Execution {
        self.execution
    }

    pub(crate) fn set_execution(&mut self, execution: Execution) {
        self.execution = execution;
    }

    #[must_use]
    pub fn target(&self) -> Option<&Arc<RuntimeResource>> {
        self.target.as_ref()
    }

    #[must_use]
    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    /// Arguments resolved so far, by parameter index.
    #[must_use]
    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, result: Option<Value>) {
        self.result = result;
    }

    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Option<&mut Response> {
        self.response.as_mut()
    }

    pub(crate) fn set_response(&mut self, response: Response) {
        self.response = Some(response);
    }

    pub(crate) fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }

    #[must_use]
    pub fn throwable(&self) -> Option<&HandlerError> {
        self.throwable.as_ref()
    }

    pub(crate) fn take_throwable(&mut self) -> Option<HandlerError> {
        self.throwable.take()
    }

    #[must_use]
    pub fn form(&self) -> Option<&FormData> {
        self.form.as_ref()
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: Value) {
        self.properties.insert(name.into(), value);
    }

    #[must_use]
    pub fn is_in_abort_chain(&self) -> bool {
        self.in_abort_chain
    }

    /// Raw value of the path variable at `index` of the current match.
    #[must_use]
    pub fn path_param(&self, index: usize) -> Option<&str> {
        self.path_params.get(index).map(String::as_str)
    }

    /// Latest value of a named path variable from any match on the way here,
    /// including parent resources of a sub-resource.
    #[must_use]
    pub fn path_param_by_name(&self, name: &str) -> Option<&str> {
        self.matched_params
            .iter()
            .rev()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn reserve_path_params(&mut self, count: usize) {
        if self.path_params.len() < count {
            self.path_params.resize(count, String::new());
        }
    }

    pub(crate) fn set_path_param(&mut self, index: usize, name: Option<&Arc<str>>, value: &str) {
        self.reserve_path_params(index + 1);
        self.path_params[index] = value.to_string();
        if let Some(name) = name {
            self.matched_params.push((Arc::clone(name), value.to_string()));
        }
    }

    pub(crate) fn set_abort_chain(&mut self, chain: HandlerChain) {
        self.abort_handlers = chain;
    }

    /// Install `chain` and start it from the beginning.
    pub(crate) fn restart_chain(&mut self, chain: HandlerChain) {
        self.handlers = chain;
        self.position = 0;
    }

    /// Route to `resource`: its chain replaces the current one.
    pub(crate) fn restart(&mut self, resource: Arc<RuntimeResource>) {
        self.restart_chain(Arc::clone(&resource.handler_chain));
        self.target = Some(resource);
    }

    pub(crate) fn next_handler(&mut self) -> Option<Arc<dyn ServerRestHandler>> {
        if self.output.is_some() {
            return None;
        }
        let handler = self.handlers.get(self.position).map(Arc::clone)?;
        self.position += 1;
        Some(handler)
    }

    /// End normal processing with `response` and run the abort chain.
    pub fn abort_with(&mut self, response: Response) {
        self.response = Some(response);
        self.throwable = None;
        if !self.in_abort_chain {
            self.switch_to_abort_chain();
        }
    }

    /// Record a failure and run the abort chain. A failure inside the abort chain
    /// produces a bare error response.
    pub(crate) fn fail(&mut self, err: HandlerError) {
        if self.in_abort_chain {
            error!(
                request_id = %self.request_id,
                error = %err,
                "Failure while running abort chain"
            );
            self.output = Some(ServerResponse::plain(err.status(), err.message()));
            return;
        }
        self.throwable = Some(err);
        self.response = None;
        self.switch_to_abort_chain();
    }

    fn switch_to_abort_chain(&mut self) {
        self.in_abort_chain = true;
        self.entity_writer = None;
        self.response_media_type = None;
        self.handlers = Arc::clone(&self.abort_handlers);
        self.position = 0;
    }

    /// Ask the executor to continue the chain elsewhere.
    pub(crate) fn suspend(&mut self, dispatch: Dispatch) {
        self.pending = Some(dispatch);
    }

    pub(crate) fn take_dispatch(&mut self) -> Option<Dispatch> {
        self.pending.take()
    }

    #[must_use]
    pub(crate) fn has_pending_dispatch(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn complete(&mut self, output: ServerResponse) {
        self.output = Some(output);
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.output.is_some()
    }

    /// The written response, or a fallback if the chain ended without writing.
    #[must_use]
    pub fn into_response(self) -> ServerResponse {
        if let Some(output) = self.output {
            return output;
        }
        match self.response {
            Some(response) => {
                let body = response
                    .entity
                    .as_ref()
                    .map(|e| serde_json::to_vec(e).unwrap_or_default())
                    .unwrap_or_default();
                ServerResponse {
                    status: response.status,
                    headers: response.headers,
                    body,
                }
            }
            None => ServerResponse::plain(204, ""),
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .field("position", &self.position)
            .field("in_abort_chain", &self.in_abort_chain)
            .field("execution", &self.execution)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_values_decode() {
        let req = ServerRequest::new(Method::GET, "/a?tag=x%20y&tag=z&other=1");
        assert_eq!(req.query_values("tag", false), vec!["x y", "z"]);
        assert_eq!(req.query_values("tag", true), vec!["x%20y", "z"]);
        assert!(req.query_values("missing", false).is_empty());
    }

    #[test]
    fn test_headers_and_cookies() {
        let req = ServerRequest::new(Method::GET, "/")
            .with_header("Accept", "text/plain, application/json")
            .with_header("Cookie", "session=abc; theme=dark");
        assert_eq!(req.header("accept"), Some("text/plain, application/json"));
        assert_eq!(req.header_values("ACCEPT").len(), 2);
        assert_eq!(req.cookie("theme").as_deref(), Some("dark"));
        assert_eq!(req.cookie("nope"), None);
    }

    #[test]
    fn test_request_id_from_header() {
        let id = RequestId::new();
        let req = ServerRequest::new(Method::GET, "/").with_header("X-Request-Id", &id.to_string());
        let ctx = RequestContext::new(req, Arc::from(Vec::new()));
        assert_eq!(ctx.request_id(), id);
    }

    #[test]
    fn test_response_set_header_replaces() {
        let mut r = Response::ok(Value::Null).with_header("X-A", "1");
        r.set_header("x-a", "2");
        assert_eq!(r.header("X-A"), Some("2"));
        assert_eq!(r.headers.len(), 1);
    }
}
