use super::*;
use crate::context::{RequestContext, Response, ServerRequest, ServerResponse};
use crate::error::HandlerError;
use crate::exceptions::{ExceptionMapper, ExceptionMapping};
use crate::executor::execute;
use crate::media::ServerMediaType;
use crate::model::{ParameterType, TypeDescriptor};
use crate::parameters::{converters, ParameterExtractor, PathParamExtractor};
use crate::serialisers::ServerSerialisers;
use crate::spi::{
    ContainerRequestFilter, EndpointInvoker, EndpointResult, HandlerChain, Instance, ServerRestHandler,
    WriterInterceptor,
};
use http::Method;
use mime::Mime;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn serialisers() -> Arc<ServerSerialisers> {
    Arc::new(ServerSerialisers::with_builtins())
}

fn abort_chain(mapping: ExceptionMapping) -> HandlerChain {
    Arc::from(vec![
        Arc::new(ExceptionHandler::new(Arc::new(mapping))) as Arc<dyn ServerRestHandler>,
        Arc::new(ResponseHandler),
        Arc::new(ResponseWriterHandler::new(serialisers())),
    ])
}

fn invoker(f: fn(&[Value]) -> Result<EndpointResult, HandlerError>) -> Arc<dyn EndpointInvoker> {
    Arc::new(move |_: Option<&Instance>, args: &[Value]| f(args))
}

fn run(request: ServerRequest, handlers: Vec<Arc<dyn ServerRestHandler>>, abort: HandlerChain) -> ServerResponse {
    let mut ctx = RequestContext::new(request, Arc::clone(&abort));
    ctx.restart_chain(Arc::from(handlers));
    execute(ctx)
}

fn endpoint_chain(invoke: Arc<dyn EndpointInvoker>, produces: &[Mime]) -> Vec<Arc<dyn ServerRestHandler>> {
    let mut chain: Vec<Arc<dyn ServerRestHandler>> =
        vec![Arc::new(AbortChainHandler::new(abort_chain(ExceptionMapping::default())))];
    if !produces.is_empty() {
        chain.push(Arc::new(VariableProducesHandler::new(ServerMediaType::new(produces), serialisers())));
    }
    chain.push(Arc::new(InvocationHandler::new(invoke)));
    chain.push(Arc::new(ResponseHandler));
    chain.push(Arc::new(ResponseWriterHandler::new(serialisers())));
    chain
}

#[test]
fn test_negotiated_writer() {
    let hello = invoker(|_| Ok(EndpointResult::Entity(json!("hi"))));
    let chain = endpoint_chain(hello, &[mime::APPLICATION_JSON, mime::TEXT_PLAIN]);

    let text = ServerRequest::new(Method::GET, "/").with_header("Accept", "text/plain");
    let res = run(text, chain.clone(), abort_chain(ExceptionMapping::default()));
    assert_eq!(res.status, 200);
    assert_eq!(res.body_str(), "hi");
    assert_eq!(res.header("content-type"), Some("text/plain"));

    let json_req = ServerRequest::new(Method::GET, "/");
    let res = run(json_req, chain, abort_chain(ExceptionMapping::default()));
    assert_eq!(res.body_str(), "\"hi\"");
    assert_eq!(res.header("content-type"), Some("application/json"));
}

#[test]
fn test_unacceptable_media_type() {
    let hello = invoker(|_| Ok(EndpointResult::Entity(json!({"a": 1}))));
    let chain = endpoint_chain(hello, &[mime::APPLICATION_JSON]);
    let req = ServerRequest::new(Method::GET, "/").with_header("Accept", "image/png");
    let res = run(req, chain, abort_chain(ExceptionMapping::default()));
    assert_eq!(res.status, 406);
}

#[test]
fn test_empty_result_is_no_content() {
    let nothing = invoker(|_| Ok(EndpointResult::Empty));
    let res = run(
        ServerRequest::new(Method::DELETE, "/"),
        endpoint_chain(nothing, &[]),
        abort_chain(ExceptionMapping::default()),
    );
    assert_eq!(res.status, 204);
    assert!(res.body.is_empty());
}

#[test]
fn test_failure_switches_to_abort_chain() {
    let missing = invoker(|_| Err(HandlerError::not_found()));
    let res = run(
        ServerRequest::new(Method::GET, "/"),
        endpoint_chain(missing, &[mime::APPLICATION_JSON]),
        abort_chain(ExceptionMapping::default()),
    );
    assert_eq!(res.status, 404);
    assert_eq!(res.json(), Some(json!({"error": "Not Found"})));
}

#[test]
fn test_global_exception_mapper() {
    let mut mapping = ExceptionMapping::default();
    let conflict: Arc<dyn ExceptionMapper> =
        Arc::new(|e: &HandlerError| Response::new(409).with_entity(json!({"conflict": e.message()})));
    mapping.add("Duplicate", 100, conflict);
    let abort = abort_chain(mapping);

    let dup = invoker(|_| Err(HandlerError::application("Duplicate", "widget 7")));
    let chain: Vec<Arc<dyn ServerRestHandler>> = vec![
        Arc::new(AbortChainHandler::new(Arc::clone(&abort))),
        Arc::new(InvocationHandler::new(dup)),
        Arc::new(ResponseHandler),
        Arc::new(ResponseWriterHandler::new(serialisers())),
    ];
    let res = run(ServerRequest::new(Method::POST, "/"), chain, abort);
    assert_eq!(res.status, 409);
    assert_eq!(res.json(), Some(json!({"conflict": "widget 7"})));
}

#[test]
fn test_unmapped_application_error_is_500() {
    let boom = invoker(|_| Err(HandlerError::application("Boom", "bad")));
    let res = run(
        ServerRequest::new(Method::GET, "/"),
        endpoint_chain(boom, &[]),
        abort_chain(ExceptionMapping::default()),
    );
    assert_eq!(res.status, 500);
}

#[test]
fn test_panicking_handler_becomes_500() {
    let panics = invoker(|_| panic!("endpoint exploded"));
    let res = run(
        ServerRequest::new(Method::GET, "/"),
        endpoint_chain(panics, &[]),
        abort_chain(ExceptionMapping::default()),
    );
    assert_eq!(res.status, 500);
}

#[test]
fn test_filter_abort_skips_invocation() {
    static INVOKED: AtomicBool = AtomicBool::new(false);
    let deny: Arc<dyn ContainerRequestFilter> = Arc::new(|ctx: &mut RequestContext| {
        ctx.abort_with(Response::new(401).with_entity(json!("denied")));
        Ok(())
    });
    let track = invoker(|_| {
        INVOKED.store(true, Ordering::SeqCst);
        Ok(EndpointResult::Empty)
    });
    let mut chain = endpoint_chain(track, &[]);
    chain.insert(1, Arc::new(ResourceRequestFilterHandler::new(deny, false, false, false)));

    let res = run(ServerRequest::new(Method::GET, "/"), chain, abort_chain(ExceptionMapping::default()));
    assert_eq!(res.status, 401);
    assert!(!INVOKED.load(Ordering::SeqCst));
}

struct Shout;

impl WriterInterceptor for Shout {
    fn around_write(&self, body: Vec<u8>, _media_type: &Mime) -> Result<Vec<u8>, HandlerError> {
        Ok(body.to_ascii_uppercase())
    }
}

#[test]
fn test_writer_interceptors_wrap_output() {
    let hello = invoker(|_| Ok(EndpointResult::Entity(json!("quiet"))));
    let mut chain = endpoint_chain(hello, &[mime::TEXT_PLAIN]);
    let writers: WriterInterceptors = Arc::from(vec![Arc::new(Shout) as Arc<dyn WriterInterceptor>]);
    chain.insert(1, Arc::new(InterceptorHandler::new(None, Some(writers))));
    let res = run(ServerRequest::new(Method::GET, "/"), chain, abort_chain(ExceptionMapping::default()));
    assert_eq!(res.body_str(), "QUIET");
}

#[test]
fn test_parameter_conversion_errors() {
    let long = converters::supplier_for(&TypeDescriptor::class("Long")).unwrap();
    let extractor: Arc<dyn ParameterExtractor> = Arc::new(PathParamExtractor {
        index: 0,
        encoded: false,
        single: true,
    });
    let path_param = ParameterHandler::new(
        0,
        "id",
        ParameterType::Path,
        None,
        true,
        Arc::clone(&extractor),
        Some(Arc::from(long())),
    );
    let header_param = ParameterHandler::new(0, "id", ParameterType::Header, None, true, extractor, Some(Arc::from(long())));

    let mut ctx = RequestContext::new(ServerRequest::new(Method::GET, "/w/abc"), Arc::from(Vec::new()));
    ctx.set_path_param(0, None, "abc");
    assert_eq!(path_param.handle(&mut ctx).unwrap_err().status(), 404);
    assert_eq!(header_param.handle(&mut ctx).unwrap_err().status(), 400);

    ctx.set_path_param(0, None, "42");
    path_param.handle(&mut ctx).unwrap();
    assert_eq!(ctx.parameters(), &[json!(42)]);
}

#[test]
fn test_parameter_default_value() {
    let extractor: Arc<dyn ParameterExtractor> = Arc::new(crate::parameters::QueryParamExtractor {
        name: "page".into(),
        single: true,
        encoded: false,
    });
    let long = converters::supplier_for(&TypeDescriptor::class("int")).unwrap();
    let handler = ParameterHandler::new(1, "page", ParameterType::Query, Some("1".into()), true, extractor, Some(Arc::from(long())));
    let mut ctx = RequestContext::new(ServerRequest::new(Method::GET, "/w"), Arc::from(Vec::new()));
    handler.handle(&mut ctx).unwrap();
    assert_eq!(ctx.parameters(), &[Value::Null, json!(1)]);
}

#[test]
fn test_parse_multipart() {
    let body = b"--XyZ\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\r\n\
hello\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\r\n\
line1\r\nline2\r\n\
--XyZ--\r\n";
    let form = parse_multipart(body, "XyZ").unwrap();
    assert_eq!(form.parts.len(), 2);
    assert_eq!(form.first("title").unwrap().value, b"hello");
    let file = form.first("file").unwrap();
    assert_eq!(file.filename.as_deref(), Some("a.txt"));
    assert_eq!(file.value, b"line1\r\nline2");
    assert!(parse_multipart(b"garbage", "XyZ").is_err());
}

#[test]
fn test_form_body_urlencoded() {
    let req = ServerRequest::new(Method::POST, "/f")
        .with_header("Content-Type", "application/x-www-form-urlencoded")
        .with_body("name=a+b&tag=x&tag=y%21");
    let mut ctx = RequestContext::new(req, Arc::from(Vec::new()));
    FormBodyHandler.handle(&mut ctx).unwrap();
    let form = ctx.form().unwrap();
    assert_eq!(form.first("name").unwrap().value, b"a b");
    assert_eq!(form.get("tag").count(), 2);
}

#[test]
fn test_deserialize_rejects_unconsumed_type() {
    let handler = RequestDeserializeHandler::new(TypeDescriptor::class("Widget"), vec![mime::APPLICATION_JSON], serialisers());
    let req = ServerRequest::new(Method::POST, "/").with_header("Content-Type", "text/plain").with_body("x");
    let mut ctx = RequestContext::new(req, Arc::from(Vec::new()));
    assert_eq!(handler.handle(&mut ctx).unwrap_err().status(), 415);

    let req = ServerRequest::new(Method::POST, "/")
        .with_header("Content-Type", "application/json")
        .with_body(r#"{"id": 3}"#);
    let mut ctx = RequestContext::new(req, Arc::from(Vec::new()));
    handler.handle(&mut ctx).unwrap();
    assert_eq!(ctx.request_entity, Some(json!({"id": 3})));
}

#[test]
fn test_sse_framing() {
    let events = invoker(|_| Ok(EndpointResult::Entity(json!(["one", {"n": 2}]))));
    let chain: Vec<Arc<dyn ServerRestHandler>> = vec![
        Arc::new(InvocationHandler::new(events)),
        Arc::new(SseResponseWriterHandler),
    ];
    let res = run(ServerRequest::new(Method::GET, "/"), chain, abort_chain(ExceptionMapping::default()));
    assert_eq!(res.header("content-type"), Some("text/event-stream"));
    assert_eq!(res.body_str(), "data: one\n\ndata: {\"n\":2}\n\n");
}
