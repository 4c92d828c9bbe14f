mod common;

use brrtrest::context::ServerRequest;
use brrtrest::deployment::DeploymentInfo;
use brrtrest::error::HandlerError;
use brrtrest::mapping::RequestMapper;
use brrtrest::model::{MethodParameter, ServerResourceMethod, TypeDescriptor};
use brrtrest::runtime_config::RuntimeConfig;
use brrtrest::serialisers::{MessageBodyWriter, ANY_TYPE, PRIORITY_USER};
use brrtrest::spi::{EndpointResult, Instance, SubResource};
use brrtrest::template::URITemplate;
use common::{class, constant, deploy, echo};
use http::Method;
use mime::Mime;
use serde_json::{json, Value};
use std::sync::Arc;

fn template(t: &str) -> URITemplate {
    URITemplate::new(t, false).unwrap()
}

#[test]
fn test_more_literal_templates_come_first() {
    let mapper = RequestMapper::new(vec![
        (template("/{x}"), "var"),
        (template("/zoo/{id}"), "zoo-id"),
        (template("/zoo/animals"), "animals"),
        (template("/zoo/{id}/{sub}"), "zoo-two"),
    ]);
    let order: Vec<&str> = mapper.entries().iter().map(|e| e.value).collect();
    assert_eq!(order, vec!["animals", "zoo-two", "zoo-id", "var"]);
    assert_eq!(mapper.map("/zoo/animals").unwrap().value, &"animals");
    assert_eq!(mapper.map("/zoo/7").unwrap().value, &"zoo-id");
}

#[test]
fn test_equal_specificity_keeps_declaration_order() {
    let mapper = RequestMapper::new(vec![
        (template("/b/{y}"), "b"),
        (template("/a/{x}"), "a"),
        (template("/c/{z}"), "c"),
    ]);
    let order: Vec<&str> = mapper.entries().iter().map(|e| e.value).collect();
    assert_eq!(order, vec!["b", "a", "c"]);
}

fn items_class() -> DeploymentInfo {
    let locator: Arc<dyn brrtrest::spi::EndpointInvoker> = Arc::new(|_: Option<&Instance>, _: &[Value]| {
        Ok::<_, HandlerError>(EndpointResult::SubResource(SubResource {
            class_name: "Detail".to_string(),
            instance: Arc::new(()),
        }))
    });
    let items = class("Items", Some("/items"))
        .with_method(
            ServerResourceMethod::new("get", Some(Method::GET), Some("{id}"), echo("get"))
                .with_parameter(MethodParameter::path("id", TypeDescriptor::class("Long")))
                .with_produces(vec![mime::APPLICATION_JSON]),
        )
        .with_method(ServerResourceMethod::new("locate", None, Some("{id}"), locator));
    let detail = class("Detail", None).with_method(
        ServerResourceMethod::new("any", Some(Method::POST), None, constant(json!("from-detail")))
            .with_produces(vec![mime::APPLICATION_JSON]),
    );
    DeploymentInfo::new()
        .with_resource_class(items)
        .with_locatable_resource_class(detail)
}

#[test]
fn test_method_resource_wins_over_locator() {
    let deployment = deploy(items_class());

    let res = deployment.handle(ServerRequest::new(Method::GET, "/items/5"));
    assert_eq!(res.status, 200);
    assert_eq!(res.json(), Some(json!({"method": "get", "args": [5]})));

    // No POST method on Items itself: the locator takes over.
    let res = deployment.handle(ServerRequest::new(Method::POST, "/items/5"));
    assert_eq!(res.status, 200);
    assert_eq!(res.json(), Some(json!("from-detail")));
}

#[test]
fn test_locator_dispatches_remaining_path() {
    let deployment = deploy(items_class());
    let res = deployment.handle(ServerRequest::new(Method::POST, "/items/5/"));
    assert_eq!(res.status, 200);

    // Detail only answers POST at its root.
    let res = deployment.handle(ServerRequest::new(Method::PUT, "/items/5"));
    assert_eq!(res.status, 405);
    assert_eq!(res.header("allow"), Some("OPTIONS, POST"));

    let res = deployment.handle(ServerRequest::new(Method::POST, "/items/5/more"));
    assert_eq!(res.status, 404);
}

#[test]
fn test_sub_resource_method_gets_only_its_own_arguments() {
    let locator: Arc<dyn brrtrest::spi::EndpointInvoker> = Arc::new(|_: Option<&Instance>, args: &[Value]| {
        if args != [json!(5)] {
            return Err(HandlerError::Internal(format!("locator saw {args:?}")));
        }
        Ok::<_, HandlerError>(EndpointResult::SubResource(SubResource {
            class_name: "Detail".to_string(),
            instance: Arc::new(()),
        }))
    });
    let items = class("Items", Some("/items")).with_method(
        ServerResourceMethod::new("locate", None, Some("{id}"), locator)
            .with_parameter(MethodParameter::path("id", TypeDescriptor::class("Long"))),
    );
    let detail = class("Detail", None)
        .with_method(
            ServerResourceMethod::new("any", Some(Method::POST), None, echo("any"))
                .with_produces(vec![mime::APPLICATION_JSON]),
        )
        .with_method(
            ServerResourceMethod::new("named", Some(Method::GET), None, echo("named"))
                .with_parameter(MethodParameter::query("q", TypeDescriptor::class("String")))
                .with_produces(vec![mime::APPLICATION_JSON]),
        );
    let deployment = deploy(
        DeploymentInfo::new()
            .with_resource_class(items)
            .with_locatable_resource_class(detail),
    );

    let res = deployment.handle(ServerRequest::new(Method::POST, "/items/5"));
    assert_eq!(res.status, 200);
    assert_eq!(res.json(), Some(json!({"method": "any", "args": []})));

    let res = deployment.handle(ServerRequest::new(Method::GET, "/items/5?q=x"));
    assert_eq!(res.json(), Some(json!({"method": "named", "args": ["x"]})));
}

#[test]
fn test_form_parameters_and_body_together() {
    let post = ServerResourceMethod::new("submit", Some(Method::POST), None, echo("submit"))
        .with_parameter(MethodParameter::form("a", TypeDescriptor::class("String")))
        .with_parameter(MethodParameter::body(TypeDescriptor::class("String")))
        .with_produces(vec![mime::APPLICATION_JSON]);
    let deployment = deploy(DeploymentInfo::new().with_resource_class(class("Forms", Some("/f")).with_method(post)));

    let res = deployment.handle(
        ServerRequest::new(Method::POST, "/f")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("a=1"),
    );
    assert_eq!(res.status, 200);
    assert_eq!(res.json(), Some(json!({"method": "submit", "args": ["1", "a=1"]})));
}

struct XmlWriter;

impl MessageBodyWriter for XmlWriter {
    fn name(&self) -> &str {
        "xml"
    }

    fn is_writeable(&self, _entity: &Value, _media_type: &Mime) -> bool {
        true
    }

    fn write_to(&self, entity: &Value, _media_type: &Mime) -> Result<Vec<u8>, HandlerError> {
        Ok(format!("<value>{entity}</value>").into_bytes())
    }
}

#[test]
fn test_accept_selects_between_resources_sharing_a_template() {
    let xml: Mime = "application/xml".parse().unwrap();
    let resource = class("Shared", Some("/x"))
        .with_method(
            ServerResourceMethod::new("json", Some(Method::GET), None, constant(json!("A")))
                .with_produces(vec![mime::APPLICATION_JSON]),
        )
        .with_method(
            ServerResourceMethod::new("xml", Some(Method::GET), None, constant(json!("B")))
                .with_produces(vec![xml.clone()]),
        );
    let mut info = DeploymentInfo::new().with_resource_class(resource);
    info.serialisers_mut()
        .add_writer(ANY_TYPE, vec![xml], PRIORITY_USER, Arc::new(XmlWriter));
    let deployment = deploy(info);

    for _ in 0..3 {
        let res = deployment.handle(ServerRequest::new(Method::GET, "/x").with_header("Accept", "application/xml"));
        assert_eq!(res.status, 200);
        assert_eq!(res.body_str(), "<value>\"B\"</value>");
        assert_eq!(res.header("content-type"), Some("application/xml"));

        let res = deployment.handle(ServerRequest::new(Method::GET, "/x").with_header("Accept", "application/json"));
        assert_eq!(res.status, 200);
        assert_eq!(res.json(), Some(json!("A")));
    }

    let res = deployment.handle(ServerRequest::new(Method::GET, "/x").with_header("Accept", "image/png"));
    assert_eq!(res.status, 406);
}

fn widgets() -> DeploymentInfo {
    DeploymentInfo::new().with_resource_class(
        class("Widgets", Some("/widgets"))
            .with_method(
                ServerResourceMethod::new("list", Some(Method::GET), None, constant(json!([])))
                    .with_produces(vec![mime::APPLICATION_JSON]),
            )
            .with_method(
                ServerResourceMethod::new("get", Some(Method::GET), Some("{id}"), echo("get"))
                    .with_parameter(MethodParameter::path("id", TypeDescriptor::class("Long")))
                    .with_produces(vec![mime::APPLICATION_JSON]),
            ),
    )
}

#[test]
fn test_head_falls_back_to_get() {
    let deployment = deploy(widgets());
    let res = deployment.handle(ServerRequest::new(Method::HEAD, "/widgets"));
    assert_eq!(res.status, 200);
}

#[test]
fn test_options_and_method_not_allowed() {
    let deployment = deploy(widgets());

    let res = deployment.handle(ServerRequest::new(Method::OPTIONS, "/widgets/3"));
    assert_eq!(res.status, 200);
    assert_eq!(res.header("allow"), Some("GET, HEAD, OPTIONS"));

    let res = deployment.handle(ServerRequest::new(Method::DELETE, "/widgets/3"));
    assert_eq!(res.status, 405);
    assert_eq!(res.header("allow"), Some("GET, HEAD, OPTIONS"));

    let res = deployment.handle(ServerRequest::new(Method::GET, "/gadgets"));
    assert_eq!(res.status, 404);
}

#[test]
fn test_unconvertible_path_parameter_is_not_found() {
    let deployment = deploy(widgets());
    let res = deployment.handle(ServerRequest::new(Method::GET, "/widgets/abc"));
    assert_eq!(res.status, 404);
}

#[test]
fn test_deployment_prefix_is_stripped() {
    let config = RuntimeConfig {
        root_path: Some("/api/".to_string()),
        application_path: Some("v1".to_string()),
        ..RuntimeConfig::default()
    };
    let deployment = deploy(widgets().with_config(config));
    assert_eq!(deployment.prefix(), "/api/v1");

    let res = deployment.handle(ServerRequest::new(Method::GET, "/api/v1/widgets/9"));
    assert_eq!(res.status, 200);
    assert_eq!(res.json(), Some(json!({"method": "get", "args": [9]})));

    assert_eq!(deployment.handle(ServerRequest::new(Method::GET, "/widgets/9")).status, 404);
    assert_eq!(deployment.handle(ServerRequest::new(Method::GET, "/api/v1x/widgets")).status, 404);
}

#[test]
fn test_matrix_parameters_ignored_for_routing() {
    let deployment = deploy(widgets());
    let res = deployment.handle(ServerRequest::new(Method::GET, "/widgets;color=red/4"));
    assert_eq!(res.status, 200);
    assert_eq!(res.json(), Some(json!({"method": "get", "args": [4]})));
}
