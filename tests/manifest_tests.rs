mod common;

use brrtrest::cli::load_deployment;
use brrtrest::context::ServerRequest;
use brrtrest::deployment::RuntimeDeploymentManager;
use brrtrest::error::DeploymentError;
use brrtrest::manifest::{Manifest, FILTERS_HEADER};
use brrtrest::spi::HandlerKind;
use common::{count, init_tracing};
use http::Method;
use serde_json::json;
use std::io::Write;

const SHOP: &str = r#"
config:
  root_path: /api
resources:
  - class: Widgets
    path: /widgets
    methods:
      - name: get
        method: GET
        path: "{id}"
        produces: [application/json]
        bindings: [audited]
        params:
          - { name: id, source: path, type: Long }
          - { name: verbose, source: query, type: boolean, default: "false" }
      - name: list
        method: GET
        produces: [application/json]
      - name: parts
        path: "{id}/parts"
        locates: Parts
locatables:
  - class: Parts
    methods:
      - { name: list, method: GET, produces: [application/json] }
filters:
  - { name: outer, kind: response, priority: 10 }
  - { name: inner, kind: response, priority: 5 }
  - { name: audit, kind: response, priority: 7, bindings: [audited] }
  - { name: trace, kind: request }
"#;

fn shop() -> brrtrest::Deployment {
    init_tracing();
    let info = Manifest::from_yaml_str(SHOP).unwrap().into_deployment_info().unwrap();
    RuntimeDeploymentManager::deploy(info).unwrap()
}

#[test]
fn test_manifest_methods_echo_arguments() {
    let deployment = shop();
    assert_eq!(deployment.prefix(), "/api");

    let res = deployment.handle(ServerRequest::new(Method::GET, "/api/widgets/3?verbose=true"));
    assert_eq!(res.status, 200);
    assert_eq!(
        res.json(),
        Some(json!({"resource": "Widgets#get", "args": {"id": 3, "verbose": true}}))
    );

    let res = deployment.handle(ServerRequest::new(Method::GET, "/api/widgets/4"));
    assert_eq!(
        res.json(),
        Some(json!({"resource": "Widgets#get", "args": {"id": 4, "verbose": false}}))
    );
}

#[test]
fn test_manifest_filters_follow_priority_and_bindings() {
    let deployment = shop();

    let res = deployment.handle(ServerRequest::new(Method::GET, "/api/widgets/3"));
    assert_eq!(res.header(FILTERS_HEADER), Some("inner, audit, outer"));

    let res = deployment.handle(ServerRequest::new(Method::GET, "/api/widgets"));
    assert_eq!(res.status, 200);
    assert_eq!(res.header(FILTERS_HEADER), Some("inner, outer"));

    // Errors answer through the abort chain, which carries the same filters.
    let res = deployment.handle(ServerRequest::new(Method::DELETE, "/api/widgets/3"));
    assert_eq!(res.status, 405);
    assert_eq!(res.header(FILTERS_HEADER), Some("inner, outer"));
}

#[test]
fn test_manifest_locator_reaches_locatable_class() {
    let deployment = shop();
    let res = deployment.handle(ServerRequest::new(Method::GET, "/api/widgets/3/parts"));
    assert_eq!(res.status, 200);
    assert_eq!(res.json(), Some(json!({"resource": "Parts#list", "args": {}})));

    let locator = deployment
        .resources()
        .iter()
        .find(|r| r.qualified_name() == "Widgets#parts")
        .unwrap();
    assert!(locator.http_method.is_none());
    assert_eq!(count(&locator.handler_chain, HandlerKind::ResourceLocator), 1);
    assert_eq!(count(&locator.handler_chain, HandlerKind::RequestFilter), 0);
}

#[test]
fn test_load_deployment_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SHOP.as_bytes()).unwrap();

    let deployment = load_deployment(file.path()).unwrap();
    assert_eq!(deployment.resources().len(), 3);

    let missing = load_deployment(std::path::Path::new("/nonexistent/brrtrest.yaml"));
    assert!(missing.is_err());
}

#[test]
fn test_manifest_build_errors_surface() {
    let yaml = r#"
resources:
  - class: Broken
    path: /broken
    methods:
      - name: post
        method: POST
        params:
          - { source: body, type: String }
          - { name: other, source: body, type: String }
"#;
    let info = Manifest::from_yaml_str(yaml).unwrap().into_deployment_info().unwrap();
    match RuntimeDeploymentManager::deploy(info) {
        Err(DeploymentError::MultipleBodyParameters { method }) => assert_eq!(method, "Broken#post"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("two body parameters must not deploy"),
    }
}
