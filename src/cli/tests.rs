//! Unit tests for CLI commands

use crate::cli::{load_deployment, render_json, render_text, Cli, Commands, OutputFormat};
use clap::Parser;
use std::io::Write;

const MANIFEST: &str = r#"
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
        returns: Widget
        params:
          - { name: id, source: path, type: Long }
"#;

fn manifest_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_inspect_command_parses() {
    let cli = Cli::try_parse_from(["brrtrest", "inspect", "--manifest", "m.yaml", "--format", "json"]).unwrap();
    match cli.command {
        Commands::Inspect { manifest, format } => {
            assert_eq!(manifest.to_string_lossy(), "m.yaml");
            assert_eq!(format, OutputFormat::Json);
        }
        _ => panic!("Expected Inspect command"),
    }
}

#[test]
fn test_request_command_with_headers() {
    let cli = Cli::try_parse_from([
        "brrtrest",
        "request",
        "-m",
        "m.yaml",
        "GET",
        "/api/widgets/1",
        "-H",
        "Accept: application/json",
        "-H",
        "X-Trace: 1",
    ])
    .unwrap();
    match cli.command {
        Commands::Request {
            method,
            target,
            headers,
            body,
            ..
        } => {
            assert_eq!(method, "GET");
            assert_eq!(target, "/api/widgets/1");
            assert_eq!(headers.len(), 2);
            assert!(body.is_none());
        }
        _ => panic!("Expected Request command"),
    }
}

#[test]
fn test_all_commands_parse() {
    let commands = vec![
        vec!["brrtrest", "inspect", "--manifest", "m.yaml"],
        vec!["brrtrest", "check", "--manifest", "m.yaml"],
        vec!["brrtrest", "request", "--manifest", "m.yaml", "POST", "/x", "--body", "{}"],
    ];
    for args in commands {
        let cli = Cli::try_parse_from(&args);
        assert!(cli.is_ok(), "Failed to parse command: {:?}", args);
    }
}

#[test]
fn test_render_text_lists_chains() {
    let file = manifest_file(MANIFEST);
    let deployment = load_deployment(file.path()).unwrap();
    let text = render_text(&deployment);
    assert!(text.contains("prefix: \"/api\""));
    assert!(text.contains("/widgets (max params 1)"));
    assert!(text.contains("GET {id} -> Widgets#get") || text.contains("GET /{id} -> Widgets#get"));
    assert!(text.contains("Parameter -> Invocation"));
    assert!(text.contains("FixedProduces"));
}

#[test]
fn test_render_json_has_scores() {
    let file = manifest_file(MANIFEST);
    let deployment = load_deployment(file.path()).unwrap();
    let json = render_json(&deployment);
    assert_eq!(json["prefix"], "/api");
    let resource = &json["classes"][0]["resources"][0];
    assert_eq!(resource["resource"], "Widgets#get");
    assert_eq!(resource["path_parameters"]["id"], 0);
    assert!(resource["score"].as_u64().unwrap() <= 100);
}

#[test]
fn test_load_deployment_reports_build_errors() {
    let file = manifest_file(
        r#"
resources:
  - class: Broken
    path: /b
    methods:
      - name: post
        method: POST
        params:
          - { source: body, type: String }
          - { name: other, source: body, type: String }
"#,
    );
    let Err(err) = load_deployment(file.path()) else {
        panic!("two body parameters must not deploy");
    };
    assert!(format!("{err:#}").contains("more than one body parameter"));
}
