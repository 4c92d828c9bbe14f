use crate::context::ServerRequest;
use crate::deployment::{Category, Deployment, RuntimeDeploymentManager, RuntimeResource};
use crate::manifest::Manifest;
use crate::spi::ServerRestHandler;
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use http::Method;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Command-line interface for brrtrest
#[derive(Parser)]
#[command(name = "brrtrest")]
#[command(about = "Build and inspect REST deployments", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format of `inspect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the routing tree and every handler chain with its score
    Inspect {
        /// Path to the deployment manifest (YAML)
        #[arg(short, long, env = "BRRTR_MANIFEST")]
        manifest: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Build the deployment and report errors only
    Check {
        /// Path to the deployment manifest (YAML)
        #[arg(short, long, env = "BRRTR_MANIFEST")]
        manifest: PathBuf,
    },
    /// Send one request through the deployment and print the response
    Request {
        /// Path to the deployment manifest (YAML)
        #[arg(short, long, env = "BRRTR_MANIFEST")]
        manifest: PathBuf,

        /// HTTP method
        method: String,

        /// Request target, e.g. `/api/widgets/7?verbose=true`
        target: String,

        /// Request header as `Name: value` (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body
        #[arg(short, long)]
        body: Option<String>,
    },
}

/// Load a manifest and build its deployment.
pub fn load_deployment(manifest: &Path) -> Result<Deployment> {
    let info = Manifest::from_path(manifest)?
        .into_deployment_info()
        .with_context(|| format!("invalid manifest {}", manifest.display()))?;
    RuntimeDeploymentManager::deploy(info).with_context(|| format!("failed to deploy {}", manifest.display()))
}

pub fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Inspect { manifest, format } => {
            let deployment = load_deployment(&manifest)?;
            let out = match format {
                OutputFormat::Text => render_text(&deployment),
                OutputFormat::Json => serde_json::to_string_pretty(&render_json(&deployment))?,
            };
            println!("{out}");
            Ok(())
        }
        Commands::Check { manifest } => {
            let deployment = load_deployment(&manifest)?;
            info!(manifest = %manifest.display(), resources = deployment.resources().len(), "Deployment OK");
            println!("ok: {} resources", deployment.resources().len());
            Ok(())
        }
        Commands::Request {
            manifest,
            method,
            target,
            headers,
            body,
        } => {
            let deployment = load_deployment(&manifest)?;
            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|_| anyhow!("invalid HTTP method '{method}'"))?;
            let mut request = ServerRequest::new(method, &target);
            for header in &headers {
                let Some((name, value)) = header.split_once(':') else {
                    bail!("header '{header}' is not in 'Name: value' form");
                };
                request = request.with_header(name.trim(), value.trim());
            }
            if let Some(body) = body {
                request = request.with_body(body);
            }
            let response = deployment.handle(request);
            println!("{}", response.status);
            for (name, value) in &response.headers {
                println!("{name}: {value}");
            }
            println!();
            println!("{}", response.body_str());
            Ok(())
        }
    }
}

fn chain_kinds(chain: &[Arc<dyn ServerRestHandler>]) -> Vec<String> {
    chain.iter().map(|h| h.kind().to_string()).collect()
}

fn class_template_of(resource: &RuntimeResource) -> &str {
    resource.class_path.as_ref().map_or("/", |t| t.template())
}

fn method_label(resource: &RuntimeResource) -> String {
    resource
        .http_method
        .as_ref()
        .map_or_else(|| "LOCATOR".to_string(), ToString::to_string)
}

/// Human-readable routing tree.
#[must_use]
pub fn render_text(deployment: &Deployment) -> String {
    let mut lines = vec![format!("prefix: \"{}\"", deployment.prefix())];
    if !deployment.pre_match_handlers().is_empty() {
        lines.push(format!("pre-match: {}", chain_kinds(deployment.pre_match_handlers()).join(" -> ")));
    }
    lines.push(format!("abort: {}", chain_kinds(deployment.abort_chain()).join(" -> ")));
    for entry in deployment.class_mapper().entries() {
        lines.push(format!("{} (max params {})", entry.template.template(), entry.value.max_params));
        for resource in deployment
            .resources()
            .iter()
            .filter(|r| class_template_of(r) == entry.template.template())
        {
            lines.push(format!(
                "  {} {} -> {} [score {}/100]",
                method_label(resource),
                resource.path.as_ref().map_or("/", |t| t.template()),
                resource.qualified_name(),
                resource.score.total()
            ));
            lines.push(format!("    chain: {}", chain_kinds(&resource.handler_chain).join(" -> ")));
            lines.push(format!("    abort: {}", chain_kinds(&resource.abort_chain).join(" -> ")));
            for category in Category::ALL {
                for diagnostic in resource.score.get(category) {
                    lines.push(format!("    {category:?}: {diagnostic} ({})", diagnostic.score()));
                }
            }
        }
    }
    lines.join("\n")
}

/// Machine-readable routing tree.
#[must_use]
pub fn render_json(deployment: &Deployment) -> Value {
    let classes: Vec<Value> = deployment
        .class_mapper()
        .entries()
        .iter()
        .map(|entry| {
            let resources: Vec<Value> = deployment
                .resources()
                .iter()
                .filter(|r| class_template_of(r) == entry.template.template())
                .map(|r| {
                    json!({
                        "method": method_label(r),
                        "path": r.path.as_ref().map(|t| t.template()),
                        "resource": r.qualified_name(),
                        "chain": chain_kinds(&r.handler_chain),
                        "abort_chain": chain_kinds(&r.abort_chain),
                        "path_parameters": r.path_parameter_indexes,
                        "score": r.score.total(),
                        "diagnostics": r.score,
                    })
                })
                .collect();
            json!({
                "template": entry.template.template(),
                "max_params": entry.value.max_params,
                "resources": resources,
            })
        })
        .collect();
    json!({
        "prefix": deployment.prefix(),
        "abort_chain": chain_kinds(deployment.abort_chain()),
        "classes": classes,
    })
}
