//! # CLI Module
//!
//! Command-line access to deployments described by YAML manifests
//! (see [`crate::manifest`]).
//!
//! ## Commands
//!
//! ### `inspect`
//!
//! Build the deployment and print the routing tree, every handler chain and
//! abort chain, and the score diagnostics of each resource:
//!
//! ```bash
//! brrtrest inspect --manifest widgets.yaml
//! brrtrest inspect --manifest widgets.yaml --format json
//! ```
//!
//! ### `check`
//!
//! Build the deployment and report success or the first build error:
//!
//! ```bash
//! brrtrest check --manifest widgets.yaml
//! ```
//!
//! ### `request`
//!
//! Run one in-process request through the deployment and print the response:
//!
//! ```bash
//! brrtrest request --manifest widgets.yaml GET /api/widgets/7 -H "Accept: application/json"
//! ```

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{load_deployment, render_json, render_text, run_cli, Cli, Commands, OutputFormat};
