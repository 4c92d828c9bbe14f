//! # URI Template Module
//!
//! Parses JAX-RS style path templates (`/widgets/{id}`, `/files/{name: .+}`) into
//! literal, default-regex and custom-regex components, compiles a matcher for each
//! template and defines the precedence order used by every routing table:
//!
//! 1. more literal characters first
//! 2. then more capture groups
//! 3. then more custom-regex expressions
//! 4. then the template text, so distinct templates never compare equal
//!
//! Routing tables sort with [`URITemplate::specificity_cmp`] (steps 1-3 only) using a
//! stable sort, so templates of equal specificity keep their declaration order.

mod uri_template;

#[cfg(test)]
mod tests;

pub use uri_template::{ComponentType, TemplateComponent, TemplateMatch, URITemplate};
