use crate::error::DeploymentError;
use regex::Regex;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Regex used for `{name}` variables without an explicit pattern.
const DEFAULT_REGEX: &str = "[^/]+?";

/// Kind of a parsed template component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    /// Literal text, matched verbatim.
    Literal,
    /// `{name}`: one path segment.
    DefaultRegex,
    /// `{name: pattern}`: caller supplied regex.
    CustomRegex,
}

/// One component of a [`URITemplate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateComponent {
    pub kind: ComponentType,
    /// Literal text for [`ComponentType::Literal`], regex otherwise.
    pub text: String,
    /// Variable name, `None` for literals.
    pub name: Option<Arc<str>>,
}

/// Captured values of a successful match, borrowed from the matched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMatch<'p> {
    /// Raw (still percent-encoded) variable values in component order.
    pub values: SmallVec<[&'p str; 8]>,
    /// Unmatched tail of the path for prefix templates, empty otherwise.
    pub remaining: &'p str,
}

/// A parsed, compiled path template.
#[derive(Clone)]
pub struct URITemplate {
    template: String,
    prefix: bool,
    components: Vec<TemplateComponent>,
    literal_char_count: usize,
    capture_group_count: usize,
    complex_expressions: usize,
    matcher: Regex,
    group_names: Vec<String>,
}

impl URITemplate {
    /// Parse `template`. A `prefix` template matches the start of a path and hands
    /// the rest on (class paths and sub-resource locators).
    pub fn new(template: &str, prefix: bool) -> Result<Self, DeploymentError> {
        let normalized = normalize(template);
        let components = parse_components(&normalized)?;

        let mut literal_char_count = 0;
        let mut capture_group_count = 0;
        let mut complex_expressions = 0;
        for c in &components {
            match c.kind {
                ComponentType::Literal => literal_char_count += c.text.chars().count(),
                ComponentType::DefaultRegex => capture_group_count += 1,
                ComponentType::CustomRegex => {
                    capture_group_count += 1;
                    complex_expressions += 1;
                }
            }
        }

        let matcher = compile(&normalized, &components, prefix)?;
        let group_names = (0..capture_group_count).map(|i| format!("p{i}")).collect();
        Ok(Self {
            template: normalized,
            prefix,
            components,
            literal_char_count,
            capture_group_count,
            complex_expressions,
            matcher,
            group_names,
        })
    }

    #[inline]
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    #[inline]
    #[must_use]
    pub fn is_prefix(&self) -> bool {
        self.prefix
    }

    #[inline]
    #[must_use]
    pub fn components(&self) -> &[TemplateComponent] {
        &self.components
    }

    #[inline]
    #[must_use]
    pub fn literal_char_count(&self) -> usize {
        self.literal_char_count
    }

    #[inline]
    #[must_use]
    pub fn capture_group_count(&self) -> usize {
        self.capture_group_count
    }

    #[inline]
    #[must_use]
    pub fn complex_expressions(&self) -> usize {
        self.complex_expressions
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.template == "/"
    }

    /// Number of named variables, used to presize per-request parameter storage.
    #[must_use]
    pub fn count_path_param_names(&self) -> usize {
        self.components.iter().filter(|c| c.name.is_some()).count()
    }

    /// Variable names in component order.
    pub fn param_names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.components.iter().filter_map(|c| c.name.as_ref())
    }

    /// Precedence without the textual tie-break. `Less` means `self` is tried first.
    #[must_use]
    pub fn specificity_cmp(&self, other: &Self) -> Ordering {
        other
            .literal_char_count
            .cmp(&self.literal_char_count)
            .then_with(|| other.capture_group_count.cmp(&self.capture_group_count))
            .then_with(|| other.complex_expressions.cmp(&self.complex_expressions))
    }

    /// Match `path` against this template.
    #[must_use]
    pub fn match_path<'p>(&self, path: &'p str) -> Option<TemplateMatch<'p>> {
        let caps = self.matcher.captures(path)?;
        let mut values = SmallVec::new();
        for name in &self.group_names {
            values.push(caps.name(name).map_or("", |m| m.as_str()));
        }
        let remaining = caps.name("rest").map_or("", |m| m.as_str());
        Some(TemplateMatch { values, remaining })
    }
}

fn normalize(template: &str) -> String {
    let trimmed = template.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return "/".to_string();
    }
    let mut out = String::with_capacity(trimmed.len() + 1);
    if !trimmed.starts_with('/') {
        out.push('/');
    }
    out.push_str(trimmed);
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

fn parse_components(template: &str) -> Result<Vec<TemplateComponent>, DeploymentError> {
    let invalid = |reason: &str| DeploymentError::InvalidTemplate {
        template: template.to_string(),
        reason: reason.to_string(),
    };

    let mut components = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c == '}' {
            return Err(invalid("unbalanced '}'"));
        }
        if c != '{' {
            literal.push(c);
            continue;
        }
        if !literal.is_empty() {
            components.push(TemplateComponent {
                kind: ComponentType::Literal,
                text: std::mem::take(&mut literal),
                name: None,
            });
        }

        // braces may nest inside a custom regex, e.g. {code: [0-9]{3}}
        let mut depth = 1;
        let mut body = String::new();
        for c in chars.by_ref() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            body.push(c);
        }
        if depth != 0 {
            return Err(invalid("unterminated '{'"));
        }

        let (name, regex) = match body.split_once(':') {
            Some((name, regex)) => (name.trim(), Some(regex.trim())),
            None => (body.trim(), None),
        };
        if name.is_empty() {
            return Err(invalid("empty variable name"));
        }
        let component = match regex {
            Some(regex) if !regex.is_empty() => TemplateComponent {
                kind: ComponentType::CustomRegex,
                text: regex.to_string(),
                name: Some(Arc::from(name)),
            },
            _ => TemplateComponent {
                kind: ComponentType::DefaultRegex,
                text: DEFAULT_REGEX.to_string(),
                name: Some(Arc::from(name)),
            },
        };
        components.push(component);
    }

    if !literal.is_empty() {
        components.push(TemplateComponent {
            kind: ComponentType::Literal,
            text: literal,
            name: None,
        });
    }
    Ok(components)
}

fn root_matcher(template: &str, prefix: bool) -> Result<Regex, DeploymentError> {
    let pattern = if prefix { r"^(?P<rest>/.*)?$" } else { r"^/?$" };
    Regex::new(pattern).map_err(|e| DeploymentError::InvalidTemplate {
        template: template.to_string(),
        reason: e.to_string(),
    })
}

fn compile(
    template: &str,
    components: &[TemplateComponent],
    prefix: bool,
) -> Result<Regex, DeploymentError> {
    if template == "/" {
        return root_matcher(template, prefix);
    }

    let mut pattern = String::with_capacity(template.len() * 2 + 16);
    pattern.push('^');
    let mut group = 0;
    for c in components {
        match c.kind {
            ComponentType::Literal => pattern.push_str(&regex::escape(&c.text)),
            ComponentType::DefaultRegex | ComponentType::CustomRegex => {
                pattern.push_str(&format!("(?P<p{group}>{})", c.text));
                group += 1;
            }
        }
    }
    if prefix {
        pattern.push_str("(?P<rest>/.*)?$");
    } else {
        pattern.push_str("/?$");
    }

    Regex::new(&pattern).map_err(|e| DeploymentError::InvalidTemplate {
        template: template.to_string(),
        reason: e.to_string(),
    })
}

impl PartialEq for URITemplate {
    fn eq(&self, other: &Self) -> bool {
        self.template == other.template && self.prefix == other.prefix
    }
}

impl Eq for URITemplate {}

impl Hash for URITemplate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.template.hash(state);
        self.prefix.hash(state);
    }
}

impl PartialOrd for URITemplate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for URITemplate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.specificity_cmp(other)
            .then_with(|| self.template.cmp(&other.template))
            .then_with(|| self.prefix.cmp(&other.prefix))
    }
}

impl fmt::Debug for URITemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("URITemplate")
            .field("template", &self.template)
            .field("prefix", &self.prefix)
            .field("literal_char_count", &self.literal_char_count)
            .field("capture_group_count", &self.capture_group_count)
            .field("complex_expressions", &self.complex_expressions)
            .finish()
    }
}

impl fmt::Display for URITemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}
