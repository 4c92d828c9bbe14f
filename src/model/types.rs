use crate::error::DeploymentError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Names with runtime meaning when they appear in a [`TypeDescriptor`].
pub mod names {
    pub const OBJECT: &str = "Object";
    pub const STRING: &str = "String";
    pub const RESPONSE: &str = "Response";
    pub const REST_RESPONSE: &str = "RestResponse";
    pub const COMPLETION_STAGE: &str = "CompletionStage";
    pub const UNI: &str = "Uni";
    pub const MULTI: &str = "Multi";
    pub const ASYNC_FILE: &str = "AsyncFile";
    pub const LIST: &str = "List";
    pub const SET: &str = "Set";
    pub const SORTED_SET: &str = "SortedSet";
    pub const OPTIONAL: &str = "Optional";
    pub const BYTES: &str = "byte[]";
}

/// Static description of a declared (possibly generic) type.
///
/// Replaces runtime reflection: resource metadata carries these descriptors and
/// deployment inspects them to pick converters and writers.
///
/// Textual form: `String`, `List<Widget>`, `Optional<? extends Number>`,
/// `Map<String, List<Long>>`, `void`. A single upper-case letter (`T`) is a type
/// variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Class(String),
    Parameterized {
        raw: String,
        args: Vec<TypeDescriptor>,
    },
    Wildcard {
        upper: Vec<TypeDescriptor>,
        lower: Vec<TypeDescriptor>,
    },
    Variable(String),
    Void,
}

impl TypeDescriptor {
    pub fn class(name: impl Into<String>) -> Self {
        Self::Class(name.into())
    }

    pub fn parameterized(raw: impl Into<String>, args: Vec<TypeDescriptor>) -> Self {
        Self::Parameterized {
            raw: raw.into(),
            args,
        }
    }

    /// Raw class name, `None` for wildcards, variables and `void`.
    #[must_use]
    pub fn raw_name(&self) -> Option<&str> {
        match self {
            Self::Class(name) => Some(name),
            Self::Parameterized { raw, .. } => Some(raw),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_raw(&self, name: &str) -> bool {
        self.raw_name() == Some(name)
    }

    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    #[must_use]
    pub fn type_arguments(&self) -> &[TypeDescriptor] {
        match self {
            Self::Parameterized { args, .. } => args,
            _ => &[],
        }
    }

    /// Strip one async wrapper (`CompletionStage<T>`, `Uni<T>`) if present.
    #[must_use]
    pub fn unwrap_async(&self) -> &TypeDescriptor {
        match self {
            Self::Parameterized { raw, args }
                if (raw == names::COMPLETION_STAGE || raw == names::UNI) && args.len() == 1 =>
            {
                &args[0]
            }
            _ => self,
        }
    }

    /// The entity type a method effectively returns: async wrappers removed and
    /// `RestResponse<T>` unwrapped to `T`. A bare `Response` stays as is.
    #[must_use]
    pub fn effective_return_type(&self) -> &TypeDescriptor {
        let inner = self.unwrap_async();
        match inner {
            Self::Parameterized { raw, args } if raw == names::REST_RESPONSE && args.len() == 1 => {
                &args[0]
            }
            _ => inner,
        }
    }

    /// Whether a writer can be chosen for this type without seeing the entity.
    #[must_use]
    pub fn is_statically_resolvable(&self) -> bool {
        match self {
            Self::Class(name) => name != names::OBJECT && name != names::RESPONSE,
            Self::Parameterized { raw, args } => {
                raw != names::RESPONSE && args.iter().all(Self::is_statically_resolvable)
            }
            Self::Wildcard { .. } | Self::Variable(_) | Self::Void => false,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, types: &[TypeDescriptor], sep: &str) -> fmt::Result {
            for (i, t) in types.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{t}")?;
            }
            Ok(())
        }
        match self {
            Self::Class(name) | Self::Variable(name) => f.write_str(name),
            Self::Parameterized { raw, args } => {
                write!(f, "{raw}<")?;
                join(f, args, ", ")?;
                f.write_str(">")
            }
            Self::Wildcard { upper, lower } => {
                f.write_str("?")?;
                if !upper.is_empty() {
                    f.write_str(" extends ")?;
                    join(f, upper, " & ")?;
                }
                if !lower.is_empty() {
                    f.write_str(" super ")?;
                    join(f, lower, " & ")?;
                }
                Ok(())
            }
            Self::Void => f.write_str("void"),
        }
    }
}

impl FromStr for TypeDescriptor {
    type Err = DeploymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser { src: s, pos: 0 };
        let parsed = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos != s.len() {
            return Err(DeploymentError::InvalidType(s.to_string()));
        }
        Ok(parsed)
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn err(&self) -> DeploymentError {
        DeploymentError::InvalidType(self.src.to_string())
    }

    fn skip_ws(&mut self) {
        while self.src[self.pos..].starts_with(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.src[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<&str, DeploymentError> {
        self.skip_ws();
        let start = self.pos;
        let rest = &self.src[start..];
        let len = rest
            .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '.' | '$' | '[' | ']')))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.err());
        }
        self.pos += len;
        Ok(&self.src[start..start + len])
    }

    fn bounds(&mut self) -> Result<Vec<TypeDescriptor>, DeploymentError> {
        let mut out = vec![self.parse_type()?];
        while self.eat("&") {
            out.push(self.parse_type()?);
        }
        Ok(out)
    }

    fn parse_type(&mut self) -> Result<TypeDescriptor, DeploymentError> {
        if self.eat("?") {
            let mut upper = Vec::new();
            let mut lower = Vec::new();
            if self.eat("extends") {
                upper = self.bounds()?;
            }
            if self.eat("super") {
                lower = self.bounds()?;
            }
            return Ok(TypeDescriptor::Wildcard { upper, lower });
        }

        let name = self.ident()?.to_string();
        if self.eat("<") {
            let mut args = vec![self.parse_type()?];
            while self.eat(",") {
                args.push(self.parse_type()?);
            }
            if !self.eat(">") {
                return Err(self.err());
            }
            return Ok(TypeDescriptor::Parameterized { raw: name, args });
        }

        Ok(match name.as_str() {
            "void" => TypeDescriptor::Void,
            n if n.len() == 1 && n.chars().all(|c| c.is_ascii_uppercase()) => {
                TypeDescriptor::Variable(name)
            }
            _ => TypeDescriptor::Class(name),
        })
    }
}

impl Serialize for TypeDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TypeDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_generics() {
        let t: TypeDescriptor = "Map<String, List<Long>>".parse().unwrap();
        assert_eq!(
            t,
            TypeDescriptor::parameterized(
                "Map",
                vec![
                    TypeDescriptor::class("String"),
                    TypeDescriptor::parameterized("List", vec![TypeDescriptor::class("Long")]),
                ]
            )
        );
        assert_eq!(t.to_string(), "Map<String, List<Long>>");
    }

    #[test]
    fn test_parse_wildcards_and_variables() {
        let t: TypeDescriptor = "Optional<? extends Number>".parse().unwrap();
        assert_eq!(
            t.type_arguments()[0],
            TypeDescriptor::Wildcard {
                upper: vec![TypeDescriptor::class("Number")],
                lower: vec![],
            }
        );
        assert_eq!("T".parse::<TypeDescriptor>().unwrap(), TypeDescriptor::Variable("T".into()));
        assert!("void".parse::<TypeDescriptor>().unwrap().is_void());
        assert!("List<".parse::<TypeDescriptor>().is_err());
        assert!("List<String>>".parse::<TypeDescriptor>().is_err());
    }

    #[test]
    fn test_effective_return_type() {
        let t: TypeDescriptor = "Uni<RestResponse<Widget>>".parse().unwrap();
        assert_eq!(t.effective_return_type(), &TypeDescriptor::class("Widget"));
        let r: TypeDescriptor = "CompletionStage<Response>".parse().unwrap();
        assert!(!r.effective_return_type().is_statically_resolvable());
        assert!("List<Widget>".parse::<TypeDescriptor>().unwrap().is_statically_resolvable());
        assert!(!"List<T>".parse::<TypeDescriptor>().unwrap().is_statically_resolvable());
    }
}
