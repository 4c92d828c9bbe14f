use crate::error::HandlerError;
use crate::model::types::names;
use crate::model::TypeDescriptor;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Creates a fresh converter for one parameter.
pub type ConverterSupplier = Arc<dyn Fn() -> Box<dyn ParameterConverter> + Send + Sync>;

/// The element type of a generic container could not be determined.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot resolve element type of '{generic_type}': {reason}")]
pub struct ElementTypeError {
    pub generic_type: String,
    pub reason: String,
}

/// Converts an extracted raw value into the declared parameter type.
pub trait ParameterConverter: Send + Sync {
    fn convert(&self, value: Value) -> Result<Value, HandlerError>;

    /// Called at deployment when user converter providers exist.
    fn init(
        &mut self,
        _providers: &ParamConverterProviders,
        _raw: &TypeDescriptor,
        _generic: &TypeDescriptor,
    ) -> Result<(), ElementTypeError> {
        Ok(())
    }

    /// Containers holding at most one value, such as `Optional<T>`.
    fn is_for_single_object_container(&self) -> bool {
        false
    }
}

/// A user supplied string conversion.
pub trait ParamConverter: Send + Sync {
    fn from_string(&self, value: &str) -> Result<Value, HandlerError>;
}

impl<F> ParamConverter for F
where
    F: Fn(&str) -> Result<Value, HandlerError> + Send + Sync,
{
    fn from_string(&self, value: &str) -> Result<Value, HandlerError> {
        self(value)
    }
}

/// Offers converters for types it knows about.
pub trait ParamConverterProvider: Send + Sync {
    fn get_converter(&self, raw: &TypeDescriptor, generic: &TypeDescriptor) -> Option<Arc<dyn ParamConverter>>;
}

/// User converter providers, consulted in priority order.
#[derive(Clone, Default)]
pub struct ParamConverterProviders {
    providers: Vec<(i32, Arc<dyn ParamConverterProvider>)>,
}

impl ParamConverterProviders {
    pub fn add(&mut self, priority: i32, provider: Arc<dyn ParamConverterProvider>) {
        self.providers.push((priority, provider));
        self.providers.sort_by_key(|(p, _)| *p);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    #[must_use]
    pub fn find(&self, raw: &TypeDescriptor, generic: &TypeDescriptor) -> Option<Arc<dyn ParamConverter>> {
        self.providers
            .iter()
            .find_map(|(_, p)| p.get_converter(raw, generic))
    }
}

/// Concrete class of the single type argument of a container such as
/// `Optional<T>`: a class argument as is, a parameterized argument by its raw
/// type, an upper-bounded wildcard by its first bound.
pub fn resolve_element_type(generic: &TypeDescriptor) -> Result<TypeDescriptor, ElementTypeError> {
    let fail = |reason: &str| ElementTypeError {
        generic_type: generic.to_string(),
        reason: reason.to_string(),
    };
    let args = generic.type_arguments();
    if args.len() != 1 {
        return Err(fail("expected exactly one type argument"));
    }
    match &args[0] {
        TypeDescriptor::Class(_) => Ok(args[0].clone()),
        TypeDescriptor::Parameterized { raw, .. } => Ok(TypeDescriptor::Class(raw.clone())),
        TypeDescriptor::Wildcard { upper, lower } => {
            if !lower.is_empty() && !upper.is_empty() {
                return Err(fail("wildcards with both upper and lower bounds are not supported"));
            }
            if !lower.is_empty() {
                return Err(fail("lower-bounded wildcards are not supported"));
            }
            match upper.first() {
                None => Ok(TypeDescriptor::class(names::OBJECT)),
                Some(TypeDescriptor::Class(c)) => Ok(TypeDescriptor::Class(c.clone())),
                Some(TypeDescriptor::Parameterized { raw, .. }) => Ok(TypeDescriptor::Class(raw.clone())),
                Some(TypeDescriptor::Wildcard { .. }) => Err(fail("nested wildcards are not supported")),
                Some(_) => Err(fail("wildcard bound is not a class")),
            }
        }
        TypeDescriptor::Variable(_) => Err(fail("type variables cannot be resolved")),
        TypeDescriptor::Void => Err(fail("void is not a valid type argument")),
    }
}

/// Primitive and boxed scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Integer,
    Float,
    Boolean,
    Char,
}

impl ScalarKind {
    #[must_use]
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "int" | "Integer" | "long" | "Long" | "short" | "Short" | "byte" | "Byte" | "BigInteger" => {
                Some(Self::Integer)
            }
            "float" | "Float" | "double" | "Double" | "BigDecimal" => Some(Self::Float),
            "boolean" | "Boolean" => Some(Self::Boolean),
            "char" | "Character" => Some(Self::Char),
            _ => None,
        }
    }
}

/// Parses text into a number, boolean or character.
#[derive(Debug, Clone, Copy)]
pub struct ScalarConverter(pub ScalarKind);

impl ScalarConverter {
    fn convert_str(&self, s: &str) -> Result<Value, HandlerError> {
        let s = s.trim();
        let bad = || HandlerError::bad_request(format!("cannot convert '{s}' to {:?}", self.0));
        match self.0 {
            ScalarKind::Integer => s.parse::<i64>().map(Value::from).map_err(|_| bad()),
            ScalarKind::Float => s
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(bad),
            ScalarKind::Boolean => Ok(Value::Bool(s.eq_ignore_ascii_case("true"))),
            ScalarKind::Char => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::String(c.to_string())),
                    _ => Err(bad()),
                }
            }
        }
    }
}

impl ParameterConverter for ScalarConverter {
    fn convert(&self, value: Value) -> Result<Value, HandlerError> {
        match value {
            Value::String(s) => self.convert_str(&s),
            other => Ok(other),
        }
    }
}

/// Leaves the raw text untouched; stands in for types converted by user providers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughConverter;

impl ParameterConverter for PassThroughConverter {
    fn convert(&self, value: Value) -> Result<Value, HandlerError> {
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    List,
    Set,
    SortedSet,
}

/// Converts every element and applies set semantics where declared.
pub struct CollectionConverter {
    kind: CollectionKind,
    delegate: Option<Box<dyn ParameterConverter>>,
}

impl CollectionConverter {
    pub fn new(kind: CollectionKind, delegate: Option<Box<dyn ParameterConverter>>) -> Self {
        Self { kind, delegate }
    }
}

impl ParameterConverter for CollectionConverter {
    fn convert(&self, value: Value) -> Result<Value, HandlerError> {
        let items = match value {
            Value::Null => return Ok(Value::Array(Vec::new())),
            Value::Array(items) => items,
            single => vec![single],
        };
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let converted = match &self.delegate {
                Some(d) => d.convert(item)?,
                None => item,
            };
            if self.kind == CollectionKind::List || !out.contains(&converted) {
                out.push(converted);
            }
        }
        if self.kind == CollectionKind::SortedSet {
            out.sort_by(compare_values);
        }
        Ok(Value::Array(out))
    }

    fn init(
        &mut self,
        providers: &ParamConverterProviders,
        _raw: &TypeDescriptor,
        generic: &TypeDescriptor,
    ) -> Result<(), ElementTypeError> {
        if let (Some(delegate), Some(element)) = (self.delegate.as_mut(), generic.type_arguments().first()) {
            let raw = element
                .raw_name()
                .map_or_else(|| element.clone(), TypeDescriptor::class);
            delegate.init(providers, &raw, element)?;
        }
        Ok(())
    }
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// `Optional<T>`: absent stays absent, present values go through the delegate.
pub struct OptionalConverter {
    delegate: Option<Box<dyn ParameterConverter>>,
}

impl OptionalConverter {
    pub fn new(delegate: Option<Box<dyn ParameterConverter>>) -> Self {
        Self { delegate }
    }
}

impl ParameterConverter for OptionalConverter {
    fn convert(&self, value: Value) -> Result<Value, HandlerError> {
        match (value, &self.delegate) {
            (Value::Null, _) => Ok(Value::Null),
            (v, Some(d)) => d.convert(v),
            (v, None) => Ok(v),
        }
    }

    fn is_for_single_object_container(&self) -> bool {
        true
    }
}

/// Gives user [`ParamConverterProvider`]s the first chance to convert, falling
/// back to the build-time converter.
pub struct RuntimeResolvedConverter {
    delegate: Box<dyn ParameterConverter>,
    runtime: Option<Arc<dyn ParamConverter>>,
}

impl RuntimeResolvedConverter {
    pub fn new(delegate: Box<dyn ParameterConverter>) -> Self {
        Self {
            delegate,
            runtime: None,
        }
    }

    #[must_use]
    pub fn has_runtime_converter(&self) -> bool {
        self.runtime.is_some()
    }
}

impl ParameterConverter for RuntimeResolvedConverter {
    fn convert(&self, value: Value) -> Result<Value, HandlerError> {
        let Some(runtime) = &self.runtime else {
            return self.delegate.convert(value);
        };
        match value {
            Value::Null => Ok(Value::Null),
            Value::String(s) => runtime.from_string(&s),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => runtime.from_string(&s),
                    other => Ok(other),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other),
        }
    }

    fn init(
        &mut self,
        providers: &ParamConverterProviders,
        raw: &TypeDescriptor,
        generic: &TypeDescriptor,
    ) -> Result<(), ElementTypeError> {
        self.runtime = if self.delegate.is_for_single_object_container() {
            let element = resolve_element_type(generic)?;
            let element_generic = generic.type_arguments().first().cloned().unwrap_or_else(|| element.clone());
            providers.find(&element, &element_generic)
        } else {
            providers.find(raw, generic)
        };
        Ok(())
    }

    fn is_for_single_object_container(&self) -> bool {
        self.delegate.is_for_single_object_container()
    }
}

/// The build-time converter for a declared type. `String` needs none.
#[must_use]
pub fn supplier_for(generic: &TypeDescriptor) -> Option<ConverterSupplier> {
    match generic {
        TypeDescriptor::Class(name) if name == names::STRING => None,
        TypeDescriptor::Class(name) => match ScalarKind::from_type_name(name) {
            Some(kind) => Some(Arc::new(move || Box::new(ScalarConverter(kind)) as Box<dyn ParameterConverter>)),
            None => Some(Arc::new(|| Box::new(PassThroughConverter) as Box<dyn ParameterConverter>)),
        },
        TypeDescriptor::Parameterized { raw, args } => {
            let element = args.first().and_then(supplier_for);
            let kind = match raw.as_str() {
                names::LIST => CollectionKind::List,
                names::SET => CollectionKind::Set,
                names::SORTED_SET => CollectionKind::SortedSet,
                names::OPTIONAL => {
                    return Some(Arc::new(move || {
                        Box::new(OptionalConverter::new(element.as_ref().map(|s| s())))
                            as Box<dyn ParameterConverter>
                    }));
                }
                _ => return Some(Arc::new(|| Box::new(PassThroughConverter) as Box<dyn ParameterConverter>)),
            };
            Some(Arc::new(move || {
                Box::new(CollectionConverter::new(kind, element.as_ref().map(|s| s())))
                    as Box<dyn ParameterConverter>
            }))
        }
        TypeDescriptor::Wildcard { .. } | TypeDescriptor::Variable(_) | TypeDescriptor::Void => None,
    }
}
