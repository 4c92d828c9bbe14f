//! Parameter extraction and conversion.
//!
//! An extractor pulls the raw value of one method parameter out of the request
//! (path, query, headers, form, body ...). A converter then turns the raw text
//! into the declared type. Deployment pairs them into one
//! [`crate::handlers::ParameterHandler`] per parameter.

pub mod converters;
mod extractors;

pub use converters::{
    ConverterSupplier, ElementTypeError, ParamConverter, ParamConverterProvider, ParamConverterProviders,
    ParameterConverter, RuntimeResolvedConverter,
};
pub use extractors::{
    AsyncResponseExtractor, BeanField, BodyParamExtractor, ContextParamExtractor, ContextProducer, ContextResolvers,
    CookieParamExtractor, FormParamExtractor, FormValueKind, HeaderParamExtractor, InjectParamExtractor,
    LocatableResourcePathParamExtractor, MatrixParamExtractor, MultipartDataInputExtractor, NullParamExtractor,
    ParameterExtractor, PathParamExtractor, QueryParamExtractor,
};
