//! Static resource metadata consumed by deployment.
//!
//! Nothing here is used on the request path directly: deployment reads these
//! descriptions once and turns them into immutable handler chains.

mod customizer;
mod feature;
mod interceptor;
mod resource;
pub mod types;

pub use customizer::{HandlerChainCustomizer, Phase};
pub use feature::{Configuration, DynamicFeature, DynamicFeatureContext, Feature, FeatureContext, ResourceInfo};
pub use interceptor::{
    InterceptorContainer, PreMatchInterceptorContainer, ResourceInterceptor, ResourceInterceptors,
    PRIORITY_AUTHENTICATION, PRIORITY_USER,
};
pub use resource::{
    ClassExceptionMapper, InstanceScope, MethodParameter, ParameterType, ResourceClass,
    ServerResourceMethod,
};
pub use types::TypeDescriptor;
