use super::resource::{ResourceClass, ServerResourceMethod};
use crate::spi::{EndpointInvoker, ServerRestHandler};
use std::sync::Arc;

/// Points in a resource chain where customizers may add steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    AfterMatch,
    ResolveMethodParameters,
    BeforeMethodInvoke,
    AfterMethodInvoke,
    AfterMethodInvokeSecondRound,
    AfterResponseCreated,
}

/// Contributes extra handler steps to resource chains at build time.
///
/// Global customizers run for every method before the method's own.
pub trait HandlerChainCustomizer: Send + Sync {
    fn handlers(
        &self,
        phase: Phase,
        class: &ResourceClass,
        method: &ServerResourceMethod,
    ) -> Vec<Arc<dyn ServerRestHandler>>;

    /// Replaces the standard invocation step. The first customizer returning
    /// `Some` wins.
    fn alternate_invocation_handler(
        &self,
        _invoker: &Arc<dyn EndpointInvoker>,
    ) -> Option<Arc<dyn ServerRestHandler>> {
        None
    }
}
