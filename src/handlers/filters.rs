use crate::context::{RequestContext, Response};
use crate::error::HandlerError;
use crate::spi::{ContainerRequestFilter, ContainerResponseFilter, HandlerKind, ServerRestHandler};
use std::sync::Arc;

/// Runs one request filter.
pub struct ResourceRequestFilterHandler {
    filter: Arc<dyn ContainerRequestFilter>,
    pre_match: bool,
    non_blocking_required: bool,
    read_body: bool,
}

impl ResourceRequestFilterHandler {
    pub fn new(
        filter: Arc<dyn ContainerRequestFilter>,
        pre_match: bool,
        non_blocking_required: bool,
        read_body: bool,
    ) -> Self {
        Self {
            filter,
            pre_match,
            non_blocking_required,
            read_body,
        }
    }

    #[must_use]
    pub fn filter(&self) -> &Arc<dyn ContainerRequestFilter> {
        &self.filter
    }

    #[must_use]
    pub fn is_non_blocking_required(&self) -> bool {
        self.non_blocking_required
    }

    #[must_use]
    pub fn is_read_body(&self) -> bool {
        self.read_body
    }
}

impl ServerRestHandler for ResourceRequestFilterHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        self.filter.filter(ctx)
    }

    fn kind(&self) -> HandlerKind {
        if self.pre_match {
            HandlerKind::PreMatchRequestFilter
        } else {
            HandlerKind::RequestFilter
        }
    }
}

/// Runs one response filter against the response built so far.
pub struct ResourceResponseFilterHandler {
    filter: Arc<dyn ContainerResponseFilter>,
}

impl ResourceResponseFilterHandler {
    pub fn new(filter: Arc<dyn ContainerResponseFilter>) -> Self {
        Self { filter }
    }
}

impl ServerRestHandler for ResourceResponseFilterHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        let mut response = ctx.take_response().unwrap_or_else(Response::no_content);
        let outcome = self.filter.filter(ctx, &mut response);
        ctx.set_response(response);
        outcome
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::ResponseFilter
    }
}
