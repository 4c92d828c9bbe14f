use crate::context::{RequestContext, Response};
use crate::deployment::{ClassMapper, InitialMatch, LocatorRegistry, RuntimeResource};
use crate::error::HandlerError;
use crate::mapping::{RequestMapper, RequestMatch};
use crate::media;
use crate::spi::{HandlerKind, ServerRestHandler};
use http::Method;
use once_cell::sync::OnceCell;
use serde_json::json;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

/// Path with `;name=value` matrix parameters removed from every segment.
#[must_use]
pub fn strip_matrix_params(path: &str) -> Cow<'_, str> {
    if !path.contains(';') {
        return Cow::Borrowed(path);
    }
    let stripped: Vec<&str> = path
        .split('/')
        .map(|segment| segment.split(';').next().unwrap_or(""))
        .collect();
    Cow::Owned(stripped.join("/"))
}

/// `path` relative to the deployment prefix, or `None` outside it.
#[must_use]
pub fn strip_deployment_prefix<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

fn select<'a>(
    mappers: &'a ClassMapper,
    method: &Method,
    path: &str,
) -> Option<RequestMatch<'a, Arc<RuntimeResource>>> {
    let lookup = |key: Option<Method>| mappers.get(&key).and_then(|m| m.map(path));
    lookup(Some(method.clone()))
        .or_else(|| {
            if *method == Method::HEAD {
                lookup(Some(Method::GET))
            } else {
                None
            }
        })
        .or_else(|| lookup(None))
}

// No resource for this method: OPTIONS lists the allowed methods, other
// methods get 405 when the path exists at all, else 404.
fn reject(ctx: &mut RequestContext, mappers: &ClassMapper, path: &str) -> Result<(), HandlerError> {
    let mut allowed: Vec<&str> = mappers
        .iter()
        .filter_map(|(method, mapper)| {
            let method = method.as_ref()?;
            mapper.map(path).map(|_| method.as_str())
        })
        .collect();
    if allowed.is_empty() {
        return Err(HandlerError::not_found());
    }
    if allowed.contains(&"GET") && !allowed.contains(&"HEAD") {
        allowed.push("HEAD");
    }
    allowed.push("OPTIONS");
    allowed.sort_unstable();
    allowed.dedup();
    let allow = allowed.join(", ");

    if ctx.request().method == Method::OPTIONS {
        ctx.abort_with(Response::new(200).with_header("Allow", &allow));
    } else {
        ctx.abort_with(
            Response::new(405)
                .with_header("Allow", &allow)
                .with_entity(json!({ "error": "Method Not Allowed" })),
        );
    }
    Ok(())
}

/// Match the remaining path in `mappers` and continue with the matched resource.
fn route(ctx: &mut RequestContext, mappers: &ClassMapper, param_offset: usize) -> Result<(), HandlerError> {
    let method = ctx.request().method.clone();
    let path = ctx.remaining_path.clone();
    let Some(matched) = select(mappers, &method, &path) else {
        return reject(ctx, mappers, &path);
    };
    let resource = Arc::clone(matched.value);
    for (i, (value, name)) in matched
        .params
        .iter()
        .zip(matched.template.param_names())
        .enumerate()
    {
        ctx.set_path_param(param_offset + i, Some(name), value);
    }
    debug!(
        request_id = %ctx.request_id(),
        class_name = %resource.class_name,
        method_name = %resource.method_name,
        template = %matched.template.template(),
        "Matched resource method"
    );
    ctx.remaining_path = matched.remaining;
    ctx.restart(resource);
    Ok(())
}

/// Entry step of every request: strips the deployment prefix, matches the class
/// template and continues with that class's routing chain.
pub struct InitialHandler {
    prefix: String,
    mapper: RequestMapper<InitialMatch>,
}

impl InitialHandler {
    pub fn new(prefix: String, mapper: RequestMapper<InitialMatch>) -> Self {
        Self { prefix, mapper }
    }

    #[must_use]
    pub fn mapper(&self) -> &RequestMapper<InitialMatch> {
        &self.mapper
    }
}

impl ServerRestHandler for InitialHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        let path = strip_matrix_params(&ctx.request().path).into_owned();
        let relative = strip_deployment_prefix(&path, &self.prefix).ok_or_else(HandlerError::not_found)?;
        let matched = self.mapper.map(relative).ok_or_else(HandlerError::not_found)?;

        ctx.reserve_path_params(matched.value.max_params);
        for (i, (value, name)) in matched
            .params
            .iter()
            .zip(matched.template.param_names())
            .enumerate()
        {
            ctx.set_path_param(i, Some(name), value);
        }
        ctx.remaining_path = matched.remaining;
        ctx.restart_chain(Arc::clone(&matched.value.handlers));
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Initial
    }
}

/// Routes within one class template by HTTP method and method template.
pub struct ClassRoutingHandler {
    mappers: ClassMapper,
    class_param_count: usize,
}

impl ClassRoutingHandler {
    pub fn new(mappers: ClassMapper, class_param_count: usize) -> Self {
        Self {
            mappers,
            class_param_count,
        }
    }

    #[must_use]
    pub fn mappers(&self) -> &ClassMapper {
        &self.mappers
    }
}

impl ServerRestHandler for ClassRoutingHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        route(ctx, &self.mappers, self.class_param_count)
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::ClassRouting
    }
}

/// Chooses between resources sharing one method template by the request
/// `Content-Type` against their consumes and `Accept` against their produces.
pub struct MediaTypeMapper {
    resources: Vec<Arc<RuntimeResource>>,
}

impl MediaTypeMapper {
    pub fn new(resources: Vec<Arc<RuntimeResource>>) -> Self {
        Self { resources }
    }

    #[must_use]
    pub fn resources(&self) -> &[Arc<RuntimeResource>] {
        &self.resources
    }
}

impl ServerRestHandler for MediaTypeMapper {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        let candidates: Vec<&Arc<RuntimeResource>> = match ctx.request().content_type() {
            None => self.resources.iter().collect(),
            Some(sent) => {
                let consumes = |r: &&Arc<RuntimeResource>| {
                    r.consumes.iter().any(|c| media::is_compatible_with_suffix(c, &sent))
                };
                let explicit = self.resources.iter().filter(consumes);
                let open = self.resources.iter().filter(|r| r.consumes.is_empty());
                explicit.chain(open).collect()
            }
        };
        if candidates.is_empty() {
            return Err(HandlerError::unsupported_media_type());
        }

        let chosen = match ctx.request().header("accept").filter(|h| !h.trim().is_empty()) {
            None => candidates[0],
            Some(accept) => media::parse_accept(accept)
                .iter()
                .find_map(|wanted| {
                    candidates.iter().copied().find(|r| {
                        r.produces.is_empty()
                            || r
                                .produces
                                .sorted_types()
                                .iter()
                                .any(|p| media::is_compatible_with_suffix(wanted, p))
                    })
                })
                .ok_or_else(HandlerError::not_acceptable)?,
        };
        ctx.restart(Arc::clone(chosen));
        Ok(())
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::MediaTypeMapper
    }
}

/// Dispatches the sub-resource returned by a locator method into the routing
/// table of its class.
pub struct ResourceLocatorHandler {
    registry: Arc<OnceCell<LocatorRegistry>>,
}

impl ResourceLocatorHandler {
    /// `registry` is filled once every class has been deployed.
    pub fn new(registry: Arc<OnceCell<LocatorRegistry>>) -> Self {
        Self { registry }
    }
}

impl ServerRestHandler for ResourceLocatorHandler {
    fn handle(&self, ctx: &mut RequestContext) -> Result<(), HandlerError> {
        let Some(sub) = ctx.sub_resource.take() else {
            return Err(HandlerError::not_found());
        };
        let mappers = self
            .registry
            .get()
            .and_then(|r| r.get(&sub.class_name))
            .ok_or_else(|| HandlerError::Internal(format!("no sub-resource deployed for '{}'", sub.class_name)))?;
        // The sub-resource method starts from a clean argument list.
        ctx.instance = Some(sub.instance);
        ctx.result = None;
        ctx.parameters.clear();
        ctx.request_entity = None;
        route(ctx, mappers, 0)
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::ResourceLocator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_matrix_params() {
        assert_eq!(strip_matrix_params("/cars;color=red/2024"), "/cars/2024");
        assert!(matches!(strip_matrix_params("/plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_deployment_prefix() {
        assert_eq!(strip_deployment_prefix("/api/widgets", "/api"), Some("/widgets"));
        assert_eq!(strip_deployment_prefix("/api", "/api"), Some("/"));
        assert_eq!(strip_deployment_prefix("/apix", "/api"), None);
        assert_eq!(strip_deployment_prefix("/w", ""), Some("/w"));
    }
}
