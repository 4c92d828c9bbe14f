//! Folds built resources into per-class routing tables.

use super::{ClassMapper, RuntimeResource};
use crate::error::DeploymentError;
use crate::handlers::MediaTypeMapper;
use crate::mapping::RequestMapper;
use crate::spi::ServerRestHandler;
use crate::template::URITemplate;
use http::Method;
use std::collections::HashMap;
use std::sync::Arc;

/// Resources of one class template grouped by HTTP method, then by method
/// template in the order the templates were first seen.
pub type MethodTemplates = HashMap<Option<Method>, Vec<(URITemplate, Vec<Arc<RuntimeResource>>)>>;

/// Builds the routing tables below a class template.
pub struct RuntimeMappingDeployment;

impl RuntimeMappingDeployment {
    /// Group `resources` by HTTP method and exact method template. Resources
    /// without a path are routed at `/`.
    pub fn build_method_mapper(resources: &[Arc<RuntimeResource>]) -> Result<MethodTemplates, DeploymentError> {
        let mut templates = MethodTemplates::new();
        for resource in resources {
            let template = match &resource.path {
                Some(path) => path.clone(),
                None => URITemplate::new("/", resource.http_method.is_none())?,
            };
            let per_template = templates.entry(resource.http_method.clone()).or_default();
            match per_template.iter_mut().find(|(t, _)| *t == template) {
                Some((_, list)) => list.push(Arc::clone(resource)),
                None => per_template.push((template, vec![Arc::clone(resource)])),
            }
        }
        Ok(templates)
    }

    /// One [`RequestMapper`] per HTTP method.
    ///
    /// Locator templates are added to every method bucket that lacks them, so a
    /// method resource always wins over a locator with the same template. The
    /// locator bucket stays available under `None`. Templates shared by several
    /// resources route to a [`MediaTypeMapper`] choosing among them per request.
    #[must_use]
    pub fn build_class_mapper(mut templates: MethodTemplates) -> ClassMapper {
        if let Some(locators) = templates.get(&None).cloned() {
            for (method, per_template) in &mut templates {
                if method.is_none() {
                    continue;
                }
                for (template, resources) in &locators {
                    if !per_template.iter().any(|(t, _)| t == template) {
                        per_template.push((template.clone(), resources.clone()));
                    }
                }
            }
        }
        templates
            .into_iter()
            .map(|(method, per_template)| {
                let entries = per_template
                    .into_iter()
                    .map(|(template, resources)| (template, Self::single_target(resources)))
                    .collect();
                (method, RequestMapper::new(entries))
            })
            .collect()
    }

    fn single_target(mut resources: Vec<Arc<RuntimeResource>>) -> Arc<RuntimeResource> {
        if resources.len() == 1 {
            return resources.remove(0);
        }
        let mapper: Arc<dyn ServerRestHandler> = Arc::new(MediaTypeMapper::new(resources.clone()));
        Arc::new(RuntimeResource {
            handler_chain: Arc::from(vec![mapper]),
            ..(*resources[0]).clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::Score;
    use crate::handlers::NonBlockingHandler;
    use crate::media::ServerMediaType;
    use crate::model::{ResourceInfo, TypeDescriptor};
    use crate::spi::{EndpointResult, HandlerKind, Instance};
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn resource(name: &str, method: Option<Method>, path: &str) -> Arc<RuntimeResource> {
        let invoker = |_: Option<&Instance>, _: &[Value]| Ok::<_, crate::error::HandlerError>(EndpointResult::Empty);
        let factory = || Arc::new(()) as Instance;
        let chain: Vec<Arc<dyn ServerRestHandler>> = vec![Arc::new(NonBlockingHandler)];
        Arc::new(RuntimeResource {
            http_method: method.clone(),
            path: Some(URITemplate::new(path, method.is_none()).unwrap()),
            class_path: None,
            produces: ServerMediaType::new(&[]),
            consumes: Vec::new(),
            invoker: Arc::new(invoker),
            factory: Arc::new(factory),
            handler_chain: Arc::from(chain),
            abort_chain: Arc::from(Vec::new()),
            method_name: name.to_string(),
            parameter_types: Vec::new(),
            return_type: TypeDescriptor::Void,
            blocking: false,
            class_name: "Test".to_string(),
            resource_info: ResourceInfo {
                class_name: "Test".to_string(),
                method_name: name.to_string(),
                http_method: method,
                path: Some(path.to_string()),
                name_bindings: Default::default(),
            },
            path_parameter_indexes: BTreeMap::new(),
            score: Score::default(),
            sse_element_type: None,
            class_exception_mappers: Vec::new(),
        })
    }

    #[test]
    fn test_method_resource_wins_over_locator() {
        let resources = vec![
            resource("locate", None, "/items"),
            resource("list", Some(Method::GET), "/items"),
            resource("create", Some(Method::POST), "/other"),
        ];
        let mapper = RuntimeMappingDeployment::build_class_mapper(
            RuntimeMappingDeployment::build_method_mapper(&resources).unwrap(),
        );

        let get = mapper[&Some(Method::GET)].map("/items").unwrap();
        assert_eq!(get.value.method_name, "list");
        let post = mapper[&Some(Method::POST)].map("/items/3").unwrap();
        assert_eq!(post.value.method_name, "locate");
        assert_eq!(post.remaining, "/3");
        assert_eq!(mapper[&None].len(), 1);
    }

    #[test]
    fn test_shared_template_becomes_media_type_mapper() {
        let resources = vec![
            resource("json", Some(Method::GET), "/x"),
            resource("xml", Some(Method::GET), "/x"),
        ];
        let mapper = RuntimeMappingDeployment::build_class_mapper(
            RuntimeMappingDeployment::build_method_mapper(&resources).unwrap(),
        );
        let get = &mapper[&Some(Method::GET)];
        assert_eq!(get.len(), 1);
        let target = get.map("/x").unwrap().value;
        assert_eq!(target.handler_chain.len(), 1);
        assert_eq!(target.handler_chain[0].kind(), HandlerKind::MediaTypeMapper);
    }
}
