//! Routing tables.
//!
//! A [`RequestMapper`] holds URI templates in precedence order and returns the
//! first one matching a path, with the captured variables and the unmatched
//! remainder. Deployment builds one for class templates and one per HTTP method
//! of every class; locators get one per sub-resource class.

// Matching runs on every request.
#![deny(clippy::inefficient_to_string)]
#![deny(clippy::unnecessary_to_owned)]

use crate::template::URITemplate;
use smallvec::SmallVec;
use std::fmt;

/// Captured values kept inline for templates with up to this many variables.
pub const MAX_INLINE_PARAMS: usize = 8;

/// A template and the value routed to when it matches.
#[derive(Clone)]
pub struct RequestPath<T> {
    pub template: URITemplate,
    pub value: T,
}

/// Result of a successful [`RequestMapper::map`].
#[derive(Debug)]
pub struct RequestMatch<'a, T> {
    pub value: &'a T,
    pub template: &'a URITemplate,
    /// Captured values in template order.
    pub params: SmallVec<[String; MAX_INLINE_PARAMS]>,
    /// Unmatched rest of the path for prefix templates, `""` otherwise.
    pub remaining: String,
}

/// Templates in precedence order.
#[derive(Clone)]
pub struct RequestMapper<T> {
    templates: Vec<RequestPath<T>>,
    max_params: usize,
}

impl<T> RequestMapper<T> {
    /// Sort `entries` by template specificity. The sort is stable so templates of
    /// equal specificity keep the order they were given in.
    pub fn new(entries: Vec<(URITemplate, T)>) -> Self {
        let mut templates: Vec<RequestPath<T>> = entries
            .into_iter()
            .map(|(template, value)| RequestPath { template, value })
            .collect();
        templates.sort_by(|a, b| a.template.specificity_cmp(&b.template));
        let max_params = templates
            .iter()
            .map(|p| p.template.count_path_param_names())
            .max()
            .unwrap_or(0);
        Self { templates, max_params }
    }

    /// First template matching `path`.
    #[must_use]
    pub fn map<'a>(&'a self, path: &str) -> Option<RequestMatch<'a, T>> {
        self.templates.iter().find_map(|entry| {
            let matched = entry.template.match_path(path)?;
            Some(RequestMatch {
                value: &entry.value,
                template: &entry.template,
                params: matched.values.iter().map(|v| (*v).to_owned()).collect(),
                remaining: matched.remaining.to_owned(),
            })
        })
    }

    #[must_use]
    pub fn entries(&self) -> &[RequestPath<T>] {
        &self.templates
    }

    /// Largest number of named variables of any template.
    #[inline]
    #[must_use]
    pub fn max_params(&self) -> usize {
        self.max_params
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }
}

impl<T> fmt::Debug for RequestMapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.templates.iter().map(|p| p.template.template()))
            .finish()
    }
}
