use crate::spi::{
    BeanFactory, ContainerRequestFilter, ContainerResponseFilter, ReaderInterceptor, WriterInterceptor,
};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Priority for authentication filters; lower runs first.
pub const PRIORITY_AUTHENTICATION: i32 = 1000;
/// Default priority of user interceptors.
pub const PRIORITY_USER: i32 = 5000;

/// Registration of one filter or interceptor.
///
/// Orders by priority ascending; ties keep registration order.
pub struct ResourceInterceptor<T: ?Sized> {
    pub class_name: String,
    pub factory: Arc<dyn BeanFactory<Arc<T>>>,
    pub priority: i32,
    /// Empty for global interceptors.
    pub name_bindings: BTreeSet<String>,
    /// Request filters that must run before any blocking dispatch.
    pub non_blocking_required: bool,
    /// Request filters that need the form body parsed first.
    pub read_body: bool,
    /// Request filters that run before routing.
    pub pre_matching: bool,
    order: usize,
}

impl<T: ?Sized> ResourceInterceptor<T> {
    pub fn new(class_name: impl Into<String>, factory: Arc<dyn BeanFactory<Arc<T>>>) -> Self {
        Self {
            class_name: class_name.into(),
            factory,
            priority: PRIORITY_USER,
            name_bindings: BTreeSet::new(),
            non_blocking_required: false,
            read_body: false,
            pre_matching: false,
            order: 0,
        }
    }

    /// An interceptor that always hands out the same instance.
    pub fn of_instance(class_name: impl Into<String>, instance: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        let factory = move || Arc::clone(&instance);
        Self::new(class_name, Arc::new(factory))
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_name_binding(mut self, binding: &str) -> Self {
        self.name_bindings.insert(binding.to_string());
        self
    }

    #[must_use]
    pub fn non_blocking(mut self) -> Self {
        self.non_blocking_required = true;
        self
    }

    #[must_use]
    pub fn reading_body(mut self) -> Self {
        self.read_body = true;
        self
    }

    #[must_use]
    pub fn pre_matching(mut self) -> Self {
        self.pre_matching = true;
        self
    }

    /// Registration index within its container.
    #[inline]
    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }

    /// `(priority, registration order)`.
    #[inline]
    #[must_use]
    pub fn sort_key(&self) -> (i32, usize) {
        (self.priority, self.order)
    }
}

impl<T: ?Sized> Clone for ResourceInterceptor<T> {
    fn clone(&self) -> Self {
        Self {
            class_name: self.class_name.clone(),
            factory: Arc::clone(&self.factory),
            priority: self.priority,
            name_bindings: self.name_bindings.clone(),
            non_blocking_required: self.non_blocking_required,
            read_body: self.read_body,
            pre_matching: self.pre_matching,
            order: self.order,
        }
    }
}

impl<T: ?Sized> fmt::Debug for ResourceInterceptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceInterceptor")
            .field("class_name", &self.class_name)
            .field("priority", &self.priority)
            .field("name_bindings", &self.name_bindings)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

/// Global and name-bound registrations of one interceptor kind.
pub struct InterceptorContainer<T: ?Sized> {
    global: Vec<ResourceInterceptor<T>>,
    name_bound: Vec<ResourceInterceptor<T>>,
    next_order: usize,
}

impl<T: ?Sized> Default for InterceptorContainer<T> {
    fn default() -> Self {
        Self {
            global: Vec::new(),
            name_bound: Vec::new(),
            next_order: 0,
        }
    }
}

impl<T: ?Sized> InterceptorContainer<T> {
    /// Register `interceptor`; it is name-bound when it declares bindings.
    pub fn add(&mut self, mut interceptor: ResourceInterceptor<T>) {
        interceptor.order = self.next_order;
        self.next_order += 1;
        if interceptor.name_bindings.is_empty() {
            self.global.push(interceptor);
        } else {
            self.name_bound.push(interceptor);
        }
    }

    /// Stable sort by priority.
    pub fn sort(&mut self) {
        self.global.sort_by_key(ResourceInterceptor::sort_key);
        self.name_bound.sort_by_key(ResourceInterceptor::sort_key);
    }

    #[must_use]
    pub fn global(&self) -> &[ResourceInterceptor<T>] {
        &self.global
    }

    #[must_use]
    pub fn name_bound(&self) -> &[ResourceInterceptor<T>] {
        &self.name_bound
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.name_bound.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.global.len() + self.name_bound.len()
    }
}

/// Request filter registrations, which may also run before routing.
pub struct PreMatchInterceptorContainer<T: ?Sized> {
    inner: InterceptorContainer<T>,
    pre_match: Vec<ResourceInterceptor<T>>,
}

impl<T: ?Sized> Default for PreMatchInterceptorContainer<T> {
    fn default() -> Self {
        Self {
            inner: InterceptorContainer::default(),
            pre_match: Vec::new(),
        }
    }
}

impl<T: ?Sized> PreMatchInterceptorContainer<T> {
    pub fn add(&mut self, mut interceptor: ResourceInterceptor<T>) {
        if interceptor.pre_matching {
            interceptor.order = self.inner.next_order;
            self.inner.next_order += 1;
            self.pre_match.push(interceptor);
        } else {
            self.inner.add(interceptor);
        }
    }

    pub fn sort(&mut self) {
        self.inner.sort();
        self.pre_match.sort_by_key(ResourceInterceptor::sort_key);
    }

    #[must_use]
    pub fn global(&self) -> &[ResourceInterceptor<T>] {
        self.inner.global()
    }

    #[must_use]
    pub fn name_bound(&self) -> &[ResourceInterceptor<T>] {
        self.inner.name_bound()
    }

    #[must_use]
    pub fn pre_match(&self) -> &[ResourceInterceptor<T>] {
        &self.pre_match
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty() && self.pre_match.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len() + self.pre_match.len()
    }
}

/// Every interceptor registered with a deployment (or captured by a dynamic
/// feature for one method).
#[derive(Default)]
pub struct ResourceInterceptors {
    pub container_request_filters: PreMatchInterceptorContainer<dyn ContainerRequestFilter>,
    pub container_response_filters: InterceptorContainer<dyn ContainerResponseFilter>,
    pub reader_interceptors: InterceptorContainer<dyn ReaderInterceptor>,
    pub writer_interceptors: InterceptorContainer<dyn WriterInterceptor>,
}

impl ResourceInterceptors {
    pub fn add_request_filter(&mut self, filter: ResourceInterceptor<dyn ContainerRequestFilter>) {
        self.container_request_filters.add(filter);
    }

    pub fn add_response_filter(&mut self, filter: ResourceInterceptor<dyn ContainerResponseFilter>) {
        self.container_response_filters.add(filter);
    }

    pub fn add_reader_interceptor(&mut self, interceptor: ResourceInterceptor<dyn ReaderInterceptor>) {
        self.reader_interceptors.add(interceptor);
    }

    pub fn add_writer_interceptor(&mut self, interceptor: ResourceInterceptor<dyn WriterInterceptor>) {
        self.writer_interceptors.add(interceptor);
    }

    pub fn sort(&mut self) {
        self.container_request_filters.sort();
        self.container_response_filters.sort();
        self.reader_interceptors.sort();
        self.writer_interceptors.sort();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.container_request_filters.is_empty()
            && self.container_response_filters.is_empty()
            && self.reader_interceptors.is_empty()
            && self.writer_interceptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::error::HandlerError;

    struct Noop;

    impl ContainerRequestFilter for Noop {
        fn filter(&self, _ctx: &mut RequestContext) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    fn filter(name: &str, priority: i32) -> ResourceInterceptor<dyn ContainerRequestFilter> {
        let instance: Arc<dyn ContainerRequestFilter> = Arc::new(Noop);
        ResourceInterceptor::of_instance(name, instance).with_priority(priority)
    }

    #[test]
    fn test_sort_keeps_registration_order_for_ties() {
        let mut c = PreMatchInterceptorContainer::default();
        c.add(filter("b", 200));
        c.add(filter("a1", 100));
        c.add(filter("a2", 100));
        c.add(filter("pre", 1).pre_matching());
        c.add(filter("bound", 1).with_name_binding("Audited"));
        c.sort();

        let names: Vec<_> = c.global().iter().map(|i| i.class_name.as_str()).collect();
        assert_eq!(names, vec!["a1", "a2", "b"]);
        assert_eq!(c.pre_match().len(), 1);
        assert_eq!(c.name_bound()[0].class_name, "bound");
        assert_eq!(c.len(), 5);
    }
}
