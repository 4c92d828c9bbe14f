//! # Serialisers
//!
//! Registry of message body readers and writers. Deployment asks it which writers
//! can serve a method's declared return type (`find_build_time_writers`); the
//! runtime asks it for readers of request bodies and, when a writer could not be
//! fixed at build time, for writers of the actual entity.

mod builtin;
mod entity;

pub use builtin::{ByteArrayMessageBody, JsonMessageBody, StringMessageBody};
pub use entity::{DynamicEntityWriter, EntityWriter, FixedEntityWriter, FixedEntityWriterArray};

use crate::error::HandlerError;
use crate::media;
use crate::model::TypeDescriptor;
use mime::Mime;
use serde_json::Value;
use std::sync::Arc;

/// Entity type of a catch-all reader or writer.
pub const ANY_TYPE: &str = "*";

/// Default priority of registered serialisers; lower is preferred.
pub const PRIORITY_USER: i32 = 5000;
pub const PRIORITY_BUILTIN: i32 = 6000;

pub trait MessageBodyWriter: Send + Sync {
    fn name(&self) -> &str;

    fn is_writeable(&self, entity: &Value, media_type: &Mime) -> bool;

    fn write_to(&self, entity: &Value, media_type: &Mime) -> Result<Vec<u8>, HandlerError>;

    /// A writer able to serialise any entity for its media types.
    fn is_all_writeable(&self) -> bool {
        false
    }
}

pub trait MessageBodyReader: Send + Sync {
    fn name(&self) -> &str;

    fn is_readable(&self, _declared: &TypeDescriptor, _media_type: &Mime) -> bool {
        true
    }

    fn read_from(
        &self,
        declared: &TypeDescriptor,
        media_type: &Mime,
        body: &[u8],
    ) -> Result<Value, HandlerError>;
}

/// A writer registration.
#[derive(Clone)]
pub struct ResourceWriter {
    pub writer: Arc<dyn MessageBodyWriter>,
    pub entity_type: String,
    pub media_types: Vec<Mime>,
    pub priority: i32,
}

/// A reader registration.
#[derive(Clone)]
pub struct ResourceReader {
    pub reader: Arc<dyn MessageBodyReader>,
    pub entity_type: String,
    pub media_types: Vec<Mime>,
    pub priority: i32,
}

fn media_matches(registered: &[Mime], wanted: &Mime) -> bool {
    registered.is_empty()
        || registered
            .iter()
            .any(|m| media::is_compatible_with_suffix(m, wanted))
}

#[derive(Clone, Default)]
pub struct ServerSerialisers {
    writers: Vec<ResourceWriter>,
    readers: Vec<ResourceReader>,
}

impl ServerSerialisers {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON, `text/plain` strings and octet-stream bytes.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut s = Self::new();
        let json = Arc::new(JsonMessageBody);
        let string = Arc::new(StringMessageBody);
        let bytes = Arc::new(ByteArrayMessageBody);

        s.add_writer(ANY_TYPE, vec![mime::APPLICATION_JSON], PRIORITY_BUILTIN, Arc::clone(&json) as Arc<dyn MessageBodyWriter>);
        s.add_writer("String", vec![mime::TEXT_PLAIN], PRIORITY_BUILTIN - 1, Arc::clone(&string) as Arc<dyn MessageBodyWriter>);
        s.add_writer(
            crate::model::types::names::BYTES,
            vec![mime::APPLICATION_OCTET_STREAM],
            PRIORITY_BUILTIN - 1,
            Arc::clone(&bytes) as Arc<dyn MessageBodyWriter>,
        );

        s.add_reader(ANY_TYPE, vec![mime::APPLICATION_JSON], PRIORITY_BUILTIN, json);
        s.add_reader("String", vec![mime::STAR_STAR], PRIORITY_BUILTIN - 1, string);
        s.add_reader(
            crate::model::types::names::BYTES,
            vec![mime::STAR_STAR],
            PRIORITY_BUILTIN - 1,
            bytes,
        );
        s
    }

    pub fn add_writer(
        &mut self,
        entity_type: &str,
        media_types: Vec<Mime>,
        priority: i32,
        writer: Arc<dyn MessageBodyWriter>,
    ) {
        self.writers.push(ResourceWriter {
            writer,
            entity_type: entity_type.to_string(),
            media_types,
            priority,
        });
        self.writers.sort_by_key(|w| w.priority);
    }

    pub fn add_reader(
        &mut self,
        entity_type: &str,
        media_types: Vec<Mime>,
        priority: i32,
        reader: Arc<dyn MessageBodyReader>,
    ) {
        self.readers.push(ResourceReader {
            reader,
            entity_type: entity_type.to_string(),
            media_types,
            priority,
        });
        self.readers.sort_by_key(|r| r.priority);
    }

    #[must_use]
    pub fn writers(&self) -> &[ResourceWriter] {
        &self.writers
    }

    #[must_use]
    pub fn readers(&self) -> &[ResourceReader] {
        &self.readers
    }

    /// Writers usable for `entity_type` under any of `produces`, decided without
    /// seeing an entity. `None` when the type cannot be known statically.
    ///
    /// Writers registered for the exact type come first, then catch-alls, each
    /// group by priority.
    #[must_use]
    pub fn find_build_time_writers(
        &self,
        entity_type: &TypeDescriptor,
        produces: &[Mime],
    ) -> Option<Vec<Arc<dyn MessageBodyWriter>>> {
        if !entity_type.is_statically_resolvable() {
            return None;
        }
        let raw = entity_type.raw_name()?;
        let fits = |w: &&ResourceWriter| {
            produces.is_empty() || produces.iter().any(|p| media_matches(&w.media_types, p))
        };
        let exact = self
            .writers
            .iter()
            .filter(|w| w.entity_type == raw)
            .filter(fits);
        let any = self
            .writers
            .iter()
            .filter(|w| w.entity_type == ANY_TYPE)
            .filter(fits);
        Some(exact.chain(any).map(|w| Arc::clone(&w.writer)).collect())
    }

    /// Writers able to serialise `entity` as `media_type`, in priority order.
    #[must_use]
    pub fn find_writers(&self, entity: &Value, media_type: &Mime) -> Vec<Arc<dyn MessageBodyWriter>> {
        self.writers
            .iter()
            .filter(|w| media_matches(&w.media_types, media_type))
            .filter(|w| w.writer.is_writeable(entity, media_type))
            .map(|w| Arc::clone(&w.writer))
            .collect()
    }

    /// The first writer and concrete media type acceptable for `entity` given a
    /// list of accepted media types (most preferred first).
    #[must_use]
    pub fn select_writer(
        &self,
        entity: &Value,
        accepted: &[Mime],
    ) -> Option<(Arc<dyn MessageBodyWriter>, Mime)> {
        for wanted in accepted {
            for registration in &self.writers {
                for offered in &registration.media_types {
                    if !media::is_compatible_with_suffix(wanted, offered) {
                        continue;
                    }
                    let concrete = if media::is_wildcard(wanted) { offered } else { wanted };
                    if registration.writer.is_writeable(entity, concrete) {
                        return Some((Arc::clone(&registration.writer), concrete.clone()));
                    }
                }
            }
        }
        None
    }

    /// Readers for a body of `declared` type sent as `media_type`.
    #[must_use]
    pub fn find_readers(&self, declared: &TypeDescriptor, media_type: &Mime) -> Vec<Arc<dyn MessageBodyReader>> {
        let raw = declared.raw_name().unwrap_or(ANY_TYPE);
        let usable = |r: &&ResourceReader| {
            media_matches(&r.media_types, media_type) && r.reader.is_readable(declared, media_type)
        };
        let exact = self.readers.iter().filter(|r| r.entity_type == raw).filter(usable);
        let any = self.readers.iter().filter(|r| r.entity_type == ANY_TYPE).filter(usable);
        exact.chain(any).map(|r| Arc::clone(&r.reader)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_time_writers() {
        let s = ServerSerialisers::with_builtins();
        let widget = TypeDescriptor::class("Widget");

        let json_writers = s.find_build_time_writers(&widget, &[mime::APPLICATION_JSON]).unwrap();
        assert_eq!(json_writers.len(), 1);
        assert!(json_writers[0].is_all_writeable());

        let text = s
            .find_build_time_writers(&TypeDescriptor::class("String"), &[mime::TEXT_PLAIN])
            .unwrap();
        assert_eq!(text.len(), 1);
        assert_eq!(text[0].name(), "string");

        let xml: Mime = "application/xml".parse().unwrap();
        assert!(s.find_build_time_writers(&widget, &[xml]).unwrap().is_empty());
        assert!(s
            .find_build_time_writers(&TypeDescriptor::class("Object"), &[mime::APPLICATION_JSON])
            .is_none());
    }

    #[test]
    fn test_exact_type_before_catch_all() {
        let s = ServerSerialisers::with_builtins();
        let writers = s
            .find_build_time_writers(&TypeDescriptor::class("String"), &[mime::TEXT_PLAIN, mime::APPLICATION_JSON])
            .unwrap();
        let names: Vec<_> = writers.iter().map(|w| w.name().to_string()).collect();
        assert_eq!(names, vec!["string", "json"]);
    }

    #[test]
    fn test_select_writer_prefers_accept_order() {
        let s = ServerSerialisers::with_builtins();
        let (w, m) = s.select_writer(&json!("hi"), &[mime::STAR_STAR]).unwrap();
        assert_eq!(w.name(), "string");
        assert_eq!(m, mime::TEXT_PLAIN);

        let (w, m) = s.select_writer(&json!({"a": 1}), &[mime::STAR_STAR]).unwrap();
        assert_eq!(w.name(), "json");
        assert_eq!(m, mime::APPLICATION_JSON);
    }

    #[test]
    fn test_find_readers() {
        let s = ServerSerialisers::with_builtins();
        let readers = s.find_readers(&TypeDescriptor::class("Widget"), &mime::APPLICATION_JSON);
        assert_eq!(readers.len(), 1);
        assert!(s
            .find_readers(&TypeDescriptor::class("Widget"), &mime::TEXT_PLAIN)
            .is_empty());
        let vnd: Mime = "application/vnd.acme+json".parse().unwrap();
        assert_eq!(s.find_readers(&TypeDescriptor::class("Widget"), &vnd).len(), 1);
    }
}
