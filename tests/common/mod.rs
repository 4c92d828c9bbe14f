#![allow(dead_code)]

use brrtrest::context::{RequestContext, Response};
use brrtrest::deployment::{Deployment, DeploymentInfo, RuntimeDeploymentManager};
use brrtrest::error::HandlerError;
use brrtrest::model::{ResourceClass, ResourceInterceptor};
use brrtrest::spi::{
    BeanFactory, ContainerRequestFilter, ContainerResponseFilter, EndpointInvoker, EndpointResult, HandlerKind,
    Instance, ReaderInterceptor, ServerRestHandler, WriterInterceptor,
};
use mime::Mime;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::{Arc, Once};

pub mod test_runtime {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }
}

static TRACING_INIT: Once = Once::new();

/// Route library logs through the test writer; `RUST_LOG=debug` shows chain execution.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn factory() -> Arc<dyn BeanFactory<Instance>> {
    Arc::new(|| Arc::new(()) as Instance)
}

pub fn class(name: &str, path: Option<&str>) -> ResourceClass {
    ResourceClass::new(name, path, factory())
}

/// Answers with the invoked method's name and its arguments.
pub fn echo(name: &'static str) -> Arc<dyn EndpointInvoker> {
    Arc::new(move |_: Option<&Instance>, args: &[Value]| {
        Ok::<_, HandlerError>(EndpointResult::Entity(json!({ "method": name, "args": args })))
    })
}

/// Always answers with `entity`.
pub fn constant(entity: Value) -> Arc<dyn EndpointInvoker> {
    Arc::new(move |_: Option<&Instance>, _: &[Value]| Ok::<_, HandlerError>(EndpointResult::Entity(entity.clone())))
}

pub fn deploy(info: DeploymentInfo) -> Deployment {
    init_tracing();
    RuntimeDeploymentManager::deploy(info).unwrap()
}

pub fn kinds(chain: &[Arc<dyn ServerRestHandler>]) -> Vec<HandlerKind> {
    chain.iter().map(|h| h.kind()).collect()
}

pub fn count(chain: &[Arc<dyn ServerRestHandler>], kind: HandlerKind) -> usize {
    chain.iter().filter(|h| h.kind() == kind).count()
}

pub fn same_instance(a: &Arc<dyn ServerRestHandler>, b: &Arc<dyn ServerRestHandler>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Shared log of which filters and interceptors ran, in order.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn request_filter(&self, name: &str, priority: i32) -> ResourceInterceptor<dyn ContainerRequestFilter> {
        let recorder = self.clone();
        let label = format!("request:{name}");
        let filter: Arc<dyn ContainerRequestFilter> = Arc::new(move |_: &mut RequestContext| {
            recorder.record(label.clone());
            Ok::<(), HandlerError>(())
        });
        ResourceInterceptor::of_instance(name, filter).with_priority(priority)
    }

    pub fn response_filter(&self, name: &str, priority: i32) -> ResourceInterceptor<dyn ContainerResponseFilter> {
        let recorder = self.clone();
        let label = format!("response:{name}");
        let filter: Arc<dyn ContainerResponseFilter> = Arc::new(move |_: &RequestContext, _: &mut Response| {
            recorder.record(label.clone());
            Ok::<(), HandlerError>(())
        });
        ResourceInterceptor::of_instance(name, filter).with_priority(priority)
    }

    pub fn writer_interceptor(&self, name: &str, priority: i32) -> ResourceInterceptor<dyn WriterInterceptor> {
        let interceptor: Arc<dyn WriterInterceptor> = Arc::new(Recording {
            recorder: self.clone(),
            label: format!("writer:{name}"),
        });
        ResourceInterceptor::of_instance(name, interceptor).with_priority(priority)
    }

    pub fn reader_interceptor(&self, name: &str, priority: i32) -> ResourceInterceptor<dyn ReaderInterceptor> {
        let interceptor: Arc<dyn ReaderInterceptor> = Arc::new(Recording {
            recorder: self.clone(),
            label: format!("reader:{name}"),
        });
        ResourceInterceptor::of_instance(name, interceptor).with_priority(priority)
    }
}

struct Recording {
    recorder: Recorder,
    label: String,
}

impl WriterInterceptor for Recording {
    fn around_write(&self, body: Vec<u8>, _media_type: &Mime) -> Result<Vec<u8>, HandlerError> {
        self.recorder.record(self.label.clone());
        Ok(body)
    }
}

impl ReaderInterceptor for Recording {
    fn around_read(&self, body: Vec<u8>, _media_type: &Mime) -> Result<Vec<u8>, HandlerError> {
        self.recorder.record(self.label.clone());
        Ok(body)
    }
}
