//! The publisher side: a typed signal fanning out to its bound ports.

use std::sync::Arc;

use parking_lot::Mutex;
use sim_log::LogTag;

use crate::{
    context,
    meta::CallContext,
    port::PortValue,
    queue_port::QueuePortInner,
    sample_port::SamplePortInner,
};

pub(crate) struct SignalInner<T> {
    pub(crate) name: String,
    pub(crate) sample_ports: Mutex<Vec<Arc<SamplePortInner<T>>>>,
    pub(crate) queue_ports: Mutex<Vec<Arc<QueuePortInner<T>>>>,
}

/// A value-typed publisher. Ports subscribe to it; `push` delivers to every
/// port, yielding once per delivery so concurrent publishers on distinct
/// runners interleave instead of bursting.
#[derive(Clone)]
pub struct Signal<T> {
    pub(crate) inner: Arc<SignalInner<T>>,
}

impl<T: PortValue> Signal<T> {
    pub fn new(name: &str) -> Self {
        Signal {
            inner: Arc::new(SignalInner {
                name: name.to_owned(),
                sample_ports: Mutex::new(Vec::new()),
                queue_ports: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Publish a value to every bound port. Must be called from a runner.
    #[track_caller]
    pub fn push(&self, value: T) {
        self.push_with(value, CallContext::capture());
    }

    pub fn push_with(&self, value: T, call: CallContext) {
        let runner = context::current_runner();
        runner
            .logger()
            .record(LogTag::Push, runner.now(), call.file, call.line)
            .line(format!("Push value to '{}':", self.inner.name))
            .value(&value);

        // Deliveries run on the publishing coroutine; each one is preceded by
        // a yield to interleave fan-out across publishers.
        let (_, executing) = context::try_current().expect("push outside a runner");
        let sample_ports = self.inner.sample_ports.lock().clone();
        for port in sample_ports {
            executing.coroutine().yield_now();
            port.insert(value.clone());
        }
        let queue_ports = self.inner.queue_ports.lock().clone();
        for port in queue_ports {
            executing.coroutine().yield_now();
            port.insert(value.clone());
        }
    }
}
