//! Event emission
//!
//! The [`Emitter`] owns the list of sinks. Sinks are registered while the
//! orchestrator boots and the emitter is frozen behind an `Arc` afterwards.
//! Delivery failures are logged and dropped: emitting a metric never fails
//! the operation being observed.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::{Event, MetricEvent};

/// Errors a sink may report for a single delivery
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("sink rejected event: {0}")]
    Rejected(String),
}

/// Destination for rendered metric events
///
/// Delivery must not block; sinks that ship events elsewhere should
/// buffer internally.
pub trait MetricSink: Send + Sync {
    fn name(&self) -> &str;

    fn deliver(&self, event: &MetricEvent) -> Result<(), SinkError>;
}

/// Fan-out of metric events to every registered sink
#[derive(Default)]
pub struct Emitter {
    sinks: Vec<Arc<dyn MetricSink>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink for the remaining lifetime of the process
    pub fn register(&mut self, sink: Arc<dyn MetricSink>) {
        tracing::debug!("Registered metric sink: {}", sink.name());
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.register(sink);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Render and deliver an event to all sinks
    pub fn emit(&self, event: Event) {
        let session = event.session();
        let span = tracing::debug_span!("metric", session = %session);
        let _enter = span.enter();

        let record = event.render(Utc::now());

        for sink in &self.sinks {
            if let Err(e) = sink.deliver(&record) {
                tracing::warn!("failed to emit metric to {}: {}", sink.name(), e);
            }
        }
    }
}

/// Sink writing every event to the structured log
pub struct LogSink;

impl MetricSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn deliver(&self, event: &MetricEvent) -> Result<(), SinkError> {
        tracing::info!(
            target: "cairn::metric",
            name = %event.name,
            value = event.value,
            severity = %event.severity,
            attributes = ?event.attributes,
            "metric"
        );
        Ok(())
    }
}

/// Bounded in-memory sink keeping the most recent events
pub struct MemorySink {
    capacity: usize,
    events: Mutex<VecDeque<MetricEvent>>,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Snapshot of the retained events, oldest first
    pub fn events(&self) -> Vec<MetricEvent> {
        let events = self.events.lock().unwrap();
        events.iter().cloned().collect()
    }

    /// Retained events with the given name
    pub fn named(&self, name: &str) -> Vec<MetricEvent> {
        let events = self.events.lock().unwrap();
        events.iter().filter(|e| e.name == name).cloned().collect()
    }
}

impl MetricSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn deliver(&self, event: &MetricEvent) -> Result<(), SinkError> {
        if self.capacity == 0 {
            return Err(SinkError::Unavailable("capacity is zero".to_string()));
        }

        let mut events = self.events.lock().unwrap();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl MetricSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn deliver(&self, _event: &MetricEvent) -> Result<(), SinkError> {
            Err(SinkError::Unavailable("down".to_string()))
        }
    }

    fn dropped(worker: &str) -> Event {
        Event::CollectorJobDropped {
            kind: cairn_core::domain::resource::ResourceKind::Container,
            worker: worker.to_string(),
        }
    }

    #[test]
    fn test_emit_reaches_every_sink() {
        let first = Arc::new(MemorySink::new(10));
        let second = Arc::new(MemorySink::new(10));
        let emitter = Emitter::new()
            .with_sink(first.clone())
            .with_sink(second.clone());

        emitter.emit(dropped("atc-1"));

        assert_eq!(emitter.sink_count(), 2);
        assert_eq!(first.events().len(), 1);
        assert_eq!(second.events().len(), 1);
    }

    #[test]
    fn test_failing_sink_does_not_stop_delivery() {
        let memory = Arc::new(MemorySink::new(10));
        let emitter = Emitter::new()
            .with_sink(Arc::new(FailingSink))
            .with_sink(memory.clone());

        emitter.emit(dropped("atc-1"));

        assert_eq!(memory.named("GC container collector job dropped").len(), 1);
    }

    #[test]
    fn test_memory_sink_keeps_most_recent() {
        let memory = Arc::new(MemorySink::new(2));
        let emitter = Emitter::new().with_sink(memory.clone());

        emitter.emit(dropped("a"));
        emitter.emit(dropped("b"));
        emitter.emit(dropped("c"));

        let workers: Vec<_> = memory
            .events()
            .iter()
            .map(|e| e.attribute("worker").unwrap().to_string())
            .collect();
        assert_eq!(workers, vec!["b", "c"]);
    }
}
