use std::sync::Mutex;

/// Counter event emitted on every registry resolution, tagged
/// `{name, source}`.
pub const EVENT_LOOKUP: &str = "rate_limit.lookup";
/// Counter event emitted on every enforcement decision, tagged
/// `{name, outcome, window, strategy}`.
pub const EVENT_HIT: &str = "rate_limit.hit";

/// Trait for external metrics sinks.
///
/// Implementations must be `Send + Sync`. The interface is infallible on
/// purpose: a sink that can fail must swallow its own errors, so telemetry
/// can never affect an allow/block decision.
pub trait MetricsSink: Send + Sync {
    /// Increment the named counter by one, with the given tags.
    fn increment(&self, name: &str, tags: &[(&str, &str)]);
}

/// Sink that drops every event. The default when no sink is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn increment(&self, _name: &str, _tags: &[(&str, &str)]) {}
}

/// A single event captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Counter name.
    pub name: String,
    /// Tag key/value pairs in emission order.
    pub tags: Vec<(String, String)>,
}

impl RecordedEvent {
    /// Look up a tag value by key.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Sink that records every event in memory, for test assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a snapshot of all recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Count recorded events with the given counter name.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| event.name == name)
            .count()
    }
}

impl MetricsSink for RecordingSink {
    fn increment(&self, name: &str, tags: &[(&str, &str)]) {
        let event = RecordedEvent {
            name: name.to_owned(),
            tags: tags
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        };
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
