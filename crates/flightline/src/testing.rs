// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

/// One recorded event: its level, message and the other fields rendered as text.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<&'static str, String>,
}

impl RecordedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Records the events flightline emits so tests can assert on their fields.
///
/// Install with `recorder.subscriber().set_default()`. The guard scopes recording to the
/// current thread, which covers every task of a current-thread tokio test runtime, including
/// the queue's drain task.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber(&self) -> impl Subscriber {
        tracing_subscriber::registry().with(self.clone())
    }

    /// Returns the first event with `message`, panicking with everything recorded otherwise.
    pub fn event(&self, message: &str) -> RecordedEvent {
        let events = self.events.lock();
        events
            .iter()
            .find(|event| event.message == message)
            .cloned()
            .unwrap_or_else(|| panic!("no event '{message}' was recorded, got: {events:#?}"))
    }

    pub fn count(&self, message: &str) -> usize {
        self.events.lock().iter().filter(|event| event.message == message).count()
    }
}

impl<S: Subscriber> Layer<S> for EventRecorder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events.lock().push(RecordedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: BTreeMap<&'static str, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            value.clone_into(&mut self.message);
        } else {
            self.fields.insert(field.name(), value.to_owned());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.insert(field.name(), format!("{value:?}"));
        }
    }
}
