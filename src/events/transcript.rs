//! Recorder for everything an event source delivers

use std::cell::RefCell;
use std::rc::Rc;

use super::{handler, EventSource};
use crate::models::{Event, EventKind};

/// Ordered log of delivered events
#[derive(Debug, Default)]
pub struct Transcript {
    events: RefCell<Vec<Event>>,
}

impl Transcript {
    /// Start recording every kind delivered by `source`
    pub fn attach(source: &dyn EventSource) -> Rc<Self> {
        let transcript = Rc::new(Self::default());
        let sink = transcript.clone();
        source.on_all(handler(move |event| {
            sink.events.borrow_mut().push(event.clone())
        }));
        transcript
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.borrow().iter().map(|e| e.kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.borrow().iter().filter(|e| e.kind == kind).count()
    }

    /// Titles of the recorded events of `kind`, in delivery order
    pub fn titles(&self, kind: EventKind) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter(|e| e.kind == kind)
            .filter_map(|e| e.title().map(str::to_string))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}
