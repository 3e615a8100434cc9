//! Publish/subscribe capability
//!
//! Runners and the aggregator both expose their streams through [`EventSource`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::models::{Event, EventKind};

/// Callback invoked for every matching event
pub type Handler = Rc<dyn Fn(&Event)>;

/// Wrap a closure as a [`Handler`]
pub fn handler(f: impl Fn(&Event) + 'static) -> Handler {
    Rc::new(f)
}

/// Anything that lets callers subscribe to events by kind
pub trait EventSource {
    /// Subscribe `handler` to events of `kind`
    fn on(&self, kind: EventKind, handler: Handler);

    /// Subscribe `handler` to every kind in [`EventKind::ALL`]
    fn on_all(&self, handler: Handler) {
        for kind in EventKind::ALL {
            self.on(kind, handler.clone());
        }
    }
}

/// Synchronous, single-threaded event emitter
///
/// Handlers run in subscription order. A handler may subscribe more handlers or emit
/// again on the same emitter; handlers added during an emit only see later events.
#[derive(Default)]
pub struct EventEmitter {
    handlers: RefCell<Vec<(EventKind, Handler)>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every handler subscribed to its kind
    pub fn emit(&self, event: &Event) {
        let matching: Vec<Handler> = self
            .handlers
            .borrow()
            .iter()
            .filter(|(kind, _)| *kind == event.kind)
            .map(|(_, handler)| handler.clone())
            .collect();

        for handler in matching {
            handler(event);
        }
    }
}

impl EventSource for EventEmitter {
    fn on(&self, kind: EventKind, handler: Handler) {
        self.handlers.borrow_mut().push((kind, handler));
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("handlers", &self.handlers.borrow().len())
            .finish()
    }
}
