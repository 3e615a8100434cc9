//! Registry of child runners
//!
//! Tracks every child created in this session and whether each one is still running.

use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

use super::ChildRunner;
use crate::aggregator::{InstanceStatus, Runner, RunnerRegistry};
use crate::models::RunnerId;

/// Every child runner instance of a session
#[derive(Debug, Default)]
pub struct ChildRegistry {
    children: RefCell<Vec<Rc<ChildRunner>>>,
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and track a new child
    pub fn spawn(&self, name: impl Into<String>, total: u64) -> Rc<ChildRunner> {
        let child = Rc::new(ChildRunner::new(name, total));
        self.register(child.clone());
        child
    }

    /// Track an existing child
    pub fn register(&self, child: Rc<ChildRunner>) {
        debug!(runner = %child.id(), name = child.name(), "child registered");
        self.children.borrow_mut().push(child);
    }

    pub fn children(&self) -> Vec<Rc<ChildRunner>> {
        self.children.borrow().clone()
    }

    pub fn find(&self, id: RunnerId) -> Option<Rc<ChildRunner>> {
        self.children
            .borrow()
            .iter()
            .find(|child| child.id() == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.children.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.borrow().is_empty()
    }
}

impl RunnerRegistry for ChildRegistry {
    fn instances(&self) -> Vec<InstanceStatus> {
        self.children
            .borrow()
            .iter()
            .map(|child| InstanceStatus {
                id: child.id(),
                name: child.name().to_string(),
                running: child.is_running(),
            })
            .collect()
    }
}
