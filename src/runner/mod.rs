//! Runner adapters
//!
//! In-process child runners and the registry that tracks them.

mod child;
mod registry;

pub use child::{ChildRunner, RunnerState};
pub use registry::ChildRegistry;
