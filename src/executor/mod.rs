//! Session execution
//!
//! Drives simulated child runners through the aggregator.

mod simulation;

pub use simulation::{SessionOutcome, Simulation, SimulationError, StallReport};
