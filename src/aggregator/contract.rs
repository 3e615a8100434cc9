//! Collaborator contracts
//!
//! What the aggregator needs from a runner instance and from the registry of all instances.

use serde::Serialize;

use crate::events::EventSource;
use crate::models::RunnerId;

/// A runner instance whose events can be aggregated
pub trait Runner: EventSource {
    /// Identity of this instance
    fn id(&self) -> RunnerId;

    /// Human-readable name, for diagnostics
    fn name(&self) -> &str;

    /// Number of test units this runner currently expects to run
    fn total(&self) -> u64;
}

/// Status of one instance as reported by a registry
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstanceStatus {
    pub id: RunnerId,
    pub name: String,
    pub running: bool,
}

/// Registry of every runner instance in the session
pub trait RunnerRegistry {
    /// Snapshot of all known instances
    fn instances(&self) -> Vec<InstanceStatus>;

    /// Instances still reported as running
    fn running(&self) -> Vec<InstanceStatus> {
        self.instances()
            .into_iter()
            .filter(|instance| instance.running)
            .collect()
    }
}
