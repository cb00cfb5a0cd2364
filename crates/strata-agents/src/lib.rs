//! The specialist graph: domain agents, their dependency registry, and the
//! engine that cascades findings from a producer to every consumer beneath it.

pub mod engine;
pub mod orchestrator;
pub mod registry;
pub mod specialist;
pub mod specialists;

pub use engine::{CascadeResult, PropagationEngine};
pub use orchestrator::Orchestrator;
pub use registry::SpecialistRegistry;
pub use specialist::{DownstreamSet, Specialist};
pub use specialists::{
    DatabaseSpecialist, KubernetesSpecialist, OsSpecialist, DATABASE_SPECIALIST,
    KUBERNETES_SPECIALIST, OS_SPECIALIST,
};
