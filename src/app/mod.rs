//! Process supervisor: builds the shared bus client and detector, runs one
//! ingestion unit and/or one pipeline unit per selected stream, and shuts them
//! down together on a signal.

mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::EdgeOrchestrator;
pub use state::ComponentStates;
pub use types::{ComponentState, RunMode, ShutdownReason, UnitKind};
