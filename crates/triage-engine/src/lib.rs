//! Workflow engine: report normalization, code-context assembly, and the
//! orchestrator that drives a conversation through ticket, fix and PR.

pub mod context;
pub mod dispatch;
pub mod guard;
pub mod normalize;
pub mod orchestrator;
pub mod publish;
pub mod store;

#[cfg(test)]
pub(crate) mod fakes;

pub use context::{CodeContextAssembler, ContextConfig, NO_CONTEXT_FOUND};
pub use dispatch::{DispatchOutcome, ThreadDispatcher};
pub use guard::{ThreadGuard, ThreadLease};
pub use normalize::ReportNormalizer;
pub use orchestrator::{Collaborators, WorkflowOrchestrator};
pub use store::{InMemoryWorkflowStore, WorkflowStore};
