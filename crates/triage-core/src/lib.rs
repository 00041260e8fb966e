//! Domain model and collaborator contracts for triage.
//!
//! Everything here is free of I/O: the patch engine, keyword extraction,
//! the workflow record/state machine, and the traits that the engine uses
//! to reach the chat platform, language model, issue tracker and source host.

pub mod conversation;
pub mod error;
pub mod fix;
pub mod keywords;
pub mod parse;
pub mod patch;
pub mod protocol;
pub mod report;
pub mod util;
pub mod workflow;

pub use conversation::ConversationMessage;
pub use error::{CollaboratorError, PatchError, TransitionError, WorkflowError};
pub use fix::{ChangeEncoding, FileChange, FixProposal};
pub use report::{AffectedComponents, BugReport, ReportPayload, Severity};
pub use workflow::{WorkflowRecord, WorkflowResult, WorkflowStatus, WorkflowStep};
