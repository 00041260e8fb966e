//! Workflow table
//!
//! The orchestrator talks to a `WorkflowStore` so the in-memory table can be
//! replaced by something persistent. Each record is only ever mutated by the
//! workflow that owns its key.

use dashmap::DashMap;
use triage_core::error::TransitionError;
use triage_core::workflow::{WorkflowRecord, WorkflowStatus};

pub trait WorkflowStore: Send + Sync {
    /// Insert a record, replacing any previous run for the same id.
    fn put(&self, record: WorkflowRecord);

    /// Append a transition to an existing record.
    fn append_step(
        &self,
        id: &str,
        status: WorkflowStatus,
        data: serde_json::Value,
    ) -> Result<(), TransitionError>;

    fn get(&self, id: &str) -> Option<WorkflowRecord>;
}

/// Process-lifetime table; one entry per thread ever processed.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    records: DashMap<String, WorkflowRecord>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl WorkflowStore for InMemoryWorkflowStore {
    fn put(&self, record: WorkflowRecord) {
        self.records.insert(record.id.clone(), record);
    }

    fn append_step(
        &self,
        id: &str,
        status: WorkflowStatus,
        data: serde_json::Value,
    ) -> Result<(), TransitionError> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| TransitionError::UnknownWorkflow(id.to_string()))?;
        record.record(status, data)
    }

    fn get(&self, id: &str) -> Option<WorkflowRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }
}
