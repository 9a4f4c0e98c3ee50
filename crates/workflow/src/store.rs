//! Workflow persistence abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::NaiveDate;
use uuid::Uuid;

use archerp_core::{DomainError, EntityRef, InstanceId, UserId};

use crate::instance::{ApprovalInstance, ApprovalRecord};
use crate::template::WorkflowTemplate;

/// Store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkflowStoreError {
    #[error("instance not found: {0}")]
    InstanceNotFound(String),
    #[error("template not found: {0}")]
    TemplateNotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<WorkflowStoreError> for DomainError {
    fn from(err: WorkflowStoreError) -> Self {
        match err {
            WorkflowStoreError::InstanceNotFound(id) => {
                DomainError::not_found(format!("instance {id}"))
            }
            WorkflowStoreError::TemplateNotFound(code) => {
                DomainError::not_found(format!("template {code}"))
            }
            WorkflowStoreError::Storage(msg) => DomainError::validation(msg),
        }
    }
}

/// Persistence port for templates, instances, records and the daily serial.
///
/// A database-backed implementation maps instance mutation to a row-level
/// lock; the in-memory one serializes everything behind one mutex, which
/// gives the same ordering guarantee at this system's scale.
pub trait WorkflowStore: Send + Sync {
    fn put_template(&self, template: WorkflowTemplate) -> Result<(), WorkflowStoreError>;

    fn template_by_code(&self, code: &str) -> Result<Option<WorkflowTemplate>, WorkflowStoreError>;

    /// Allocate the next daily serial for (code, local date). Monotonic and
    /// gap-free per key until the daily reset.
    fn next_serial(&self, code: &str, date: NaiveDate) -> Result<u32, WorkflowStoreError>;

    /// Insert an instance together with its first batch of pending records.
    fn insert_instance(
        &self,
        instance: ApprovalInstance,
        records: Vec<ApprovalRecord>,
    ) -> Result<(), WorkflowStoreError>;

    fn instance(&self, id: InstanceId) -> Result<Option<ApprovalInstance>, WorkflowStoreError>;

    fn instance_by_number(
        &self,
        number: &str,
    ) -> Result<Option<ApprovalInstance>, WorkflowStoreError>;

    /// The live instance for (workflow code, entity), if any. At most one by
    /// the duplicate-submission invariant.
    fn find_non_terminal(
        &self,
        code: &str,
        entity: &EntityRef,
    ) -> Result<Option<ApprovalInstance>, WorkflowStoreError>;

    fn update_instance(&self, instance: &ApprovalInstance) -> Result<(), WorkflowStoreError>;

    fn insert_records(&self, records: Vec<ApprovalRecord>) -> Result<(), WorkflowStoreError>;

    fn update_record(&self, record: &ApprovalRecord) -> Result<(), WorkflowStoreError>;

    fn records_for_instance(
        &self,
        instance: InstanceId,
    ) -> Result<Vec<ApprovalRecord>, WorkflowStoreError>;

    fn pending_records_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<ApprovalRecord>, WorkflowStoreError>;

    fn non_terminal_instances(&self) -> Result<Vec<ApprovalInstance>, WorkflowStoreError>;

    fn history_for_entity(
        &self,
        entity: &EntityRef,
    ) -> Result<Vec<ApprovalInstance>, WorkflowStoreError>;
}

#[derive(Debug, Default)]
struct Inner {
    templates: HashMap<String, WorkflowTemplate>,
    instances: HashMap<InstanceId, ApprovalInstance>,
    by_number: HashMap<String, InstanceId>,
    records: HashMap<Uuid, ApprovalRecord>,
    serials: HashMap<(String, NaiveDate), u32>,
}

/// In-memory store for tests and in-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    inner: Mutex<Inner>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkflowStore for InMemoryWorkflowStore {
    fn put_template(&self, template: WorkflowTemplate) -> Result<(), WorkflowStoreError> {
        self.inner
            .lock()
            .unwrap()
            .templates
            .insert(template.code.clone(), template);
        Ok(())
    }

    fn template_by_code(&self, code: &str) -> Result<Option<WorkflowTemplate>, WorkflowStoreError> {
        Ok(self.inner.lock().unwrap().templates.get(code).cloned())
    }

    fn next_serial(&self, code: &str, date: NaiveDate) -> Result<u32, WorkflowStoreError> {
        let mut inner = self.inner.lock().unwrap();
        let counter = inner.serials.entry((code.to_string(), date)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn insert_instance(
        &self,
        instance: ApprovalInstance,
        records: Vec<ApprovalRecord>,
    ) -> Result<(), WorkflowStoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.by_number.insert(instance.number.clone(), instance.id);
        inner.instances.insert(instance.id, instance);
        for record in records {
            inner.records.insert(record.id, record);
        }
        Ok(())
    }

    fn instance(&self, id: InstanceId) -> Result<Option<ApprovalInstance>, WorkflowStoreError> {
        Ok(self.inner.lock().unwrap().instances.get(&id).cloned())
    }

    fn instance_by_number(
        &self,
        number: &str,
    ) -> Result<Option<ApprovalInstance>, WorkflowStoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .by_number
            .get(number)
            .and_then(|id| inner.instances.get(id))
            .cloned())
    }

    fn find_non_terminal(
        &self,
        code: &str,
        entity: &EntityRef,
    ) -> Result<Option<ApprovalInstance>, WorkflowStoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .instances
            .values()
            .find(|i| !i.is_terminal() && i.workflow_code == code && &i.entity == entity)
            .cloned())
    }

    fn update_instance(&self, instance: &ApprovalInstance) -> Result<(), WorkflowStoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.instances.contains_key(&instance.id) {
            return Err(WorkflowStoreError::InstanceNotFound(instance.id.to_string()));
        }
        inner.instances.insert(instance.id, instance.clone());
        Ok(())
    }

    fn insert_records(&self, records: Vec<ApprovalRecord>) -> Result<(), WorkflowStoreError> {
        let mut inner = self.inner.lock().unwrap();
        for record in records {
            inner.records.insert(record.id, record);
        }
        Ok(())
    }

    fn update_record(&self, record: &ApprovalRecord) -> Result<(), WorkflowStoreError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.records.contains_key(&record.id) {
            return Err(WorkflowStoreError::Storage(format!(
                "record {} not found",
                record.id
            )));
        }
        inner.records.insert(record.id, record.clone());
        Ok(())
    }

    fn records_for_instance(
        &self,
        instance: InstanceId,
    ) -> Result<Vec<ApprovalRecord>, WorkflowStoreError> {
        let mut records: Vec<ApprovalRecord> = self
            .inner
            .lock()
            .unwrap()
            .records
            .values()
            .filter(|r| r.instance == instance)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    fn pending_records_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<ApprovalRecord>, WorkflowStoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .records
            .values()
            .filter(|r| r.approver == user && r.is_pending())
            .cloned()
            .collect())
    }

    fn non_terminal_instances(&self) -> Result<Vec<ApprovalInstance>, WorkflowStoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .instances
            .values()
            .filter(|i| !i.is_terminal())
            .cloned()
            .collect())
    }

    fn history_for_entity(
        &self,
        entity: &EntityRef,
    ) -> Result<Vec<ApprovalInstance>, WorkflowStoreError> {
        let mut found: Vec<ApprovalInstance> = self
            .inner
            .lock()
            .unwrap()
            .instances
            .values()
            .filter(|i| &i.entity == entity)
            .cloned()
            .collect();
        found.sort_by_key(|i| i.applied_at);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serials_are_monotonic_per_code_and_date_and_reset_daily() {
        let store = InMemoryWorkflowStore::new();
        let d1 = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();

        assert_eq!(store.next_serial("wf_a", d1).unwrap(), 1);
        assert_eq!(store.next_serial("wf_a", d1).unwrap(), 2);
        assert_eq!(store.next_serial("wf_b", d1).unwrap(), 1);
        assert_eq!(store.next_serial("wf_a", d2).unwrap(), 1);
        assert_eq!(store.next_serial("wf_a", d1).unwrap(), 3);
    }
}
