//! The approval engine: submission, decisions, withdrawal, timeout scanning.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, info, warn};
use uuid::Uuid;

use archerp_core::{DomainError, DomainResult, EntityRef, EntitySnapshot, InstanceId, UserId};
use archerp_directory::Directory;
use archerp_notify::{Notifier, Severity};

use crate::instance::{
    ApprovalInstance, ApprovalRecord, InstanceStatus, RecordResult, format_instance_number,
};
use crate::node::{ApprovalMode, ApprovalNode, NodeKind};
use crate::registry::{CallbackRegistry, TerminalEvent};
use crate::resolve::resolve_approvers;
use crate::store::WorkflowStore;
use crate::template::{TimeoutPolicy, WorkflowTemplate};

/// Synthetic actor for records fabricated by the timeout policy.
pub fn system_user() -> UserId {
    UserId::from_uuid(Uuid::nil())
}

/// Action an approver can take on the current node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Approve,
    Reject,
    Transfer,
}

/// Outcome of evaluating a node's record set against its approval mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeOutcome {
    Undecided,
    Approved,
    Rejected,
}

/// The approval engine.
///
/// One mutation at a time: the `mutation` lock is the in-process analogue of
/// the per-instance row lock, so concurrent `decide` calls serialize and each
/// approval-mode evaluation reads a consistent record set. Directory reads for
/// the *entry* node happen before the lock; a database-backed store should
/// likewise resolve approvers before opening its transaction.
pub struct ApprovalEngine {
    store: Arc<dyn WorkflowStore>,
    directory: Arc<dyn Directory>,
    notifier: Arc<dyn Notifier>,
    registry: Arc<CallbackRegistry>,
    /// Business-local calendar for the daily instance-number serial.
    timezone: Tz,
    mutation: Mutex<()>,
}

impl ApprovalEngine {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
        registry: Arc<CallbackRegistry>,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            registry,
            timezone: chrono_tz::Asia::Shanghai,
            mutation: Mutex::new(()),
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Submit an entity for approval under the named workflow.
    pub fn submit_for_approval(
        &self,
        workflow_code: &str,
        entity: EntityRef,
        snapshot: EntitySnapshot,
        applicant: UserId,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<ApprovalInstance> {
        let template = self.load_template(workflow_code)?;
        if !template.is_active() {
            return Err(DomainError::inactive_template(workflow_code.to_string()));
        }
        if !template.applies_to(&entity.model) {
            return Err(DomainError::not_applicable(format!(
                "`{workflow_code}` does not apply to `{}`",
                entity.model
            )));
        }
        if self.store.find_non_terminal(workflow_code, &entity)?.is_some() {
            return Err(DomainError::duplicate(format!(
                "{entity} already has a live `{workflow_code}` instance"
            )));
        }

        // Directory reads happen before the mutation lock.
        let entry = self.plan_activation(&template, applicant, &snapshot, None)?;

        let _guard = self.mutation.lock().unwrap();
        // Duplicate re-check under the lock closes the race with a concurrent
        // submission of the same entity.
        if self.store.find_non_terminal(workflow_code, &entity)?.is_some() {
            return Err(DomainError::duplicate(format!(
                "{entity} already has a live `{workflow_code}` instance"
            )));
        }

        let local_date = now.with_timezone(&self.timezone).date_naive();
        let serial = self.store.next_serial(workflow_code, local_date)?;
        let number = format_instance_number(workflow_code, local_date, serial);

        let mut instance = ApprovalInstance {
            id: InstanceId::new(),
            number: number.clone(),
            template_id: template.id,
            workflow_code: workflow_code.to_string(),
            entity,
            snapshot,
            applicant,
            comment,
            applied_at: now,
            current_node: None,
            node_entered_at: None,
            timeout_notified_at: None,
            status: InstanceStatus::Pending,
            finished_at: None,
            callback_warning: None,
        };

        match entry {
            Some((sequence, approvers)) => {
                instance.current_node = Some(sequence);
                instance.node_entered_at = Some(now);
                let records: Vec<ApprovalRecord> = approvers
                    .iter()
                    .map(|a| ApprovalRecord::pending(instance.id, sequence, *a, now))
                    .collect();
                self.store.insert_instance(instance.clone(), records)?;
                info!(number = %number, node = sequence, "approval instance started");
                self.notify_assignment(&template, &instance, &approvers, now);
            }
            None => {
                // Every approval node was optional and skipped: terminal
                // approval with nobody to ask.
                self.store.insert_instance(instance.clone(), Vec::new())?;
                self.finish(&mut instance, InstanceStatus::Approved, now)?;
            }
        }
        Ok(instance)
    }

    /// Record an approver's decision on the instance's current node.
    pub fn decide(
        &self,
        instance_number: &str,
        approver: UserId,
        action: DecisionAction,
        comment: Option<String>,
        target: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<ApprovalInstance> {
        let _guard = self.mutation.lock().unwrap();

        let mut instance = self.load_instance(instance_number)?;
        if instance.is_terminal() {
            return Err(DomainError::illegal_transition(format!(
                "instance {instance_number} is already {:?}",
                instance.status
            )));
        }
        let template = self.load_template(&instance.workflow_code)?;
        let sequence = instance.current_node.ok_or_else(|| {
            DomainError::illegal_transition(format!("instance {instance_number} has no active node"))
        })?;
        let node = template.node(sequence).ok_or_else(|| {
            DomainError::validation(format!("node {sequence} missing from template"))
        })?;

        match action {
            DecisionAction::Reject if !(template.allow_reject && node.can_reject) => {
                return Err(DomainError::illegal_transition(format!(
                    "node `{}` does not allow rejection",
                    node.name
                )));
            }
            DecisionAction::Transfer if !(template.allow_transfer && node.can_transfer) => {
                return Err(DomainError::illegal_transition(format!(
                    "node `{}` does not allow transfer",
                    node.name
                )));
            }
            DecisionAction::Transfer if target.is_none() => {
                return Err(DomainError::validation("transfer requires a target user"));
            }
            _ => {}
        }

        let records = self.store.records_for_instance(instance.id)?;
        let mut own = records
            .iter()
            .find(|r| r.node_sequence == sequence && r.approver == approver && r.is_pending())
            .cloned()
            .ok_or_else(|| {
                DomainError::not_authorized(format!(
                    "{approver} has no pending record on node `{}`",
                    node.name
                ))
            })?;

        own.comment = comment;
        own.decided_at = Some(now);
        own.result = match action {
            DecisionAction::Approve => RecordResult::Approved,
            DecisionAction::Reject => RecordResult::Rejected,
            DecisionAction::Transfer => RecordResult::Transferred,
        };
        if action == DecisionAction::Transfer {
            own.transfer_target = target;
        }

        if instance.status == InstanceStatus::Pending {
            instance.status = InstanceStatus::InProgress;
        }

        if let DecisionAction::Transfer = action {
            let target = target.expect("checked above");
            self.store.update_record(&own)?;
            self.store.insert_records(vec![ApprovalRecord::pending(
                instance.id,
                sequence,
                target,
                now,
            )])?;
            self.store.update_instance(&instance)?;
            info!(number = %instance.number, from = %approver, to = %target, "approval transferred");
            self.notify_assignment(&template, &instance, &[target], now);
            return Ok(instance);
        }

        // Evaluate against the records as they will stand once `own` lands,
        // so the successor can be resolved before anything is written.
        let mut would_be = records.clone();
        if let Some(slot) = would_be.iter_mut().find(|r| r.id == own.id) {
            *slot = own.clone();
        }

        match self.evaluate_node(&would_be, node) {
            NodeOutcome::Undecided => {
                self.store.update_record(&own)?;
                self.store.update_instance(&instance)?;
                Ok(instance)
            }
            NodeOutcome::Approved => {
                // Resolve the next node's approvers first. A resolution
                // failure must leave the current node untouched so the
                // decision can be retried once the directory is fixed.
                let entry = self.plan_activation(
                    &template,
                    instance.applicant,
                    &instance.snapshot,
                    Some(sequence),
                )?;
                self.store.update_record(&own)?;
                self.cancel_pending(instance.id, Some(sequence))?;
                self.apply_activation(&template, &mut instance, entry, now)?;
                Ok(instance)
            }
            NodeOutcome::Rejected => {
                self.store.update_record(&own)?;
                self.cancel_pending(instance.id, None)?;
                self.finish(&mut instance, InstanceStatus::Rejected, now)?;
                Ok(instance)
            }
        }
    }

    /// Withdraw a live instance. Applicant-only.
    pub fn withdraw(
        &self,
        instance_number: &str,
        caller: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<ApprovalInstance> {
        let _guard = self.mutation.lock().unwrap();

        let mut instance = self.load_instance(instance_number)?;
        if !matches!(
            instance.status,
            InstanceStatus::Pending | InstanceStatus::InProgress
        ) {
            return Err(DomainError::illegal_transition(format!(
                "cannot withdraw an instance in status {:?}",
                instance.status
            )));
        }
        let template = self.load_template(&instance.workflow_code)?;
        if !template.allow_withdraw {
            return Err(DomainError::illegal_transition(format!(
                "template `{}` does not allow withdrawal",
                template.code
            )));
        }
        if instance.applicant != caller {
            return Err(DomainError::not_authorized(format!(
                "{caller} is not the applicant of {instance_number}"
            )));
        }

        self.cancel_pending(instance.id, None)?;
        instance.status = InstanceStatus::Withdrawn;
        instance.current_node = None;
        instance.node_entered_at = None;
        instance.finished_at = Some(now);
        self.store.update_instance(&instance)?;
        info!(number = %instance.number, "approval instance withdrawn");
        Ok(instance)
    }

    /// Walk non-terminal instances and apply each template's timeout policy to
    /// the nodes whose clock has run out. Returns the number of instances
    /// acted on. Safe to re-run: `notify` fires once per node entry, the
    /// auto policies terminate or advance.
    pub fn scan_timeouts(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let _guard = self.mutation.lock().unwrap();
        let mut fired = 0usize;

        for instance in self.store.non_terminal_instances()? {
            let number = instance.number.clone();
            // One broken instance must not starve the rest of the scan; the
            // next pass retries it.
            match self.apply_timeout_policy(instance, now) {
                Ok(true) => fired += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(number = %number, error = %err, "timeout scan skipped instance");
                }
            }
        }
        Ok(fired)
    }

    fn apply_timeout_policy(
        &self,
        mut instance: ApprovalInstance,
        now: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let template = self.load_template(&instance.workflow_code)?;
        let (Some(sequence), Some(entered)) = (instance.current_node, instance.node_entered_at)
        else {
            return Ok(false);
        };
        let Some(node) = template.node(sequence) else {
            return Ok(false);
        };
        let timeout = Duration::hours(template.timeout_hours_for(node));
        if now - entered < timeout {
            return Ok(false);
        }

        match template.timeout_policy {
            TimeoutPolicy::Notify => {
                if instance.timeout_notified_at.is_some() {
                    return Ok(false);
                }
                let pending: Vec<UserId> = self
                    .store
                    .records_for_instance(instance.id)?
                    .into_iter()
                    .filter(|r| r.node_sequence == sequence && r.is_pending())
                    .map(|r| r.approver)
                    .collect();
                warn!(number = %instance.number, node = sequence, "approval timed out, reminding");
                self.notify_timeout_reminder(&template, &instance, &pending, now);
                instance.timeout_notified_at = Some(now);
                self.store.update_instance(&instance)?;
            }
            TimeoutPolicy::AutoApprove => {
                // Resolve the successor before any writes, as in `decide`.
                let entry = self.plan_activation(
                    &template,
                    instance.applicant,
                    &instance.snapshot,
                    Some(sequence),
                )?;
                self.cancel_pending(instance.id, Some(sequence))?;
                let mut fabricated =
                    ApprovalRecord::pending(instance.id, sequence, system_user(), now);
                fabricated.result = RecordResult::Approved;
                fabricated.decided_at = Some(now);
                fabricated.comment = Some("审批超时，系统自动同意".to_string());
                self.store.insert_records(vec![fabricated])?;
                if instance.status == InstanceStatus::Pending {
                    instance.status = InstanceStatus::InProgress;
                }
                info!(number = %instance.number, node = sequence, "approval timed out, auto-approved");
                self.apply_activation(&template, &mut instance, entry, now)?;
            }
            TimeoutPolicy::AutoReject => {
                self.cancel_pending(instance.id, None)?;
                info!(number = %instance.number, node = sequence, "approval timed out, terminated");
                self.finish(&mut instance, InstanceStatus::Timeout, now)?;
            }
        }
        Ok(true)
    }

    /// Re-run the terminal callback after an operator fixed the collaborator.
    pub fn retry_callback(&self, instance_number: &str) -> DomainResult<ApprovalInstance> {
        let _guard = self.mutation.lock().unwrap();
        let mut instance = self.load_instance(instance_number)?;
        let event = match instance.status {
            InstanceStatus::Approved => TerminalEvent::Approved,
            InstanceStatus::Rejected => TerminalEvent::Rejected,
            _ => {
                return Err(DomainError::illegal_transition(format!(
                    "instance {instance_number} has no retryable callback"
                )));
            }
        };
        if instance.callback_warning.is_none() {
            return Ok(instance);
        }
        self.invoke_callback(&mut instance, event);
        self.store.update_instance(&instance)?;
        Ok(instance)
    }

    /// Instances with a pending record assigned to `user`, oldest first.
    pub fn list_pending_for(&self, user: UserId) -> DomainResult<Vec<ApprovalInstance>> {
        let mut ids: Vec<InstanceId> = self
            .store
            .pending_records_for_user(user)?
            .into_iter()
            .map(|r| r.instance)
            .collect();
        ids.sort();
        ids.dedup();

        let mut instances = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(instance) = self.store.instance(id)? {
                if !instance.is_terminal() {
                    instances.push(instance);
                }
            }
        }
        instances.sort_by_key(|i| i.applied_at);
        Ok(instances)
    }

    /// All instances ever run against an entity, oldest first.
    pub fn history(&self, entity: &EntityRef) -> DomainResult<Vec<ApprovalInstance>> {
        Ok(self.store.history_for_entity(entity)?)
    }

    pub fn instance(&self, instance_number: &str) -> DomainResult<ApprovalInstance> {
        self.load_instance(instance_number)
    }

    pub fn records(&self, instance_number: &str) -> DomainResult<Vec<ApprovalRecord>> {
        let instance = self.load_instance(instance_number)?;
        Ok(self.store.records_for_instance(instance.id)?)
    }

    // --- internals -------------------------------------------------------

    fn load_template(&self, code: &str) -> DomainResult<WorkflowTemplate> {
        self.store
            .template_by_code(code)?
            .ok_or_else(|| DomainError::not_found(format!("template `{code}`")))
    }

    fn load_instance(&self, number: &str) -> DomainResult<ApprovalInstance> {
        self.store
            .instance_by_number(number)?
            .ok_or_else(|| DomainError::not_found(format!("instance {number}")))
    }

    /// Find the next approval node to activate after `after` (or the first
    /// when `None`), resolving its approvers.
    ///
    /// Branch nodes guard the approval node that follows them: a false
    /// condition skips it. An optional node with no resolvable approver is
    /// skipped; a required one fails the advance. `None` means the chain is
    /// exhausted.
    fn plan_activation(
        &self,
        template: &WorkflowTemplate,
        applicant: UserId,
        snapshot: &EntitySnapshot,
        after: Option<u32>,
    ) -> DomainResult<Option<(u32, Vec<UserId>)>> {
        let mut skip_next_approval = false;
        for node in template.ordered_nodes() {
            if let Some(after) = after {
                if node.sequence <= after {
                    continue;
                }
            }
            match node.kind {
                NodeKind::Start | NodeKind::End => {}
                NodeKind::Branch => {
                    let holds = node
                        .condition
                        .as_ref()
                        .is_some_and(|c| c.evaluate(snapshot));
                    if !holds {
                        skip_next_approval = true;
                    }
                }
                NodeKind::Approval => {
                    if skip_next_approval {
                        skip_next_approval = false;
                        continue;
                    }
                    let approvers =
                        resolve_approvers(&node.approvers, applicant, self.directory.as_ref())?;
                    if approvers.is_empty() {
                        if node.is_required {
                            return Err(DomainError::no_approver(format!(
                                "required node `{}` resolved no approver",
                                node.name
                            )));
                        }
                        continue;
                    }
                    return Ok(Some((node.sequence, approvers)));
                }
            }
        }
        Ok(None)
    }

    /// Apply the mode's decision table to the node's counting records.
    fn evaluate_node(&self, records: &[ApprovalRecord], node: &ApprovalNode) -> NodeOutcome {
        let counting: Vec<&ApprovalRecord> = records
            .iter()
            .filter(|r| r.node_sequence == node.sequence && r.counts_for_decision())
            .collect();
        let total = counting.len();
        let approvals = counting
            .iter()
            .filter(|r| r.result == RecordResult::Approved)
            .count();
        let rejections = counting
            .iter()
            .filter(|r| r.result == RecordResult::Rejected)
            .count();

        match node.mode {
            ApprovalMode::Single => {
                if approvals >= 1 {
                    NodeOutcome::Approved
                } else if rejections >= 1 {
                    NodeOutcome::Rejected
                } else {
                    NodeOutcome::Undecided
                }
            }
            ApprovalMode::All => {
                if rejections >= 1 {
                    NodeOutcome::Rejected
                } else if total > 0 && approvals == total {
                    NodeOutcome::Approved
                } else {
                    NodeOutcome::Undecided
                }
            }
            ApprovalMode::Majority => {
                if approvals * 2 > total {
                    NodeOutcome::Approved
                } else if total > 0 && rejections * 2 >= total {
                    NodeOutcome::Rejected
                } else {
                    NodeOutcome::Undecided
                }
            }
        }
    }

    /// Move to the planned next node, or finish approved when the chain is
    /// exhausted. The entry comes from `plan_activation`, which callers run
    /// before writing anything for the decided node.
    fn apply_activation(
        &self,
        template: &WorkflowTemplate,
        instance: &mut ApprovalInstance,
        entry: Option<(u32, Vec<UserId>)>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        match entry {
            Some((sequence, approvers)) => {
                instance.current_node = Some(sequence);
                instance.node_entered_at = Some(now);
                instance.timeout_notified_at = None;
                let records: Vec<ApprovalRecord> = approvers
                    .iter()
                    .map(|a| ApprovalRecord::pending(instance.id, sequence, *a, now))
                    .collect();
                self.store.insert_records(records)?;
                self.store.update_instance(instance)?;
                info!(number = %instance.number, node = sequence, "advanced to next node");
                self.notify_assignment(template, instance, &approvers, now);
                Ok(())
            }
            None => self.finish(instance, InstanceStatus::Approved, now),
        }
    }

    /// Terminal transition: status, finish time, callback, applicant notice.
    ///
    /// The callback runs inside the same logical mutation but its failure
    /// never reverts the transition: the error is captured as a warning on
    /// the instance and surfaced for an administrative retry.
    fn finish(
        &self,
        instance: &mut ApprovalInstance,
        status: InstanceStatus,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        instance.status = status;
        instance.current_node = None;
        instance.node_entered_at = None;
        instance.finished_at = Some(now);

        let event = match status {
            InstanceStatus::Approved => Some(TerminalEvent::Approved),
            InstanceStatus::Rejected => Some(TerminalEvent::Rejected),
            _ => None,
        };
        if let Some(event) = event {
            self.invoke_callback(instance, event);
        }
        self.store.update_instance(instance)?;
        info!(number = %instance.number, status = ?status, "approval instance finished");
        self.notify_outcome(instance, now);
        Ok(())
    }

    fn invoke_callback(&self, instance: &mut ApprovalInstance, event: TerminalEvent) {
        let Some(handler) = self.registry.get(&instance.workflow_code, event) else {
            return;
        };
        match handler(instance) {
            Ok(()) => {
                instance.callback_warning = None;
            }
            Err(err) => {
                error!(
                    number = %instance.number,
                    workflow_code = %instance.workflow_code,
                    ?event,
                    error = %err,
                    "terminal callback failed"
                );
                instance.callback_warning = Some(format!("{event:?} callback failed: {err}"));
            }
        }
    }

    fn cancel_pending(&self, instance: InstanceId, node: Option<u32>) -> DomainResult<()> {
        for mut record in self.store.records_for_instance(instance)? {
            if !record.is_pending() {
                continue;
            }
            if let Some(sequence) = node {
                if record.node_sequence != sequence {
                    continue;
                }
            }
            record.result = RecordResult::Cancelled;
            self.store.update_record(&record)?;
        }
        Ok(())
    }

    fn notify_assignment(
        &self,
        template: &WorkflowTemplate,
        instance: &ApprovalInstance,
        approvers: &[UserId],
        now: DateTime<Utc>,
    ) {
        let title = format!("待审批: {}", template.name);
        let body = format!(
            "单号 {}，对象 {}，申请人提交的 {} 等待您审批。",
            instance.number, instance.entity, template.category
        );
        for approver in approvers {
            if let Err(err) = self.notifier.notify(
                *approver,
                &title,
                &body,
                "approval",
                Severity::Info,
                instance_context(instance),
                now,
            ) {
                warn!(number = %instance.number, error = %err, "approver notification failed");
            }
        }
    }

    fn notify_timeout_reminder(
        &self,
        template: &WorkflowTemplate,
        instance: &ApprovalInstance,
        approvers: &[UserId],
        now: DateTime<Utc>,
    ) {
        let title = format!("审批超时提醒: {}", template.name);
        let body = format!("单号 {} 已超过审批时限，请尽快处理。", instance.number);
        for approver in approvers {
            if let Err(err) = self.notifier.notify(
                *approver,
                &title,
                &body,
                "approval_timeout",
                Severity::Warning,
                instance_context(instance),
                now,
            ) {
                warn!(number = %instance.number, error = %err, "timeout reminder failed");
            }
        }
    }

    fn notify_outcome(&self, instance: &ApprovalInstance, now: DateTime<Utc>) {
        let (title, severity) = match instance.status {
            InstanceStatus::Approved => ("审批通过", Severity::Info),
            InstanceStatus::Rejected => ("审批被驳回", Severity::Warning),
            InstanceStatus::Timeout => ("审批超时终止", Severity::Warning),
            _ => return,
        };
        let body = format!("单号 {} 已结束，结果: {title}。", instance.number);
        if let Err(err) = self.notifier.notify(
            instance.applicant,
            title,
            &body,
            "approval_result",
            severity,
            instance_context(instance),
            now,
        ) {
            warn!(number = %instance.number, error = %err, "applicant notification failed");
        }
    }
}

/// Deep-link context carried on every engine notification.
fn instance_context(instance: &ApprovalInstance) -> Map<String, Value> {
    let mut context = Map::new();
    context.insert("instance_number".into(), json!(instance.number));
    context.insert("workflow_code".into(), json!(instance.workflow_code));
    context.insert("entity_model".into(), json!(instance.entity.model));
    context.insert("entity_id".into(), json!(instance.entity.id));
    context
}
