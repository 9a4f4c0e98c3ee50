//! End-to-end engine runs against the full notification service, modelled on
//! the customer-management approval: department manager first, then the
//! general manager, with an activation callback on approval.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, TimeZone, Utc};

use archerp_core::{DepartmentId, EntityRef, EntitySnapshot, RoleCode, UserId};
use archerp_directory::{DirectoryUser, InMemoryDirectory};
use archerp_notify::{InMemoryNotificationStore, NotificationService, RecordingTransport};

use crate::engine::{ApprovalEngine, DecisionAction};
use crate::instance::{InstanceStatus, RecordResult};
use crate::node::{ApprovalMode, ApprovalNode, ApproverSpec};
use crate::registry::{CallbackRegistry, TerminalEvent};
use crate::store::{InMemoryWorkflowStore, WorkflowStore};
use crate::template::WorkflowTemplate;

struct World {
    engine: ApprovalEngine,
    directory: Arc<InMemoryDirectory>,
    transport: Arc<RecordingTransport>,
    notifications: Arc<NotificationService>,
    registry: Arc<CallbackRegistry>,
    applicant: UserId,
    manager: UserId,
    general_manager: UserId,
}

fn user(directory: &InMemoryDirectory, name: &str, department: Option<DepartmentId>, roles: Vec<RoleCode>) -> UserId {
    let id = UserId::new();
    directory.add_user(DirectoryUser {
        id,
        name: name.to_string(),
        department,
        roles,
        email: Some(format!("{name}@weihai.example")),
        wecom_id: Some(name.to_string()),
        active: true,
    });
    id
}

/// Two approval nodes: the applicant's department manager, then anyone with
/// the general-manager role.
fn world() -> World {
    let directory = Arc::new(InMemoryDirectory::new());
    let dept = DepartmentId::new();
    let applicant = user(&directory, "lin", Some(dept), vec![]);
    let manager = user(&directory, "zhao", Some(dept), vec![]);
    let general_manager = user(
        &directory,
        "wang",
        None,
        vec![RoleCode::new("general_manager")],
    );
    directory.set_department_manager(dept, manager);

    let store = Arc::new(InMemoryWorkflowStore::new());
    let transport = Arc::new(RecordingTransport::new());
    let notifications = Arc::new(NotificationService::new(
        Arc::new(InMemoryNotificationStore::new()),
        transport.clone(),
        directory.clone(),
    ));
    let registry = Arc::new(CallbackRegistry::new());

    let mut template = WorkflowTemplate::new(
        "customer_management",
        "客户管理审批",
        "customer",
        UserId::new(),
        vec![
            ApprovalNode::approval(1, "部门经理审批", ApproverSpec::DepartmentManagerOfApplicant),
            ApprovalNode::approval(
                2,
                "总经理审批",
                ApproverSpec::RoleMembers {
                    roles: vec![RoleCode::new("general_manager")],
                },
            )
            .with_mode(ApprovalMode::Single),
        ],
    )
    .applicable_to(vec!["customer".into()]);
    template.activate().unwrap();
    store.put_template(template).unwrap();

    let engine = ApprovalEngine::new(
        store,
        directory.clone(),
        notifications.clone(),
        registry.clone(),
    );

    World {
        engine,
        directory,
        transport,
        notifications,
        registry,
        applicant,
        manager,
        general_manager,
    }
}

fn t(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
}

fn snapshot() -> EntitySnapshot {
    EntitySnapshot::new()
        .with("name", serde_json::json!("华东设计院"))
        .with("grade", serde_json::json!("strategic"))
}

#[test]
fn happy_path_activates_the_customer_on_final_approval() {
    let w = world();
    let activated = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = activated.clone();
    w.registry
        .register("customer_management", TerminalEvent::Approved, move |i| {
            sink.lock().unwrap().push(i.entity.id.clone());
            Ok(())
        });

    let instance = w
        .engine
        .submit_for_approval(
            "customer_management",
            EntityRef::new("customer", "cust-42"),
            snapshot(),
            w.applicant,
            Some("新客户入库".into()),
            t(9),
        )
        .unwrap();
    assert_eq!(instance.current_node, Some(1));

    // Node 1 approver came from the directory, not the template.
    let records = w.engine.records(&instance.number).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].approver, w.manager);

    let mid = w
        .engine
        .decide(&instance.number, w.manager, DecisionAction::Approve, None, None, t(10))
        .unwrap();
    assert_eq!(mid.status, InstanceStatus::InProgress);
    assert_eq!(mid.current_node, Some(2));
    assert!(activated.lock().unwrap().is_empty());

    let done = w
        .engine
        .decide(
            &instance.number,
            w.general_manager,
            DecisionAction::Approve,
            Some("同意".into()),
            None,
            t(11),
        )
        .unwrap();
    assert_eq!(done.status, InstanceStatus::Approved);
    assert!(done.callback_warning.is_none());
    assert_eq!(activated.lock().unwrap().as_slice(), ["cust-42"]);

    // Applicant got a terminal in-app notice.
    let inbox = w.notifications.list_for_recipient(w.applicant).unwrap();
    assert!(inbox.iter().any(|n| n.category == "approval_result"));
}

#[test]
fn rejection_at_node_one_never_reaches_the_general_manager() {
    let w = world();
    let rejected = Arc::new(AtomicBool::new(false));
    let flag = rejected.clone();
    w.registry
        .register("customer_management", TerminalEvent::Rejected, move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

    let instance = w
        .engine
        .submit_for_approval(
            "customer_management",
            EntityRef::new("customer", "cust-7"),
            snapshot(),
            w.applicant,
            None,
            t(9),
        )
        .unwrap();

    let done = w
        .engine
        .decide(
            &instance.number,
            w.manager,
            DecisionAction::Reject,
            Some("资料不全".into()),
            None,
            t(10),
        )
        .unwrap();
    assert_eq!(done.status, InstanceStatus::Rejected);
    assert!(rejected.load(Ordering::SeqCst));
    // The rejection notice is warning-severity and goes out over email too.
    assert!(w.transport.email_count() > 0);

    let records = w.engine.records(&instance.number).unwrap();
    assert!(records.iter().all(|r| r.node_sequence == 1));
    let decided = records.iter().find(|r| r.approver == w.manager).unwrap();
    assert_eq!(decided.result, RecordResult::Rejected);
    assert_eq!(decided.comment.as_deref(), Some("资料不全"));

    assert!(
        w.engine
            .list_pending_for(w.general_manager)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn transfer_moves_the_task_between_general_managers() {
    let w = world();
    let deputy = user(&w.directory, "qian", None, vec![]);

    let instance = w
        .engine
        .submit_for_approval(
            "customer_management",
            EntityRef::new("customer", "cust-9"),
            snapshot(),
            w.applicant,
            None,
            t(9),
        )
        .unwrap();
    w.engine
        .decide(&instance.number, w.manager, DecisionAction::Approve, None, None, t(10))
        .unwrap();

    w.engine
        .decide(
            &instance.number,
            w.general_manager,
            DecisionAction::Transfer,
            Some("出差，请代审".into()),
            Some(deputy),
            t(11),
        )
        .unwrap();

    let records = w.engine.records(&instance.number).unwrap();
    let original = records
        .iter()
        .find(|r| r.approver == w.general_manager && r.node_sequence == 2)
        .unwrap();
    assert_eq!(original.result, RecordResult::Transferred);
    assert_eq!(original.transfer_target, Some(deputy));

    // The deputy got an in-app assignment notice.
    let inbox = w.notifications.list_for_recipient(deputy).unwrap();
    assert!(inbox.iter().any(|n| n.category == "approval"));

    let done = w
        .engine
        .decide(&instance.number, deputy, DecisionAction::Approve, None, None, t(12))
        .unwrap();
    assert_eq!(done.status, InstanceStatus::Approved);
}
