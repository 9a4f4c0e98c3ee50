//! End-to-end wiring tests: approval through callback into settlement and
//! output value, the escalation ladder, and the scheduled scans.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use archerp_core::{DepartmentId, EntityRef, EntitySnapshot, Percent, ProjectId, RoleCode, UserId};
use archerp_directory::{DirectoryUser, InMemoryDirectory};
use archerp_notify::{
    ConfirmationStatus, InMemoryNotificationStore, NotificationService, Notifier,
    RecordingTransport, Severity, Urgency,
};
use archerp_outputvalue::{
    MonetaryBase, OutputValueEvent, OutputValueLedger, OutputValueMilestone, OutputValuePlan,
    OutputValueStage, ProjectRoster,
};
use archerp_settlement::{
    CapRule, ConsumptionFacts, ServiceFeeScheme, SettlementMethod, Tier, TierTable, compute,
};
use archerp_workflow::{
    ApprovalEngine, ApprovalNode, ApproverSpec, CallbackRegistry, DecisionAction,
    InMemoryWorkflowStore, InstanceStatus, TerminalEvent, WorkflowStore, WorkflowTemplate,
};

use crate::jobs::store::JobStore;
use crate::plan::EmptyPlanCalendar;
use crate::scanners::ScanContext;

fn t(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
}

struct Stack {
    engine: Arc<ApprovalEngine>,
    notifications: Arc<NotificationService>,
    directory: Arc<InMemoryDirectory>,
    store: Arc<InMemoryWorkflowStore>,
    registry: Arc<CallbackRegistry>,
}

fn stack() -> Stack {
    let directory = Arc::new(InMemoryDirectory::new());
    let notifications = Arc::new(NotificationService::new(
        Arc::new(InMemoryNotificationStore::new()),
        Arc::new(RecordingTransport::new()),
        directory.clone(),
    ));
    let store = Arc::new(InMemoryWorkflowStore::new());
    let registry = Arc::new(CallbackRegistry::new());
    let engine = Arc::new(ApprovalEngine::new(
        store.clone(),
        directory.clone(),
        notifications.clone(),
        registry.clone(),
    ));
    Stack {
        engine,
        notifications,
        directory,
        store,
        registry,
    }
}

fn user(directory: &InMemoryDirectory, name: &str, department: Option<DepartmentId>) -> UserId {
    let id = UserId::new();
    directory.add_user(DirectoryUser {
        id,
        name: name.to_string(),
        department,
        roles: vec![],
        email: Some(format!("{name}@weihai.example")),
        wecom_id: None,
        active: true,
    });
    id
}

fn context(s: &Stack) -> ScanContext {
    ScanContext {
        engine: s.engine.clone(),
        notifications: s.notifications.clone(),
        plans: Arc::new(EmptyPlanCalendar),
    }
}

/// Settlement-confirmation approval: once the reviewer approves, the callback
/// computes the capped fee and accrues the settlement stage's output value.
#[test]
fn approved_settlement_computes_fee_and_accrues_output_value() {
    let s = stack();
    let reviewer = user(&s.directory, "zhou", None);
    let applicant = user(&s.directory, "lin", None);

    let mut template = WorkflowTemplate::new(
        "settlement_confirmation",
        "结算确认审批",
        "settlement",
        UserId::new(),
        vec![ApprovalNode::approval(
            1,
            "经营审核",
            ApproverSpec::SpecificUsers {
                users: vec![reviewer],
            },
        )],
    )
    .applicable_to(vec!["settlement".into()]);
    template.activate().unwrap();
    s.store.put_template(template).unwrap();

    let scheme = ServiceFeeScheme::new(SettlementMethod::ActualCumulative {
        cumulative_rate: dec!(0.05),
    })
    .with_segmented(TierTable::new(vec![
        Tier {
            threshold: dec!(0),
            rate: dec!(0.05),
        },
        Tier {
            threshold: dec!(2_000_000),
            rate: dec!(0.06),
        },
        Tier {
            threshold: dec!(4_000_000),
            rate: dec!(0.07),
        },
    ]))
    .with_cap(CapRule::TotalCapAmount {
        amount: dec!(250_000),
    });

    let designer_role = RoleCode::new("designer");
    let plan = OutputValuePlan::new(vec![OutputValueStage {
        name: "结算".into(),
        pct: Percent::new(dec!(100)).unwrap(),
        base: MonetaryBase::SettlementAmount,
        milestones: vec![OutputValueMilestone {
            name: "结算确认".into(),
            pct: Percent::new(dec!(100)).unwrap(),
            events: vec![OutputValueEvent {
                trigger: "settlement_confirmed".into(),
                name: "结算完成".into(),
                pct: Percent::new(dec!(100)).unwrap(),
                role: designer_role.clone(),
            }],
        }],
    }]);
    let ledger = Arc::new(OutputValueLedger::new(plan).unwrap());
    let designer = UserId::new();
    let mut roster = ProjectRoster::new();
    roster.insert(designer_role, designer);
    let project = ProjectId::new();

    let accrued = Arc::new(Mutex::new(Vec::<Decimal>::new()));
    let sink = accrued.clone();
    let ledger_in_callback = ledger.clone();
    s.registry.register(
        "settlement_confirmation",
        TerminalEvent::Approved,
        move |instance| {
            let consumption = instance
                .snapshot
                .get_f64("cumulative_consumption")
                .ok_or_else(|| anyhow::anyhow!("snapshot missing consumption"))?;
            let facts = ConsumptionFacts {
                cumulative_consumption: Decimal::try_from(consumption)?,
                ..Default::default()
            };
            let fee = compute(&scheme, &facts)?;
            let record = ledger_in_callback.accrue(
                project,
                "settlement_confirmed",
                fee.final_fee,
                &instance.number,
                &roster,
                Utc::now(),
            )?;
            sink.lock().unwrap().push(record.value);
            Ok(())
        },
    );

    let instance = s
        .engine
        .submit_for_approval(
            "settlement_confirmation",
            EntityRef::new("settlement", "st-1"),
            // 4.5M consumption: 2M at 5% + 2M at 6% + 0.5M at 7% = 255,000,
            // then the total cap trims it to 250,000.
            EntitySnapshot::new().with("cumulative_consumption", serde_json::json!(4_500_000.0)),
            applicant,
            None,
            t(9),
        )
        .unwrap();
    let done = s
        .engine
        .decide(
            &instance.number,
            reviewer,
            DecisionAction::Approve,
            None,
            None,
            t(10),
        )
        .unwrap();
    assert_eq!(done.status, InstanceStatus::Approved);
    assert!(done.callback_warning.is_none());

    let values = accrued.lock().unwrap();
    assert_eq!(values.as_slice(), [dec!(250000.00)]);

    let records = ledger.for_project(project);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].occurrence_id, instance.number);
    assert_eq!(records[0].responsible, designer);
}

/// The escalation ladder driven with a stepped clock: reminder at 2h,
/// supervisor at 4h, phone marker at 6h, silence after confirmation.
#[test]
fn escalation_ladder_steps_through_the_scans() {
    let s = stack();
    let dept = DepartmentId::new();
    let owner = user(&s.directory, "chen", Some(dept));
    let supervisor = user(&s.directory, "director", Some(dept));
    s.directory.set_superior(owner, supervisor);

    let ctx = context(&s);

    let id = s
        .notifications
        .notify(
            owner,
            "安全检查整改",
            "工地 A 区发现隐患，请确认整改。",
            "safety",
            Severity::Critical,
            serde_json::Map::new(),
            t(9),
        )
        .unwrap();
    s.notifications.track(id, Urgency::Urgent).unwrap();

    // Too young for the first rung.
    assert_eq!(ctx.run_escalation_scan(t(10)).unwrap(), 0);

    assert_eq!(ctx.run_escalation_scan(t(11)).unwrap(), 1);
    let c = s.notifications.confirmation(id).unwrap().unwrap();
    assert_eq!(c.escalation_level, 1);

    assert_eq!(ctx.run_escalation_scan(t(13)).unwrap(), 1);
    let c = s.notifications.confirmation(id).unwrap().unwrap();
    assert_eq!(c.escalation_level, 2);
    assert_eq!(c.escalated_to_user, Some(supervisor));

    assert_eq!(ctx.run_escalation_scan(t(15)).unwrap(), 1);
    let c = s.notifications.confirmation(id).unwrap().unwrap();
    assert_eq!(c.escalation_level, 3);

    // Confirmation stops the ladder for good.
    s.notifications.confirm(id, owner, None, t(15)).unwrap();
    assert_eq!(ctx.run_escalation_scan(t(20)).unwrap(), 0);
    let c = s.notifications.confirmation(id).unwrap().unwrap();
    assert_eq!(c.status, ConfirmationStatus::Confirmed);
}

/// Scheduler ticks feed the executor, which runs the scan handlers.
#[test]
fn scheduled_scans_flow_through_the_job_executor() {
    use crate::jobs::{InMemoryJobStore, JobExecutor, JobStatus};
    use crate::scanners::register_scan_handlers;
    use crate::schedule::Scheduler;

    let s = stack();
    let store = Arc::new(InMemoryJobStore::new());
    let mut executor = JobExecutor::new(store.clone());
    register_scan_handlers(&mut executor, context(&s));

    let mut scheduler = Scheduler::standard(chrono_tz::Asia::Shanghai, 15, t(9));
    let due = t(9) + Duration::minutes(15);
    let fired = scheduler.tick(store.as_ref(), due).unwrap();
    // Both interval scans come due on the first interval boundary.
    assert_eq!(fired, 2);

    let ran = executor.run_pending(due);
    assert_eq!(ran, fired);
    assert_eq!(store.list_by_status(&JobStatus::Completed).unwrap().len(), 2);
    assert!(store.list_dead_letters().unwrap().is_empty());

    // A second tick at the same instant enqueues nothing new.
    assert_eq!(scheduler.tick(store.as_ref(), due).unwrap(), 0);
}
