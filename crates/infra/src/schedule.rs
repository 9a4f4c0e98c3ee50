//! Recurring schedule table, evaluated in the business timezone.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::jobs::{Job, JobKind, RetryPolicy};
use crate::jobs::store::{JobStore, JobStoreError};
use crate::plan::TodoCadence;

/// When a recurring job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSpec {
    EveryMinutes(u32),
    Daily { hour: u32, minute: u32 },
    Weekly { weekday: Weekday, hour: u32, minute: u32 },
    /// Fires on the given day of month; months without it are skipped.
    MonthlyDay { day: u32, hour: u32, minute: u32 },
    /// First day of January, April, July, October.
    QuarterStart { hour: u32, minute: u32 },
}

/// Resolve a wall-clock time in `tz` to UTC. A nonexistent local time (DST
/// gap) is pushed forward an hour; an ambiguous one takes the earlier offset.
fn resolve_local(tz: Tz, date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(hour, minute, 0)?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

impl ScheduleSpec {
    /// The first firing time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        match *self {
            ScheduleSpec::EveryMinutes(minutes) => after + Duration::minutes(minutes.max(1) as i64),
            ScheduleSpec::Daily { hour, minute } => {
                let mut date = after.with_timezone(&tz).date_naive();
                loop {
                    if let Some(at) = resolve_local(tz, date, hour, minute) {
                        if at > after {
                            return at;
                        }
                    }
                    date += Duration::days(1);
                }
            }
            ScheduleSpec::Weekly {
                weekday,
                hour,
                minute,
            } => {
                let mut date = after.with_timezone(&tz).date_naive();
                loop {
                    if date.weekday() == weekday {
                        if let Some(at) = resolve_local(tz, date, hour, minute) {
                            if at > after {
                                return at;
                            }
                        }
                    }
                    date += Duration::days(1);
                }
            }
            ScheduleSpec::MonthlyDay { day, hour, minute } => {
                let local = after.with_timezone(&tz).date_naive();
                let (mut year, mut month) = (local.year(), local.month());
                loop {
                    if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                        if let Some(at) = resolve_local(tz, date, hour, minute) {
                            if at > after {
                                return at;
                            }
                        }
                    }
                    month += 1;
                    if month > 12 {
                        month = 1;
                        year += 1;
                    }
                }
            }
            ScheduleSpec::QuarterStart { hour, minute } => {
                let local = after.with_timezone(&tz).date_naive();
                let mut year = local.year();
                loop {
                    for month in [1, 4, 7, 10] {
                        let date = NaiveDate::from_ymd_opt(year, month, 1)
                            .expect("first of month is always valid");
                        if let Some(at) = resolve_local(tz, date, hour, minute) {
                            if at > after {
                                return at;
                            }
                        }
                    }
                    year += 1;
                }
            }
        }
    }
}

/// One row of the schedule table.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub name: String,
    pub kind: JobKind,
    pub spec: ScheduleSpec,
}

impl ScheduleEntry {
    pub fn new(name: impl Into<String>, kind: JobKind, spec: ScheduleSpec) -> Self {
        Self {
            name: name.into(),
            kind,
            spec,
        }
    }
}

/// Tracks the next firing time per entry and enqueues jobs as they come due.
///
/// Ticking is catch-up safe: a tick after a long gap enqueues each overdue
/// entry once and re-anchors its next time after `now`.
pub struct Scheduler {
    tz: Tz,
    entries: Vec<(ScheduleEntry, DateTime<Utc>)>,
}

impl Scheduler {
    pub fn new(tz: Tz, entries: Vec<ScheduleEntry>, start: DateTime<Utc>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| {
                let next = e.spec.next_after(start, tz);
                (e, next)
            })
            .collect();
        Self { tz, entries }
    }

    /// The standard table: approval timeout and escalation scans every
    /// `scan_interval_minutes`; overdue plans daily 09:00; plan tracking
    /// Mon 10:00 and daily 17:00; plan creation quarter-start 09:00 and
    /// monthly on the 20th 10:00.
    pub fn standard(tz: Tz, scan_interval_minutes: u32, start: DateTime<Utc>) -> Self {
        let entries = vec![
            ScheduleEntry::new(
                "approval-timeout-scan",
                JobKind::ApprovalTimeoutScan,
                ScheduleSpec::EveryMinutes(scan_interval_minutes),
            ),
            ScheduleEntry::new(
                "escalation-scan",
                JobKind::EscalationScan,
                ScheduleSpec::EveryMinutes(scan_interval_minutes),
            ),
            ScheduleEntry::new(
                "overdue-plan-scan",
                JobKind::OverduePlanScan,
                ScheduleSpec::Daily { hour: 9, minute: 0 },
            ),
            ScheduleEntry::new(
                "plan-tracking-weekly",
                JobKind::PlanTrackingTodo {
                    cadence: TodoCadence::Weekly,
                },
                ScheduleSpec::Weekly {
                    weekday: Weekday::Mon,
                    hour: 10,
                    minute: 0,
                },
            ),
            ScheduleEntry::new(
                "plan-tracking-daily",
                JobKind::PlanTrackingTodo {
                    cadence: TodoCadence::Daily,
                },
                ScheduleSpec::Daily {
                    hour: 17,
                    minute: 0,
                },
            ),
            ScheduleEntry::new(
                "plan-creation-quarterly",
                JobKind::PlanCreationTodo {
                    cadence: TodoCadence::Quarterly,
                },
                ScheduleSpec::QuarterStart { hour: 9, minute: 0 },
            ),
            ScheduleEntry::new(
                "plan-creation-monthly",
                JobKind::PlanCreationTodo {
                    cadence: TodoCadence::Monthly,
                },
                ScheduleSpec::MonthlyDay {
                    day: 20,
                    hour: 10,
                    minute: 0,
                },
            ),
        ];
        Self::new(tz, entries, start)
    }

    /// Enqueue a job for every entry due at `now`. Returns how many fired.
    pub fn tick(&mut self, store: &dyn JobStore, now: DateTime<Utc>) -> Result<usize, JobStoreError> {
        let mut fired = 0;
        for (entry, next) in &mut self.entries {
            if *next > now {
                continue;
            }
            store.enqueue(
                Job::new(entry.kind.clone(), serde_json::json!({}), now)
                    .with_retry_policy(RetryPolicy::no_retry()),
            )?;
            *next = entry.spec.next_after(now, self.tz);
            fired += 1;
        }
        Ok(fired)
    }

    pub fn next_firings(&self) -> Vec<(&str, DateTime<Utc>)> {
        self.entries
            .iter()
            .map(|(e, next)| (e.name.as_str(), *next))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::JobStatus;

    const SHANGHAI: Tz = chrono_tz::Asia::Shanghai;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn daily_next_is_in_local_time() {
        // 01:00 UTC is 09:00 in Shanghai; the 09:00 local run for that day
        // has already passed, so the next one is tomorrow.
        let spec = ScheduleSpec::Daily { hour: 9, minute: 0 };
        let next = spec.next_after(utc(2026, 3, 2, 1, 0), SHANGHAI);
        assert_eq!(next, utc(2026, 3, 3, 1, 0));

        // 00:30 UTC is 08:30 local; today's run is still ahead.
        let next = spec.next_after(utc(2026, 3, 2, 0, 30), SHANGHAI);
        assert_eq!(next, utc(2026, 3, 2, 1, 0));
    }

    #[test]
    fn weekly_finds_the_next_monday() {
        // 2026-03-02 is a Monday. After Monday 10:00 local the next run is
        // the following Monday.
        let spec = ScheduleSpec::Weekly {
            weekday: Weekday::Mon,
            hour: 10,
            minute: 0,
        };
        let next = spec.next_after(utc(2026, 3, 2, 3, 0), SHANGHAI);
        assert_eq!(next, utc(2026, 3, 9, 2, 0));
    }

    #[test]
    fn monthly_skips_to_next_month_after_the_day() {
        let spec = ScheduleSpec::MonthlyDay {
            day: 20,
            hour: 10,
            minute: 0,
        };
        let next = spec.next_after(utc(2026, 3, 21, 0, 0), SHANGHAI);
        assert_eq!(next, utc(2026, 4, 20, 2, 0));
    }

    #[test]
    fn quarter_start_rolls_into_the_next_year() {
        let spec = ScheduleSpec::QuarterStart { hour: 9, minute: 0 };
        let next = spec.next_after(utc(2026, 11, 15, 0, 0), SHANGHAI);
        assert_eq!(next, utc(2027, 1, 1, 1, 0));

        let next = spec.next_after(utc(2026, 2, 1, 0, 0), SHANGHAI);
        assert_eq!(next, utc(2026, 4, 1, 1, 0));
    }

    #[test]
    fn tick_enqueues_due_entries_once() {
        let store = InMemoryJobStore::new();
        let mut scheduler = Scheduler::new(
            SHANGHAI,
            vec![ScheduleEntry::new(
                "scan",
                JobKind::EscalationScan,
                ScheduleSpec::EveryMinutes(15),
            )],
            utc(2026, 3, 2, 9, 0),
        );

        assert_eq!(scheduler.tick(&store, utc(2026, 3, 2, 9, 10)).unwrap(), 0);
        assert_eq!(scheduler.tick(&store, utc(2026, 3, 2, 9, 15)).unwrap(), 1);
        // Same instant again: already re-anchored.
        assert_eq!(scheduler.tick(&store, utc(2026, 3, 2, 9, 15)).unwrap(), 0);
        // A long gap still fires only once.
        assert_eq!(scheduler.tick(&store, utc(2026, 3, 2, 12, 0)).unwrap(), 1);

        let pending = store.list_by_status(&JobStatus::Pending).unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn standard_table_has_all_recurring_scans() {
        let scheduler = Scheduler::standard(SHANGHAI, 15, utc(2026, 3, 2, 0, 0));
        let names: Vec<&str> = scheduler.next_firings().iter().map(|(n, _)| *n).collect();
        assert_eq!(names.len(), 7);
        assert!(names.contains(&"approval-timeout-scan"));
        assert!(names.contains(&"plan-creation-quarterly"));
    }
}
