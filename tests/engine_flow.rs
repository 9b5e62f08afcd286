//! End-to-end engine flows on the in-memory store: session guard rules,
//! the auto-checkout countdown timeline, the sweep, and the absence
//! report consistency guarantee.

mod common;

use chrono::{Duration, NaiveDate};

use attendance_engine::engine::error::EngineError;
use attendance_engine::engine::presence::PresenceDecision;
use attendance_engine::engine::store::{
    AttendanceStore, CheckoutType, LocationEvidence, PendingStatus, ViolationReason,
};

use common::{at, default_settings, employee, fixture, TENANT};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
}

#[tokio::test]
async fn second_check_in_is_rejected_while_a_session_is_open() {
    let f = fixture(default_settings());
    f.directory.add_employee(employee(1, "John Doe"));

    let first = f
        .engine
        .check_in(TENANT, 1, LocationEvidence::default(), at(9, 0, 0))
        .await;
    assert!(first.is_ok());

    let second = f
        .engine
        .check_in(TENANT, 1, LocationEvidence::default(), at(9, 1, 0))
        .await;
    assert!(matches!(second, Err(EngineError::DuplicateOpenSession)));
}

#[tokio::test]
async fn concurrent_check_ins_admit_exactly_one() {
    let f = fixture(default_settings());
    f.directory.add_employee(employee(1, "John Doe"));

    let (e1, e2) = (f.engine.clone(), f.engine.clone());
    let (a, b) = tokio::join!(
        tokio::spawn(async move {
            e1.check_in(TENANT, 1, LocationEvidence::default(), at(9, 0, 0))
                .await
        }),
        tokio::spawn(async move {
            e2.check_in(TENANT, 1, LocationEvidence::default(), at(9, 0, 0))
                .await
        }),
    );
    let results = [a.unwrap(), b.unwrap()];

    let oks = results.iter().filter(|r| r.is_ok()).count();
    let dups = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::DuplicateOpenSession)))
        .count();
    assert_eq!(oks, 1);
    assert_eq!(dups, 1);
}

#[tokio::test]
async fn check_out_is_idempotent_and_keeps_the_first_duration() {
    let f = fixture(default_settings());
    f.directory.add_employee(employee(1, "John Doe"));

    let session_id = f
        .engine
        .check_in(TENANT, 1, LocationEvidence::default(), at(9, 0, 0))
        .await
        .unwrap();

    let working = f
        .engine
        .check_out(TENANT, session_id, at(17, 0, 0))
        .await
        .unwrap();
    assert_eq!(working, 8 * 3600);

    // Second call: AlreadyClosed, no silent overwrite.
    let again = f.engine.check_out(TENANT, session_id, at(18, 0, 0)).await;
    assert!(matches!(again, Err(EngineError::AlreadyClosed)));

    let session = f.store.find_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.working_secs, Some(8 * 3600));
    assert_eq!(session.check_out, Some(at(17, 0, 0)));
    assert_eq!(session.checkout_type, Some(CheckoutType::Manual));
}

#[tokio::test]
async fn countdown_timeline_created_active_executed() {
    let f = fixture(default_settings());
    f.directory.add_employee(employee(1, "John Doe"));
    let session_id = f
        .engine
        .check_in(TENANT, 1, LocationEvidence::default(), at(9, 0, 0))
        .await
        .unwrap();

    let t0 = at(10, 0, 0);

    // t=0: out of zone -> fresh countdown, deadline = t0 + 300s.
    let d = f
        .engine
        .record_heartbeat(TENANT, 1, session_id, false, true, Default::default(), t0)
        .await
        .unwrap();
    assert_eq!(
        d,
        PresenceDecision::PendingCreated {
            reason: ViolationReason::OutOfZone,
            deadline: t0 + Duration::seconds(300),
        }
    );

    // t=100: still violating, countdown continues with 200s left.
    let d = f
        .engine
        .record_heartbeat(
            TENANT,
            1,
            session_id,
            false,
            true,
            Default::default(),
            t0 + Duration::seconds(100),
        )
        .await
        .unwrap();
    assert_eq!(
        d,
        PresenceDecision::PendingActive {
            reason: ViolationReason::OutOfZone,
            deadline: t0 + Duration::seconds(300),
            seconds_remaining: 200,
        }
    );

    // t=310: deadline passed, forced checkout at this heartbeat's time.
    let t310 = t0 + Duration::seconds(310);
    let d = f
        .engine
        .record_heartbeat(TENANT, 1, session_id, false, true, Default::default(), t310)
        .await
        .unwrap();
    assert_eq!(
        d,
        PresenceDecision::CheckoutExecuted {
            reason: ViolationReason::OutOfZone,
        }
    );

    let session = f.store.find_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.check_out, Some(t310));
    assert_eq!(session.checkout_type, Some(CheckoutType::Automatic));
    assert_eq!(session.checkout_reason, Some(ViolationReason::OutOfZone));
}

#[tokio::test]
async fn recovery_cancels_and_a_new_violation_starts_a_fresh_countdown() {
    let f = fixture(default_settings());
    f.directory.add_employee(employee(1, "John Doe"));
    let session_id = f
        .engine
        .check_in(TENANT, 1, LocationEvidence::default(), at(9, 0, 0))
        .await
        .unwrap();

    let t0 = at(10, 0, 0);
    let first = f
        .engine
        .record_heartbeat(TENANT, 1, session_id, false, true, Default::default(), t0)
        .await
        .unwrap();
    let PresenceDecision::PendingCreated {
        deadline: first_deadline,
        ..
    } = first
    else {
        panic!("expected PendingCreated, got {first:?}");
    };

    // Recovery before the deadline cancels.
    let d = f
        .engine
        .record_heartbeat(
            TENANT,
            1,
            session_id,
            true,
            true,
            Default::default(),
            t0 + Duration::seconds(60),
        )
        .await
        .unwrap();
    assert_eq!(d, PresenceDecision::PendingCancelled);

    // A clean heartbeat after cancellation has no residual countdown.
    let d = f
        .engine
        .record_heartbeat(
            TENANT,
            1,
            session_id,
            true,
            true,
            Default::default(),
            t0 + Duration::seconds(90),
        )
        .await
        .unwrap();
    assert_eq!(d, PresenceDecision::Ok);

    // Fresh-start law: the second violation's deadline is measured from
    // its own heartbeat, strictly later than the first deadline.
    let t2 = t0 + Duration::seconds(120);
    let d = f
        .engine
        .record_heartbeat(TENANT, 1, session_id, false, true, Default::default(), t2)
        .await
        .unwrap();
    assert_eq!(
        d,
        PresenceDecision::PendingCreated {
            reason: ViolationReason::OutOfZone,
            deadline: t2 + Duration::seconds(300),
        }
    );
    assert!(t2 + Duration::seconds(300) > first_deadline);

    // Terminal rows are never resurrected: two rows exist, one cancelled
    // and one pending.
    let history = f.store.pending_history(1);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, PendingStatus::Cancelled);
    assert_eq!(history[1].status, PendingStatus::Pending);
}

#[tokio::test]
async fn gps_invalidity_takes_reason_precedence_over_zone() {
    let f = fixture(default_settings());
    f.directory.add_employee(employee(1, "John Doe"));
    let session_id = f
        .engine
        .check_in(TENANT, 1, LocationEvidence::default(), at(9, 0, 0))
        .await
        .unwrap();

    let d = f
        .engine
        .record_heartbeat(
            TENANT,
            1,
            session_id,
            false,
            false,
            Default::default(),
            at(10, 0, 0),
        )
        .await
        .unwrap();
    assert!(matches!(
        d,
        PresenceDecision::PendingCreated {
            reason: ViolationReason::GpsInvalid,
            ..
        }
    ));
}

#[tokio::test]
async fn zero_countdown_checks_out_on_the_first_violation() {
    let mut settings = default_settings();
    settings.countdown_seconds = 0;
    let f = fixture(settings);
    f.directory.add_employee(employee(1, "John Doe"));
    let session_id = f
        .engine
        .check_in(TENANT, 1, LocationEvidence::default(), at(9, 0, 0))
        .await
        .unwrap();

    let d = f
        .engine
        .record_heartbeat(
            TENANT,
            1,
            session_id,
            false,
            true,
            Default::default(),
            at(10, 0, 0),
        )
        .await
        .unwrap();
    assert_eq!(
        d,
        PresenceDecision::CheckoutExecuted {
            reason: ViolationReason::OutOfZone,
        }
    );
    let session = f.store.find_session(session_id).await.unwrap().unwrap();
    assert!(!session.is_open());
}

#[tokio::test]
async fn disabled_auto_checkout_still_records_heartbeats() {
    let mut settings = default_settings();
    settings.auto_checkout_enabled = false;
    let f = fixture(settings);
    f.directory.add_employee(employee(1, "John Doe"));
    let session_id = f
        .engine
        .check_in(TENANT, 1, LocationEvidence::default(), at(9, 0, 0))
        .await
        .unwrap();

    let d = f
        .engine
        .record_heartbeat(
            TENANT,
            1,
            session_id,
            false,
            false,
            Default::default(),
            at(10, 0, 0),
        )
        .await
        .unwrap();
    assert_eq!(d, PresenceDecision::Ok);

    // Recorded for observability, but no countdown exists.
    let hb = f.store.heartbeat(1).unwrap();
    assert_eq!(hb.violation, Some(ViolationReason::GpsInvalid));
    assert!(f.store.pending_history(1).is_empty());
}

#[tokio::test]
async fn manual_check_out_cancels_the_pending_countdown() {
    let f = fixture(default_settings());
    f.directory.add_employee(employee(1, "John Doe"));
    let session_id = f
        .engine
        .check_in(TENANT, 1, LocationEvidence::default(), at(9, 0, 0))
        .await
        .unwrap();

    f.engine
        .record_heartbeat(
            TENANT,
            1,
            session_id,
            false,
            true,
            Default::default(),
            at(10, 0, 0),
        )
        .await
        .unwrap();

    f.engine
        .check_out(TENANT, session_id, at(10, 2, 0))
        .await
        .unwrap();

    // No dangling pending row referencing the closed session.
    let history = f.store.pending_history(1);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, PendingStatus::Cancelled);
}

#[tokio::test]
async fn sweep_executes_expired_countdowns_without_heartbeats() {
    let f = fixture(default_settings());
    f.directory.add_employee(employee(1, "John Doe"));
    let session_id = f
        .engine
        .check_in(TENANT, 1, LocationEvidence::default(), at(9, 0, 0))
        .await
        .unwrap();

    // Violation observed, then the device goes offline.
    f.engine
        .record_heartbeat(
            TENANT,
            1,
            session_id,
            false,
            true,
            Default::default(),
            at(10, 0, 0),
        )
        .await
        .unwrap();

    // Sweep before the deadline does nothing.
    let executed = f.engine.sweep_expired(TENANT, at(10, 2, 0)).await.unwrap();
    assert_eq!(executed, 0);

    // After the deadline it force-closes via the same transition.
    let executed = f.engine.sweep_expired(TENANT, at(10, 6, 0)).await.unwrap();
    assert_eq!(executed, 1);

    let session = f.store.find_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.checkout_type, Some(CheckoutType::Automatic));
    assert_eq!(session.checkout_reason, Some(ViolationReason::OutOfZone));

    let history = f.store.pending_history(1);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, PendingStatus::Completed);
}

#[tokio::test]
async fn heartbeat_for_a_closed_session_is_stale_and_ignored() {
    let f = fixture(default_settings());
    f.directory.add_employee(employee(1, "John Doe"));
    let session_id = f
        .engine
        .check_in(TENANT, 1, LocationEvidence::default(), at(9, 0, 0))
        .await
        .unwrap();
    f.engine
        .check_out(TENANT, session_id, at(17, 0, 0))
        .await
        .unwrap();

    let d = f
        .engine
        .record_heartbeat(
            TENANT,
            1,
            session_id,
            false,
            false,
            Default::default(),
            at(17, 1, 0),
        )
        .await
        .unwrap();
    assert_eq!(d, PresenceDecision::Ok);
    assert!(f.store.pending_history(1).is_empty());
}

#[tokio::test]
async fn absence_report_count_always_matches_the_list() {
    let f = fixture(default_settings());
    // Carol checked in late, Bob is on leave, Dave has a free task,
    // Alice and Erin never showed up.
    f.directory.add_employee(employee(1, "Erin Absent"));
    f.directory.add_employee(employee(2, "Bob Leave"));
    f.directory.add_employee(employee(3, "Carol Present"));
    f.directory.add_employee(employee(4, "Dave Task"));
    f.directory.add_employee(employee(5, "Alice Absent"));
    f.directory.add_leave(TENANT, 2, day(), day());
    f.directory.add_free_task(TENANT, 4, day(), day());
    f.engine
        .check_in(TENANT, 3, LocationEvidence::default(), at(9, 20, 0))
        .await
        .unwrap();

    // Well past the 10:15 deadline.
    let report = f
        .engine
        .absence_report(TENANT, day(), at(23, 0, 0))
        .await
        .unwrap();

    assert_eq!(report.count, report.employees.len() as u64);
    let names: Vec<&str> = report
        .employees
        .iter()
        .map(|e| e.display_name.as_str())
        .collect();
    // Ordered by display name, absent only.
    assert_eq!(names, vec!["Alice Absent", "Erin Absent"]);

    let count = f
        .engine
        .absent_count(TENANT, day(), at(23, 0, 0))
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn present_now_lists_open_sessions_with_shared_lateness_formula() {
    let f = fixture(default_settings());
    let mut branch_emp = employee(1, "John Doe");
    branch_emp.branch_id = Some(7);
    f.directory.add_employee(branch_emp);
    f.directory.add_employee(employee(2, "Jane Roe"));

    f.engine
        .check_in(TENANT, 1, LocationEvidence::default(), at(9, 20, 0))
        .await
        .unwrap();
    let closed = f
        .engine
        .check_in(TENANT, 2, LocationEvidence::default(), at(9, 0, 0))
        .await
        .unwrap();
    f.engine.check_out(TENANT, closed, at(12, 0, 0)).await.unwrap();

    let present = f.engine.present_now(TENANT, None, at(13, 0, 0)).await.unwrap();
    assert_eq!(present.len(), 1);
    assert_eq!(present[0].employee_id, 1);
    // 09:20 check-in against 09:00 + 15 grace.
    assert_eq!(present[0].minutes_late, 5);

    // Branch filter.
    let present = f
        .engine
        .present_now(TENANT, Some(7), at(13, 0, 0))
        .await
        .unwrap();
    assert_eq!(present.len(), 1);
    let present = f
        .engine
        .present_now(TENANT, Some(8), at(13, 0, 0))
        .await
        .unwrap();
    assert!(present.is_empty());
}

#[tokio::test]
async fn inactive_employee_cannot_check_in() {
    let f = fixture(default_settings());
    let mut emp = employee(1, "John Doe");
    emp.active = false;
    f.directory.add_employee(emp);

    let result = f
        .engine
        .check_in(TENANT, 1, LocationEvidence::default(), at(9, 0, 0))
        .await;
    assert!(matches!(
        result,
        Err(EngineError::EmployeeInactiveOrNotFound)
    ));
}

#[tokio::test]
async fn missing_tenant_settings_fall_back_to_defaults() {
    let store = std::sync::Arc::new(attendance_engine::engine::memory::MemoryStore::new());
    let directory = std::sync::Arc::new(attendance_engine::engine::memory::MemoryDirectory::new());
    // No settings row for the tenant at all.
    directory.add_employee(employee(1, "John Doe"));
    let engine = attendance_engine::engine::AttendanceEngine::new(store, directory);

    let session_id = engine
        .check_in(TENANT, 1, LocationEvidence::default(), at(9, 0, 0))
        .await
        .unwrap();

    // Default countdown is 300s.
    let d = engine
        .record_heartbeat(
            TENANT,
            1,
            session_id,
            false,
            true,
            Default::default(),
            at(10, 0, 0),
        )
        .await
        .unwrap();
    assert_eq!(
        d,
        PresenceDecision::PendingCreated {
            reason: ViolationReason::OutOfZone,
            deadline: at(10, 5, 0),
        }
    );
}
