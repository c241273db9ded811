//! Integration tests for the replace-and-recompute write path.
//!
//! Tests verify:
//! 1. Month rows roll up into quarter and year rows, only where data exists
//! 2. A resubmission fully replaces the scope's year
//! 3. The department manager's target tracks department total minus peers
//! 4. Invalid requests are rejected before anything is written

use rust_decimal::Decimal;
use sales_targets_core::{
    bulk_update::{BulkUpdateRequest, MonthlyEntry},
    directory::{Department, UserProfile},
    engine::TargetEngine,
    error::TargetError,
    event::TargetEvent,
    permission::Actor,
    record::{Metrics, Period, PeriodKind, ScopeKind, TargetRecord},
    store::TargetFilter,
};

const SALES: i64 = 1;
const LAB: i64 = 2;
const MARA: i64 = 100; // Sales manager
const BEN: i64 = 101;
const CHO: i64 = 102;
const DANA: i64 = 300; // Lab, no manager

fn m(a: i64, b: i64, c: i64) -> Metrics {
    Metrics::new(Decimal::from(a), Decimal::from(b), Decimal::from(c))
}

fn user(id: i64, name: &str, department: Option<i64>) -> UserProfile {
    UserProfile {
        id,
        username: name.into(),
        department,
        is_admin: false,
        reports_to: None,
        assistant_proxy: false,
    }
}

fn build() -> TargetEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    let engine = TargetEngine::build_test().expect("build_test failed");
    let store = &engine.store;
    store
        .insert_department(&Department { id: SALES, name: "Sales".into(), manager: Some(MARA) })
        .unwrap();
    store
        .insert_department(&Department { id: LAB, name: "Lab".into(), manager: None })
        .unwrap();
    store.insert_user(&user(MARA, "mara", Some(SALES))).unwrap();
    store.insert_user(&user(BEN, "ben", Some(SALES))).unwrap();
    store.insert_user(&user(CHO, "cho", Some(SALES))).unwrap();
    store.insert_user(&user(DANA, "dana", Some(LAB))).unwrap();
    engine
}

fn department_request(department: i64, year: i32, entries: Vec<MonthlyEntry>) -> BulkUpdateRequest {
    BulkUpdateRequest {
        year: Some(year),
        scope_kind: ScopeKind::Department,
        user: None,
        department: Some(department),
        entries,
    }
}

fn individual_request(user: i64, year: i32, entries: Vec<MonthlyEntry>) -> BulkUpdateRequest {
    BulkUpdateRequest {
        year: Some(year),
        scope_kind: ScopeKind::Individual,
        user: Some(user),
        department: None,
        entries,
    }
}

fn rows(engine: &TargetEngine, filter: TargetFilter) -> Vec<TargetRecord> {
    engine.find_records(&filter).unwrap()
}

fn user_rows(engine: &TargetEngine, user: i64, year: i32) -> Vec<TargetRecord> {
    rows(
        engine,
        TargetFilter {
            scope_kind: Some(ScopeKind::Individual),
            user: Some(user),
            year: Some(year),
            ..Default::default()
        },
    )
}

fn period_metrics(rows: &[TargetRecord], period: Period) -> Option<Metrics> {
    rows.iter().find(|r| r.period == period).map(|r| r.metrics)
}

/// Every quarter equals its months, the year equals its quarters, and no
/// quarter exists without months.
fn assert_rollups_consistent(rows: &[TargetRecord]) {
    let months: Vec<&TargetRecord> = rows.iter().filter(|r| r.period.kind() == PeriodKind::Month).collect();
    let quarters: Vec<&TargetRecord> = rows.iter().filter(|r| r.period.kind() == PeriodKind::Quarter).collect();
    let years: Vec<&TargetRecord> = rows.iter().filter(|r| r.period == Period::Year).collect();

    for q in 1..=4 {
        let in_quarter: Vec<&&TargetRecord> =
            months.iter().filter(|r| r.period.quarter_number() == Some(q)).collect();
        let quarter_row = quarters.iter().find(|r| r.period == Period::Quarter(q));
        match quarter_row {
            Some(row) => {
                let sum: Metrics = in_quarter.iter().map(|r| &r.metrics).sum();
                assert_eq!(row.metrics, sum, "Q{q} does not equal its months");
            }
            None => assert!(in_quarter.is_empty(), "Q{q} missing although months exist"),
        }
    }

    if months.is_empty() {
        assert!(years.is_empty(), "year row without months");
    } else {
        assert_eq!(years.len(), 1, "expected exactly one year row");
        let sum: Metrics = quarters.iter().map(|r| &r.metrics).sum();
        assert_eq!(years[0].metrics, sum, "year does not equal its quarters");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rollups
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn department_first_quarter_rolls_up() {
    let engine = build();
    let outcome = engine
        .bulk_update_targets(
            &Actor::System,
            &department_request(
                SALES,
                2026,
                vec![
                    MonthlyEntry::new(1, m(100_000, 40_000, 90_000)),
                    MonthlyEntry::new(2, m(120_000, 48_000, 108_000)),
                    MonthlyEntry::new(3, m(150_000, 60_000, 135_000)),
                ],
            ),
        )
        .unwrap();
    assert_eq!(outcome.updated_month_count, 3);

    let dept = rows(
        &engine,
        TargetFilter {
            scope_kind: Some(ScopeKind::Department),
            department: Some(SALES),
            year: Some(2026),
            ..Default::default()
        },
    );
    assert_eq!(dept.len(), 5, "3 months + Q1 + year, got {dept:?}");
    assert_eq!(period_metrics(&dept, Period::Quarter(1)), Some(m(370_000, 148_000, 333_000)));
    assert_eq!(period_metrics(&dept, Period::Year), Some(m(370_000, 148_000, 333_000)));
    for q in 2..=4 {
        assert_eq!(period_metrics(&dept, Period::Quarter(q)), None);
    }
    assert_rollups_consistent(&dept);
}

#[test]
fn sparse_individual_months_keep_rollup_invariant() {
    let engine = build();
    engine
        .bulk_update_targets(
            &Actor::System,
            &individual_request(
                DANA,
                2026,
                vec![
                    MonthlyEntry::new(2, m(10, 1, 4)),
                    MonthlyEntry::new(5, m(20, 2, 5)),
                    MonthlyEntry::new(6, m(30, 3, 6)),
                    MonthlyEntry::new(11, m(40, 4, 7)),
                ],
            ),
        )
        .unwrap();

    let dana = user_rows(&engine, DANA, 2026);
    assert_rollups_consistent(&dana);
    assert_eq!(period_metrics(&dana, Period::Quarter(2)), Some(m(50, 5, 11)));
    assert_eq!(period_metrics(&dana, Period::Quarter(3)), None);
    assert_eq!(period_metrics(&dana, Period::Year), Some(m(100, 10, 22)));
}

#[test]
fn entries_without_month_are_skipped() {
    let engine = build();
    let outcome = engine
        .bulk_update_targets(
            &Actor::System,
            &individual_request(
                DANA,
                2026,
                vec![
                    MonthlyEntry { month: None, metrics: m(999, 999, 999) },
                    MonthlyEntry::new(7, m(1, 2, 3)),
                ],
            ),
        )
        .unwrap();
    assert_eq!(outcome.updated_month_count, 1);
    assert_eq!(period_metrics(&user_rows(&engine, DANA, 2026), Period::Year), Some(m(1, 2, 3)));
}

#[test]
fn company_scope_rolls_up_without_backfill() {
    let engine = build();
    let outcome = engine
        .bulk_update_targets(
            &Actor::System,
            &BulkUpdateRequest {
                year: Some(2026),
                scope_kind: ScopeKind::Company,
                user: None,
                department: None,
                entries: vec![MonthlyEntry::new(12, m(5, 5, 5))],
            },
        )
        .unwrap();
    assert!(outcome.backfilled_months.is_empty());

    let company = rows(
        &engine,
        TargetFilter { scope_kind: Some(ScopeKind::Company), ..Default::default() },
    );
    assert_eq!(company.len(), 3);
    assert_eq!(period_metrics(&company, Period::Quarter(4)), Some(m(5, 5, 5)));
}

// ─────────────────────────────────────────────────────────────────────────────
// Replace semantics
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn resubmission_replaces_previous_months() {
    let engine = build();
    engine
        .bulk_update_targets(
            &Actor::System,
            &individual_request(
                DANA,
                2026,
                vec![
                    MonthlyEntry::new(1, m(1, 1, 1)),
                    MonthlyEntry::new(2, m(2, 2, 2)),
                    MonthlyEntry::new(3, m(3, 3, 3)),
                ],
            ),
        )
        .unwrap();
    engine
        .bulk_update_targets(&Actor::System, &individual_request(DANA, 2026, vec![MonthlyEntry::new(1, m(7, 8, 9))]))
        .unwrap();

    let dana = user_rows(&engine, DANA, 2026);
    let months: Vec<Period> = dana.iter().filter(|r| r.period.kind() == PeriodKind::Month).map(|r| r.period).collect();
    assert_eq!(months, vec![Period::Month(1)]);
    assert_eq!(period_metrics(&dana, Period::Quarter(1)), Some(m(7, 8, 9)));
    assert_eq!(period_metrics(&dana, Period::Year), Some(m(7, 8, 9)));
    assert_eq!(dana.len(), 3);
}

#[test]
fn shrinking_to_half_year_drops_stale_quarters() {
    let engine = build();
    let full: Vec<MonthlyEntry> = (1..=12).map(|mo| MonthlyEntry::new(mo, m(10, 10, 10))).collect();
    let half: Vec<MonthlyEntry> = (1..=6).map(|mo| MonthlyEntry::new(mo, m(10, 10, 10))).collect();

    engine.bulk_update_targets(&Actor::System, &individual_request(DANA, 2026, full)).unwrap();
    assert_eq!(user_rows(&engine, DANA, 2026).len(), 12 + 4 + 1);

    engine.bulk_update_targets(&Actor::System, &individual_request(DANA, 2026, half)).unwrap();
    let dana = user_rows(&engine, DANA, 2026);
    assert_eq!(dana.len(), 6 + 2 + 1);
    assert_eq!(period_metrics(&dana, Period::Quarter(3)), None);
    assert_eq!(period_metrics(&dana, Period::Year), Some(m(60, 60, 60)));
    assert_rollups_consistent(&dana);
}

#[test]
fn empty_submission_clears_the_year_only() {
    let engine = build();
    engine
        .bulk_update_targets(&Actor::System, &individual_request(DANA, 2025, vec![MonthlyEntry::new(3, m(1, 1, 1))]))
        .unwrap();
    engine
        .bulk_update_targets(&Actor::System, &individual_request(DANA, 2026, vec![MonthlyEntry::new(3, m(1, 1, 1))]))
        .unwrap();
    let outcome = engine
        .bulk_update_targets(&Actor::System, &individual_request(DANA, 2026, vec![]))
        .unwrap();

    assert_eq!(outcome.updated_month_count, 0);
    assert!(user_rows(&engine, DANA, 2026).is_empty());
    assert_eq!(user_rows(&engine, DANA, 2025).len(), 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager backfill
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn manager_receives_department_remainder() {
    let engine = build();
    engine
        .bulk_update_targets(
            &Actor::System,
            &department_request(SALES, 2026, vec![MonthlyEntry::new(1, m(100_000, 40_000, 90_000))]),
        )
        .unwrap();
    let outcome = engine
        .bulk_update_targets(
            &Actor::System,
            &individual_request(BEN, 2026, vec![MonthlyEntry::new(1, m(30_000, 10_000, 20_000))]),
        )
        .unwrap();
    assert_eq!(outcome.backfilled_months, vec![1]);

    let mara = user_rows(&engine, MARA, 2026);
    assert_eq!(period_metrics(&mara, Period::Month(1)), Some(m(70_000, 30_000, 70_000)));
    assert_eq!(period_metrics(&mara, Period::Quarter(1)), Some(m(70_000, 30_000, 70_000)));
    assert_eq!(period_metrics(&mara, Period::Year), Some(m(70_000, 30_000, 70_000)));
    assert_rollups_consistent(&mara);
}

#[test]
fn manager_target_never_goes_negative() {
    let engine = build();
    engine
        .bulk_update_targets(&Actor::System, &department_request(SALES, 2026, vec![MonthlyEntry::new(1, m(100_000, 50_000, 10))]))
        .unwrap();
    engine
        .bulk_update_targets(&Actor::System, &individual_request(BEN, 2026, vec![MonthlyEntry::new(1, m(30_000, 5_000, 0))]))
        .unwrap();
    engine
        .bulk_update_targets(&Actor::System, &individual_request(CHO, 2026, vec![MonthlyEntry::new(1, m(80_000, 5_000, 0))]))
        .unwrap();

    let mara = user_rows(&engine, MARA, 2026);
    assert_eq!(period_metrics(&mara, Period::Month(1)), Some(m(0, 40_000, 10)));
}

#[test]
fn department_edit_recomputes_manager() {
    let engine = build();
    engine
        .bulk_update_targets(&Actor::System, &individual_request(BEN, 2026, vec![MonthlyEntry::new(4, m(10, 10, 10))]))
        .unwrap();
    let outcome = engine
        .bulk_update_targets(
            &Actor::System,
            &department_request(SALES, 2026, vec![MonthlyEntry::new(4, m(50, 40, 30)), MonthlyEntry::new(5, m(5, 5, 5))]),
        )
        .unwrap();
    assert_eq!(outcome.backfilled_months, vec![4, 5]);

    let mara = user_rows(&engine, MARA, 2026);
    assert_eq!(period_metrics(&mara, Period::Month(4)), Some(m(40, 30, 20)));
    assert_eq!(period_metrics(&mara, Period::Month(5)), Some(m(5, 5, 5)));
    assert_eq!(period_metrics(&mara, Period::Quarter(2)), Some(m(45, 35, 25)));
    assert_rollups_consistent(&mara);
}

#[test]
fn backfill_is_a_no_op_without_department_baseline() {
    let engine = build();
    engine
        .bulk_update_targets(&Actor::System, &individual_request(MARA, 2026, vec![MonthlyEntry::new(6, m(9, 9, 9))]))
        .unwrap();
    let outcome = engine
        .bulk_update_targets(&Actor::System, &individual_request(BEN, 2026, vec![MonthlyEntry::new(6, m(1, 1, 1))]))
        .unwrap();

    assert!(outcome.backfilled_months.is_empty());
    let mara = user_rows(&engine, MARA, 2026);
    assert_eq!(period_metrics(&mara, Period::Month(6)), Some(m(9, 9, 9)));
}

#[test]
fn removing_a_peer_month_returns_it_to_the_manager() {
    let engine = build();
    engine
        .bulk_update_targets(&Actor::System, &department_request(SALES, 2026, vec![MonthlyEntry::new(2, m(100, 100, 100))]))
        .unwrap();
    engine
        .bulk_update_targets(&Actor::System, &individual_request(BEN, 2026, vec![MonthlyEntry::new(2, m(60, 60, 60))]))
        .unwrap();
    assert_eq!(period_metrics(&user_rows(&engine, MARA, 2026), Period::Month(2)), Some(m(40, 40, 40)));

    let outcome = engine
        .bulk_update_targets(&Actor::System, &individual_request(BEN, 2026, vec![]))
        .unwrap();
    assert_eq!(outcome.backfilled_months, vec![2]);
    assert_eq!(period_metrics(&user_rows(&engine, MARA, 2026), Period::Month(2)), Some(m(100, 100, 100)));
}

#[test]
fn moving_a_member_to_another_department_recomputes_both_managers() {
    let engine = build();
    engine.store.set_department_manager(LAB, Some(DANA)).unwrap();
    engine
        .bulk_update_targets(&Actor::System, &department_request(SALES, 2026, vec![MonthlyEntry::new(1, m(100, 100, 100))]))
        .unwrap();
    engine
        .bulk_update_targets(&Actor::System, &department_request(LAB, 2026, vec![MonthlyEntry::new(1, m(50, 50, 50))]))
        .unwrap();
    engine
        .bulk_update_targets(&Actor::System, &individual_request(BEN, 2026, vec![MonthlyEntry::new(1, m(60, 60, 60))]))
        .unwrap();
    assert_eq!(period_metrics(&user_rows(&engine, MARA, 2026), Period::Month(1)), Some(m(40, 40, 40)));
    assert_eq!(period_metrics(&user_rows(&engine, DANA, 2026), Period::Month(1)), Some(m(50, 50, 50)));

    let mut moved = individual_request(BEN, 2026, vec![MonthlyEntry::new(1, m(20, 20, 20))]);
    moved.department = Some(LAB);
    let outcome = engine.bulk_update_targets(&Actor::System, &moved).unwrap();
    assert_eq!(outcome.backfilled_months, vec![1]);

    let ben = user_rows(&engine, BEN, 2026);
    assert!(ben.iter().all(|r| r.scope.department() == Some(LAB)));
    assert_rollups_consistent(&ben);

    // Sales lost its only peer; Lab gained one.
    let mara = user_rows(&engine, MARA, 2026);
    assert_eq!(period_metrics(&mara, Period::Month(1)), Some(m(100, 100, 100)));
    assert_eq!(period_metrics(&mara, Period::Year), Some(m(100, 100, 100)));
    let dana = user_rows(&engine, DANA, 2026);
    assert_eq!(period_metrics(&dana, Period::Month(1)), Some(m(30, 30, 30)));
    assert_rollups_consistent(&dana);

    let backfills: Vec<i64> = engine
        .events_for_operation(&outcome.operation_id)
        .unwrap()
        .into_iter()
        .filter_map(|e| match e {
            TargetEvent::ManagerBackfilled { department, .. } => Some(department),
            _ => None,
        })
        .collect();
    assert_eq!(backfills, vec![SALES, LAB]);
}

#[test]
fn manager_without_profile_is_not_found_and_writes_nothing() {
    let engine = build();
    engine
        .store
        .insert_department(&Department { id: 5, name: "Ops".into(), manager: Some(777) })
        .unwrap();

    let err = engine
        .bulk_update_targets(&Actor::System, &department_request(5, 2026, vec![MonthlyEntry::new(1, m(10, 10, 10))]))
        .unwrap_err();
    assert!(matches!(err, TargetError::NotFound { entity: "user", .. }), "got {err}");
    assert!(err.is_client_error());
    assert_eq!(engine.store.target_count().unwrap(), 0);
    assert_eq!(engine.store.event_count().unwrap(), 0);
}

#[test]
fn department_without_manager_never_backfills() {
    let engine = build();
    let outcome = engine
        .bulk_update_targets(&Actor::System, &department_request(LAB, 2026, vec![MonthlyEntry::new(1, m(10, 10, 10))]))
        .unwrap();
    assert!(outcome.backfilled_months.is_empty());

    let events = engine.events_for_operation(&outcome.operation_id).unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], TargetEvent::TargetsReplaced { .. }));
}

#[test]
fn operation_events_are_recorded() {
    let engine = build();
    let outcome = engine
        .bulk_update_targets(&Actor::System, &department_request(SALES, 2026, vec![MonthlyEntry::new(1, m(1, 2, 3))]))
        .unwrap();

    let events = engine.events_for_operation(&outcome.operation_id).unwrap();
    assert_eq!(events.len(), 2);
    match &events[0] {
        TargetEvent::TargetsReplaced { year, months, quarters, year_total, .. } => {
            assert_eq!(*year, 2026);
            assert_eq!(months, &vec![1]);
            assert_eq!(quarters, &vec![1]);
            assert_eq!(*year_total, Some(m(1, 2, 3)));
        }
        other => panic!("unexpected first event {other:?}"),
    }
    match &events[1] {
        TargetEvent::ManagerBackfilled { department, manager, months, .. } => {
            assert_eq!((*department, *manager), (SALES, MARA));
            assert_eq!(months, &vec![1]);
        }
        other => panic!("unexpected second event {other:?}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn invalid_requests_write_nothing() {
    let engine = build();
    let good = vec![MonthlyEntry::new(1, m(1, 1, 1))];

    let mut missing_year = individual_request(DANA, 2026, good.clone());
    missing_year.year = None;
    let cases: Vec<(BulkUpdateRequest, &str)> = vec![
        (missing_year, "validation"),
        (individual_request(DANA, 1850, good.clone()), "validation"),
        (individual_request(DANA, 2026, vec![MonthlyEntry::new(13, m(1, 1, 1))]), "validation"),
        (
            individual_request(DANA, 2026, vec![MonthlyEntry::new(1, m(1, 1, 1)), MonthlyEntry::new(1, m(2, 2, 2))]),
            "validation",
        ),
        (individual_request(DANA, 2026, vec![MonthlyEntry::new(1, m(-1, 1, 1))]), "validation"),
        (
            BulkUpdateRequest { user: None, ..individual_request(DANA, 2026, good.clone()) },
            "validation",
        ),
        (
            BulkUpdateRequest { scope_kind: ScopeKind::Company, ..department_request(SALES, 2026, good.clone()) },
            "validation",
        ),
        (individual_request(999, 2026, good.clone()), "not_found"),
        (department_request(42, 2026, good.clone()), "not_found"),
        (
            BulkUpdateRequest { department: Some(42), ..individual_request(DANA, 2026, good.clone()) },
            "not_found",
        ),
    ];

    for (req, expected) in cases {
        let err = engine.bulk_update_targets(&Actor::System, &req).unwrap_err();
        assert_eq!(err.kind(), expected, "request {req:?} gave {err}");
        assert!(err.is_client_error());
    }
    assert_eq!(engine.store.target_count().unwrap(), 0);
    assert_eq!(engine.store.event_count().unwrap(), 0);
}

#[test]
fn missing_year_is_a_validation_error() {
    let engine = build();
    let mut req = department_request(SALES, 2026, vec![]);
    req.year = None;
    assert!(matches!(
        engine.bulk_update_targets(&Actor::System, &req),
        Err(TargetError::Validation(_))
    ));
}

#[test]
fn request_deserializes_from_json() {
    let req: BulkUpdateRequest = serde_json::from_str(
        r#"{
            "year": 2026,
            "scope_kind": "department",
            "department": 1,
            "entries": [
                {"month": 1, "contract_amount": 100000, "gross_profit": "40000.50"},
                {"revenue": 5}
            ]
        }"#,
    )
    .unwrap();
    assert_eq!(req.entries.len(), 2);
    assert_eq!(req.entries[0].month, Some(1));
    assert_eq!(req.entries[0].metrics.contract_amount, Decimal::from(100_000));
    assert_eq!(req.entries[0].metrics.gross_profit, Decimal::new(4_000_050, 2));
    assert_eq!(req.entries[0].metrics.revenue, Decimal::ZERO);
    assert_eq!(req.entries[1].month, None);
}

// ─────────────────────────────────────────────────────────────────────────────
// Read side

#[test]
fn stored_rows_are_readable_by_id_and_filter() {
    let engine = build();
    engine
        .bulk_update_targets(&Actor::System, &individual_request(CHO, 2026, vec![MonthlyEntry::new(7, m(5, 4, 3))]))
        .unwrap();

    let july = rows(
        &engine,
        TargetFilter { user: Some(CHO), period_kind: Some(PeriodKind::Month), ..Default::default() },
    );
    assert_eq!(july.len(), 1);
    let stored = engine.get_record(july[0].id.unwrap()).unwrap().unwrap();
    assert_eq!(stored, july[0]);
    assert_eq!(stored.scope.department(), Some(SALES), "profile department is recorded");
    assert!(stored.created_at.is_some() && stored.updated_at.is_some());
    assert_eq!(engine.get_record(987_654).unwrap(), None);
}
