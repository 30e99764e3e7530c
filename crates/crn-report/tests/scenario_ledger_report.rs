use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use crn_engine::{auto_reco_groups, save_reco, AccountEntryInput, EngineConfig, RecoInput};
use crn_report::{ledger_report, LedgerTotals, ReportError, RowKind};
use crn_schemas::{
    AccountEntry, AccountEntryId, Action, Exchange, ExchangeId, Movement, MovementId, Period,
    PeriodId, RecoId, RecoType, TransferId,
};
use crn_store::Store;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
}

fn date(day: u32) -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

fn movement(period_id: PeriodId, transfer: i64, wallet: &str, at: DateTime<Utc>) -> Movement {
    Movement {
        id: MovementId(0),
        transfer_id: TransferId(transfer),
        number: 1,
        amount_index: 0,
        peer_id: "p1".into(),
        loop_id: "0".into(),
        currency: "USD".into(),
        issuer_id: "i1".into(),
        action: Action::Grant,
        ts: at,
        wallet_delta: dec(wallet),
        vault_delta: Decimal::ZERO,
        period_id,
        reco_id: None,
        reco_wallet_delta: dec(wallet),
    }
}

fn entry(period_id: PeriodId, day: u32, delta: &str, desc: &str) -> AccountEntry {
    AccountEntry {
        id: AccountEntryId(0),
        period_id,
        peer_id: "p1".into(),
        loop_id: "0".into(),
        currency: "USD".into(),
        entry_date: date(day),
        delta: dec(delta),
        desc: desc.into(),
        reco_id: None,
    }
}

fn setup() -> (Store, Period) {
    let mut store = Store::new("owner-1");
    let period_id = store.add_period("p1", "0", "USD");
    let period = store.period(period_id).unwrap().clone();
    (store, period)
}

fn save(
    store: &mut Store,
    period: &Period,
    movement_ids: Vec<MovementId>,
    entries: Vec<AccountEntryInput>,
) -> RecoId {
    let outcome = save_reco(
        store,
        &EngineConfig::default(),
        period,
        ts(20, 0),
        None,
        RecoInput {
            reco_type: RecoType::Standard,
            comment: String::new(),
            movement_ids,
            account_entries: entries,
        },
    )
    .unwrap();
    match outcome {
        crn_engine::SaveOutcome::Saved { reco_id } => reco_id,
        other => panic!("expected a saved reco, got {other:?}"),
    }
}

#[test]
fn scenario_rows_classify_by_sign_and_totals_pair_up() {
    let (mut store, period) = setup();
    store.add_account_entry(entry(period.id, 10, "250.00", "deposit"));
    store.add_account_entry(entry(period.id, 11, "-40.00", "wire out"));
    // Unreconciled movement: wallet +9 means the account decreased by 9.
    store.add_movement(movement(period.id, 500, "9.00", ts(12, 9)));

    let report = ledger_report(&store, &period, ts(20, 0), 0, None).unwrap();

    assert_eq!(report.rowcount, 3);
    assert!(report.all_shown);
    assert_eq!(report.inc_records.len(), 1);
    assert_eq!(report.dec_records.len(), 2);
    assert_eq!(
        report.inc_totals.all,
        LedgerTotals {
            account_delta: dec("250.00"),
            reco_movement_delta: Decimal::ZERO,
        }
    );
    assert_eq!(
        report.dec_totals.all,
        LedgerTotals {
            account_delta: dec("-40.00"),
            reco_movement_delta: dec("-9.00"),
        }
    );
    assert_eq!(report.inc_totals.page, report.inc_totals.all);
    assert_eq!(report.dec_totals.page, report.dec_totals.all);
}

#[test]
fn scenario_reco_rows_merge_dates_and_deltas() {
    let (mut store, period) = setup();
    let m1 = store.add_movement(movement(period.id, 500, "2.00", ts(5, 9)));
    let m2 = store.add_movement(movement(period.id, 500, "2.10", ts(6, 9)));
    let e1 = store.add_account_entry(entry(period.id, 8, "-1.10", "first part"));
    let e2 = store.add_account_entry(entry(period.id, 7, "-3.00", "second part"));
    let reco_id = save(
        &mut store,
        &period,
        vec![m1, m2],
        vec![
            AccountEntryInput::Existing(e1),
            AccountEntryInput::Existing(e2),
        ],
    );

    let report = ledger_report(&store, &period, ts(20, 0), 0, None).unwrap();

    assert_eq!(report.rowcount, 1);
    let row = &report.dec_records[0];
    assert_eq!(row.kind, RowKind::Reco);
    assert_eq!(row.reco_id, Some(reco_id));
    assert_eq!(row.entry_date, Some(date(7)));
    assert_eq!(row.ts, Some(ts(5, 9)));
    assert_eq!(row.account_delta, Some(dec("-4.10")));
    assert_eq!(row.movement_delta, Some(dec("-4.10")));
}

#[test]
fn scenario_internal_recos_are_hidden() {
    let (mut store, period) = setup();
    store.add_movement(movement(period.id, 500, "4.1", ts(5, 9)));
    store.add_movement(movement(period.id, 500, "0.9", ts(5, 10)));
    store.add_movement(movement(period.id, 500, "-5", ts(5, 11)));
    let created = auto_reco_groups(&mut store, &period, ts(6, 0)).unwrap();
    assert_eq!(created.len(), 1);

    let report = ledger_report(&store, &period, ts(20, 0), 0, None).unwrap();

    assert_eq!(report.rowcount, 0);
    assert!(report.inc_records.is_empty());
    assert!(report.dec_records.is_empty());
}

#[test]
fn scenario_unsettled_exchange_is_a_report_row() {
    let (mut store, period) = setup();
    store.add_exchange(Exchange {
        id: ExchangeId(0),
        transfer_id: TransferId(500),
        peer_id: "p1".into(),
        loop_id: "0".into(),
        currency: "USD".into(),
        ts: ts(9, 12),
        wallet_delta: dec("3.00"),
        vault_delta: dec("-1.00"),
        origin_reco_id: RecoId(1),
        reco_id: None,
        period_id: period.id,
    });

    let report = ledger_report(&store, &period, ts(20, 0), 0, None).unwrap();

    assert_eq!(report.rowcount, 1);
    let row = &report.dec_records[0];
    assert_eq!(row.kind, RowKind::Exchange);
    assert_eq!(row.movement_delta, Some(dec("-2.00")));
}

#[test]
fn scenario_ordering_puts_dateless_rows_last() {
    let (mut store, period) = setup();
    store.add_movement(movement(period.id, 500, "-1.00", ts(2, 9)));
    store.add_account_entry(entry(period.id, 5, "7.00", "deposit"));
    store.add_account_entry(entry(period.id, 3, "6.00", "deposit"));

    let report = ledger_report(&store, &period, ts(20, 0), 0, None).unwrap();

    // Entry-dated rows first in date order, then the ts-only movement row.
    let ordered: Vec<_> = report
        .inc_records
        .iter()
        .chain(report.dec_records.iter())
        .collect();
    assert_eq!(report.rowcount, 3);
    assert_eq!(report.inc_records[0].entry_date, Some(date(3)));
    assert_eq!(report.inc_records[1].entry_date, Some(date(5)));
    assert_eq!(ordered.len(), 3);
    assert_eq!(report.dec_records[0].kind, RowKind::Movement);
}

#[test]
fn scenario_pagination_reports_partial_page_without_self_check() {
    let (mut store, period) = setup();
    for day in 1..=4 {
        store.add_account_entry(entry(period.id, day, "10.00", "deposit"));
    }

    let report = ledger_report(&store, &period, ts(20, 0), 0, Some(2)).unwrap();

    assert_eq!(report.rowcount, 4);
    assert!(!report.all_shown);
    assert_eq!(report.inc_records.len(), 2);
    assert_eq!(report.inc_totals.page.account_delta, dec("20.00"));
    assert_eq!(report.inc_totals.all.account_delta, dec("40.00"));

    let report = ledger_report(&store, &period, ts(20, 0), 2, Some(10)).unwrap();
    assert!(!report.all_shown);
    assert_eq!(report.inc_records.len(), 2);
    assert_eq!(report.inc_records[0].entry_date, Some(date(3)));
}

#[test]
fn scenario_full_page_totals_match_exactly() {
    let (mut store, period) = setup();
    // Deltas chosen to expose floating point drift if it existed.
    for day in 1..=9 {
        store.add_account_entry(entry(period.id, day, "0.10", "tiny deposit"));
        store.add_movement(movement(
            period.id,
            500 + day as i64,
            "0.30",
            ts(day, 9),
        ));
    }

    let report = ledger_report(&store, &period, ts(20, 0), 0, None).unwrap();

    assert!(report.all_shown);
    assert_eq!(report.inc_totals.page, report.inc_totals.all);
    assert_eq!(report.dec_totals.page, report.dec_totals.all);
    assert_eq!(report.inc_totals.all.account_delta, dec("0.90"));
    assert_eq!(report.dec_totals.all.reco_movement_delta, dec("-2.70"));
}

#[test]
fn scenario_wallet_only_reco_shows_but_adds_zero_to_totals() {
    let (mut store, period) = setup();
    let m1 = store.add_movement(movement(period.id, 500, "5.00", ts(5, 9)));
    let outcome = save_reco(
        &mut store,
        &EngineConfig::default(),
        &period,
        ts(6, 0),
        None,
        RecoInput {
            reco_type: RecoType::WalletOnly,
            comment: "never reaches the statement".into(),
            movement_ids: vec![m1],
            account_entries: vec![],
        },
    )
    .unwrap();
    let crn_engine::SaveOutcome::Saved { reco_id } = outcome else {
        panic!("expected a saved reco");
    };

    let report = ledger_report(&store, &period, ts(20, 0), 0, None).unwrap();

    // The row is visible, classified by its full movement delta.
    assert_eq!(report.rowcount, 1);
    assert_eq!(report.dec_records.len(), 1);
    let row = &report.dec_records[0];
    assert_eq!(row.kind, RowKind::Reco);
    assert_eq!(row.reco_id, Some(reco_id));
    assert_eq!(row.movement_delta, Some(dec("-5.00")));
    assert_eq!(row.reco_movement_delta, Some(Decimal::ZERO));
    // But the totals honor the wallet-only adjustment.
    assert_eq!(report.dec_totals.all.reco_movement_delta, Decimal::ZERO);
    assert_eq!(report.dec_totals.all.account_delta, Decimal::ZERO);
    assert_eq!(report.dec_totals.page, report.dec_totals.all);
}

#[test]
fn scenario_zero_net_reco_counts_in_rowcount_but_joins_no_bucket() {
    let (mut store, period) = setup();
    let e1 = store.add_account_entry(entry(period.id, 10, "2.00", "refund"));
    let e2 = store.add_account_entry(entry(period.id, 10, "-2.00", "chargeback"));
    save(
        &mut store,
        &period,
        vec![],
        vec![
            AccountEntryInput::Existing(e1),
            AccountEntryInput::Existing(e2),
        ],
    );

    let report = ledger_report(&store, &period, ts(20, 0), 0, None).unwrap();

    assert_eq!(report.rowcount, 1);
    assert!(report.all_shown);
    assert!(report.inc_records.is_empty());
    assert!(report.dec_records.is_empty());
    assert_eq!(report.inc_totals.page, report.inc_totals.all);
    assert_eq!(report.dec_totals.page, report.dec_totals.all);
}

#[test]
fn scenario_unknown_period_is_an_error() {
    let (store, _period) = setup();
    let ghost = Period {
        id: PeriodId(999),
        peer_id: "p1".into(),
        loop_id: "0".into(),
        currency: "USD".into(),
    };

    let err = ledger_report(&store, &ghost, ts(20, 0), 0, None).unwrap_err();
    assert_eq!(err, ReportError::PeriodNotFound(PeriodId(999)));
}
