use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use crn_engine::{auto_reco_groups, save_reco, EngineConfig, RecoInput, SaveOutcome};
use crn_schemas::{Action, Movement, MovementId, Period, PeriodId, RecoType, TransferId};
use crn_store::Store;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn ts(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 5, 9, minute, 0).unwrap()
}

fn movement(
    period_id: PeriodId,
    minute: u32,
    wallet: &str,
    vault: &str,
    action: Action,
) -> Movement {
    Movement {
        id: MovementId(0),
        transfer_id: TransferId(500),
        number: minute as i32,
        amount_index: 0,
        peer_id: "p1".into(),
        loop_id: "0".into(),
        currency: "USD".into(),
        issuer_id: "i1".into(),
        action,
        ts: ts(minute),
        wallet_delta: dec(wallet),
        vault_delta: dec(vault),
        period_id,
        reco_id: None,
        reco_wallet_delta: dec(wallet),
    }
}

fn setup() -> (Store, Period) {
    let mut store = Store::new("owner-1");
    let period_id = store.add_period("p1", "0", "USD");
    let period = store.period(period_id).unwrap().clone();
    (store, period)
}

#[test]
fn scenario_hill_becomes_one_internal_reco() {
    let (mut store, period) = setup();
    let m1 = store.add_movement(movement(period.id, 1, "4.1", "0", Action::Grant));
    let m2 = store.add_movement(movement(period.id, 2, "0.9", "0", Action::Split));
    let m3 = store.add_movement(movement(period.id, 3, "-5", "0", Action::Redeem));

    let reco_ids = auto_reco_groups(&mut store, &period, ts(10)).unwrap();

    assert_eq!(reco_ids.len(), 1);
    let reco = store.reco(reco_ids[0]).unwrap();
    assert!(reco.internal);
    assert!(reco.auto);
    assert!(!reco.auto_edited);
    assert_eq!(reco.reco_type, RecoType::Standard);
    for id in [m1, m2, m3] {
        assert_eq!(store.movement(id).unwrap().reco_id, Some(reco_ids[0]));
    }
    assert_eq!(store.audit_events().len(), 1);
    assert_eq!(store.audit_events()[0].event_type, "auto_reco");
}

#[test]
fn scenario_crossing_run_is_left_alone() {
    let (mut store, period) = setup();
    let ids = [
        store.add_movement(movement(period.id, 1, "4.1", "0", Action::Grant)),
        store.add_movement(movement(period.id, 2, "-5", "0", Action::Redeem)),
        store.add_movement(movement(period.id, 3, "0.9", "0", Action::Grant)),
    ];

    let reco_ids = auto_reco_groups(&mut store, &period, ts(10)).unwrap();

    assert!(reco_ids.is_empty());
    for id in ids {
        assert_eq!(store.movement(id).unwrap().reco_id, None);
    }
}

#[test]
fn scenario_move_action_breaks_groups() {
    let (mut store, period) = setup();
    store.add_movement(movement(period.id, 1, "4.1", "0", Action::Grant));
    store.add_movement(movement(period.id, 2, "0.9", "0", Action::Move));
    store.add_movement(movement(period.id, 3, "-5", "0", Action::Redeem));

    let reco_ids = auto_reco_groups(&mut store, &period, ts(10)).unwrap();

    assert!(reco_ids.is_empty());
}

#[test]
fn scenario_manual_reco_is_preserved_and_acts_as_a_barrier() {
    let (mut store, period) = setup();
    let m1 = store.add_movement(movement(period.id, 1, "4.1", "0", Action::Grant));
    let m2 = store.add_movement(movement(period.id, 2, "0.9", "0", Action::Grant));
    let m3 = store.add_movement(movement(period.id, 3, "-5", "0", Action::Redeem));
    let m4 = store.add_movement(movement(period.id, 4, "7", "0", Action::Grant));
    let m5 = store.add_movement(movement(period.id, 5, "-3", "0", Action::Redeem));
    let m6 = store.add_movement(movement(period.id, 6, "-4", "0", Action::Redeem));

    // The operator reconciled m2 by hand (wallet-only, so no entries needed).
    let outcome = save_reco(
        &mut store,
        &EngineConfig::default(),
        &period,
        ts(8),
        None,
        RecoInput {
            reco_type: RecoType::WalletOnly,
            comment: "handled on the statement side".into(),
            movement_ids: vec![m2],
            account_entries: vec![],
        },
    )
    .unwrap();
    let SaveOutcome::Saved { reco_id: manual } = outcome else {
        panic!("expected a saved reco");
    };

    let reco_ids = auto_reco_groups(&mut store, &period, ts(10)).unwrap();

    // The first hill is broken by the manual reco; only the second groups.
    assert_eq!(reco_ids.len(), 1);
    assert_eq!(store.movement(m1).unwrap().reco_id, None);
    assert_eq!(store.movement(m2).unwrap().reco_id, Some(manual));
    assert_eq!(store.movement(m3).unwrap().reco_id, None);
    for id in [m4, m5, m6] {
        assert_eq!(store.movement(id).unwrap().reco_id, Some(reco_ids[0]));
    }
}

#[test]
fn scenario_auto_reco_edited_by_operator_is_marked() {
    let (mut store, period) = setup();
    let m1 = store.add_movement(movement(period.id, 1, "4.1", "0", Action::Grant));
    let m2 = store.add_movement(movement(period.id, 2, "-4.1", "0", Action::Redeem));

    let reco_ids = auto_reco_groups(&mut store, &period, ts(10)).unwrap();
    assert_eq!(reco_ids.len(), 1);

    // Operator re-saves the auto reco with the same movements.
    save_reco(
        &mut store,
        &EngineConfig::default(),
        &period,
        ts(20),
        Some(reco_ids[0]),
        RecoInput {
            reco_type: RecoType::Standard,
            comment: "confirmed".into(),
            movement_ids: vec![m1, m2],
            account_entries: vec![],
        },
    )
    .unwrap();

    let reco = store.reco(reco_ids[0]).unwrap();
    assert!(reco.auto);
    assert!(reco.auto_edited);
    assert_eq!(reco.comment, "confirmed");
}

#[test]
fn scenario_wallet_vault_pairs_group_via_combined_delta() {
    let (mut store, period) = setup();
    // Wallet and vault offset within the pair: +5 wallet / -5 vault then the
    // reverse. Each movement nets to zero on its own.
    let m1 = store.add_movement(movement(period.id, 1, "5", "-5", Action::Issue));
    let m2 = store.add_movement(movement(period.id, 2, "-5", "5", Action::Issue));

    let reco_ids = auto_reco_groups(&mut store, &period, ts(10)).unwrap();

    // Combined deltas are zero, so each balances alone.
    assert_eq!(reco_ids.len(), 2);
    assert_eq!(store.movement(m1).unwrap().reco_id, Some(reco_ids[0]));
    assert_eq!(store.movement(m2).unwrap().reco_id, Some(reco_ids[1]));
}
