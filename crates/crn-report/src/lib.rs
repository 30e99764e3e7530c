//! crn-report
//!
//! The ledger aggregation report: every reconciled and unreconciled row of a
//! period, split into account increases and decreases, with paired totals.
//!
//! The totals are computed twice, once over the full row set and once over
//! the returned page. When the page covers everything the two sides must be
//! exactly equal; a mismatch means the aggregation logic is wrong and the
//! report fails loudly instead of showing numbers that do not add up.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crn_schemas::{MovementId, Period, PeriodId, RecoId};
use crn_store::Store;

/// What a ledger row came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Reco,
    AccountEntry,
    Movement,
    Exchange,
}

/// One ledger line. Reconciled rows merge a whole reco; the rest are single
/// unreconciled movements, entries, or unsettled exchanges.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LedgerRow {
    pub kind: RowKind,
    pub reco_id: Option<RecoId>,
    pub movement_id: Option<MovementId>,
    /// Earliest underlying account entry date, if any entries are involved.
    pub entry_date: Option<NaiveDate>,
    /// Earliest underlying movement timestamp, if any movements are involved.
    pub ts: Option<DateTime<Utc>>,
    /// Summed account entry delta of the row.
    pub account_delta: Option<Decimal>,
    /// Summed account-side movement delta of the row, full wallet deltas.
    pub movement_delta: Option<Decimal>,
    /// Summed account-side movement delta honoring wallet-only recos. Zero
    /// for a wallet-only row even though `movement_delta` is not.
    pub reco_movement_delta: Option<Decimal>,
    pub desc: String,
}

impl LedgerRow {
    /// The value that classifies the row: the account side when present,
    /// otherwise the full movement side. Wallet-only rows classify by their
    /// full delta so they stay visible while contributing zero to totals.
    fn classify_delta(&self) -> Decimal {
        self.account_delta
            .or(self.movement_delta)
            .unwrap_or(Decimal::ZERO)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LedgerTotals {
    pub account_delta: Decimal,
    pub reco_movement_delta: Decimal,
}

impl LedgerTotals {
    fn add(&mut self, row: &LedgerRow) {
        if let Some(delta) = row.account_delta {
            self.account_delta += delta;
        }
        if let Some(delta) = row.reco_movement_delta {
            self.reco_movement_delta += delta;
        }
    }
}

/// Page totals next to full-set totals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TotalsPair {
    pub page: LedgerTotals,
    pub all: LedgerTotals,
}

#[derive(Clone, Debug, Serialize)]
pub struct LedgerReport {
    pub now: DateTime<Utc>,
    /// Nonzero rows in the whole period, ignoring pagination.
    pub rowcount: usize,
    /// True when the returned page covers every row.
    pub all_shown: bool,
    pub inc_records: Vec<LedgerRow>,
    pub inc_totals: TotalsPair,
    pub dec_records: Vec<LedgerRow>,
    pub dec_totals: TotalsPair,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("period {0} not found")]
    PeriodNotFound(PeriodId),

    #[error("ledger totals self-check failed for {bucket}: page {page:?} != all {all:?}")]
    TotalsMismatch {
        bucket: &'static str,
        page: LedgerTotals,
        all: LedgerTotals,
    },
}

/// Build the ledger report for one period.
///
/// Row sources: committed non-internal recos, unreconciled account entries,
/// unreconciled movements, and unsettled exchanges. Every row counts toward
/// `rowcount`; rows whose classifying delta is zero appear in neither
/// bucket. Ordering is `(entry_date, ts, movement_id)` ascending with absent
/// values last.
pub fn ledger_report(
    store: &Store,
    period: &Period,
    now: DateTime<Utc>,
    offset: usize,
    limit: Option<usize>,
) -> Result<LedgerReport, ReportError> {
    if store.period(period.id).is_none() {
        return Err(ReportError::PeriodNotFound(period.id));
    }

    let mut rows = collect_rows(store, period);
    rows.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));

    let rowcount = rows.len();
    let end = match limit {
        Some(limit) => (offset + limit).min(rowcount),
        None => rowcount,
    };
    let page: &[LedgerRow] = if offset < rowcount {
        &rows[offset..end]
    } else {
        &[]
    };
    let all_shown = page.len() == rowcount;

    let mut inc_records = Vec::new();
    let mut dec_records = Vec::new();
    let mut inc_page = LedgerTotals::default();
    let mut dec_page = LedgerTotals::default();
    for row in page {
        let delta = row.classify_delta();
        if delta > Decimal::ZERO {
            inc_page.add(row);
            inc_records.push(row.clone());
        } else if delta < Decimal::ZERO {
            dec_page.add(row);
            dec_records.push(row.clone());
        }
    }

    let mut inc_all = LedgerTotals::default();
    let mut dec_all = LedgerTotals::default();
    for row in &rows {
        let delta = row.classify_delta();
        if delta > Decimal::ZERO {
            inc_all.add(row);
        } else if delta < Decimal::ZERO {
            dec_all.add(row);
        }
    }

    if all_shown {
        if inc_page != inc_all {
            tracing::error!("ledger totals self-check failed on the increase side");
            return Err(ReportError::TotalsMismatch {
                bucket: "increases",
                page: inc_page,
                all: inc_all,
            });
        }
        if dec_page != dec_all {
            tracing::error!("ledger totals self-check failed on the decrease side");
            return Err(ReportError::TotalsMismatch {
                bucket: "decreases",
                page: dec_page,
                all: dec_all,
            });
        }
    }

    tracing::debug!(
        period_id = %period.id,
        rowcount,
        all_shown,
        "ledger report built"
    );

    Ok(LedgerReport {
        now,
        rowcount,
        all_shown,
        inc_records,
        inc_totals: TotalsPair {
            page: inc_page,
            all: inc_all,
        },
        dec_records,
        dec_totals: TotalsPair {
            page: dec_page,
            all: dec_all,
        },
    })
}

type SortKey = (
    bool,
    Option<NaiveDate>,
    bool,
    Option<DateTime<Utc>>,
    bool,
    Option<MovementId>,
);

/// Absent values sort after present ones at each level.
fn sort_key(row: &LedgerRow) -> SortKey {
    (
        row.entry_date.is_none(),
        row.entry_date,
        row.ts.is_none(),
        row.ts,
        row.movement_id.is_none(),
        row.movement_id,
    )
}

fn collect_rows(store: &Store, period: &Period) -> Vec<LedgerRow> {
    let mut rows = Vec::new();

    // One merged row per committed non-internal reco.
    for reco in store.recos() {
        if reco.period_id != period.id || reco.internal {
            continue;
        }
        let movements = store.movements_for_reco(reco.id);
        let entries = store.account_entries_for_reco(reco.id);

        let entry_date = entries.iter().map(|e| e.entry_date).min();
        let ts = movements.iter().map(|m| m.ts).min();
        let account_delta = if entries.is_empty() {
            None
        } else {
            Some(entries.iter().map(|e| e.delta).sum())
        };
        let movement_delta = if movements.is_empty() {
            None
        } else {
            Some(movements.iter().map(|m| m.delta()).sum())
        };
        let reco_movement_delta = if movements.is_empty() {
            None
        } else {
            Some(movements.iter().map(|m| m.reco_delta()).sum())
        };
        let desc = if reco.comment.is_empty() {
            entries
                .first()
                .map(|e| e.desc.clone())
                .unwrap_or_default()
        } else {
            reco.comment.clone()
        };

        rows.push(LedgerRow {
            kind: RowKind::Reco,
            reco_id: Some(reco.id),
            movement_id: None,
            entry_date,
            ts,
            account_delta,
            movement_delta,
            reco_movement_delta,
            desc,
        });
    }

    for entry in store.account_entries() {
        if entry.period_id != period.id || entry.reco_id.is_some() || entry.delta.is_zero() {
            continue;
        }
        rows.push(LedgerRow {
            kind: RowKind::AccountEntry,
            reco_id: None,
            movement_id: None,
            entry_date: Some(entry.entry_date),
            ts: None,
            account_delta: Some(entry.delta),
            movement_delta: None,
            reco_movement_delta: None,
            desc: entry.desc.clone(),
        });
    }

    for movement in store.movements() {
        if movement.period_id != period.id
            || movement.reco_id.is_some()
            || movement.delta().is_zero()
        {
            continue;
        }
        rows.push(LedgerRow {
            kind: RowKind::Movement,
            reco_id: None,
            movement_id: Some(movement.id),
            entry_date: None,
            ts: Some(movement.ts),
            account_delta: None,
            movement_delta: Some(movement.delta()),
            reco_movement_delta: Some(movement.reco_delta()),
            desc: format!("transfer {}", movement.transfer_id),
        });
    }

    for exchange in store.exchanges() {
        if exchange.period_id != period.id
            || exchange.reco_id.is_some()
            || exchange.delta().is_zero()
        {
            continue;
        }
        rows.push(LedgerRow {
            kind: RowKind::Exchange,
            reco_id: None,
            movement_id: None,
            entry_date: None,
            ts: Some(exchange.ts),
            account_delta: None,
            movement_delta: Some(exchange.delta()),
            reco_movement_delta: Some(exchange.delta()),
            desc: format!("exchange for transfer {}", exchange.transfer_id),
        });
    }

    rows
}
