use chrono::{DateTime, Duration, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crn_param::{parse_amount, parse_currency, parse_date, parse_datetime};
use crn_schemas::Period;
use crn_store::Store;

use crate::types::{EngineConfig, EntryCandidate, EntryQuery, MovementCandidate, MovementQuery};

/// A transfer reference typed with grouping dashes: "2024-5-19" → "2024519".
static TRANSFER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9][0-9\-]*").unwrap());

/// An amount filter extracted from free text. Whole-unit queries ("212")
/// match the range `[abs, abs + 1)`; subunit queries ("2.12") match exactly.
/// An explicit sign restricts the sign of the matched delta.
struct AmountFilter {
    abs: Decimal,
    sign: i8,
    exact: bool,
    currency: Option<String>,
}

impl AmountFilter {
    fn parse(text: &str) -> Option<Self> {
        let parsed = parse_amount(text)?;
        Some(Self {
            abs: parsed.abs(),
            sign: parsed.sign,
            exact: parsed.has_subunit(),
            currency: parse_currency(text),
        })
    }

    fn matches(&self, delta: Decimal) -> bool {
        if self.sign < 0 && delta >= Decimal::ZERO {
            return false;
        }
        if self.sign > 0 && delta <= Decimal::ZERO {
            return false;
        }
        let mag = delta.abs();
        if self.exact {
            mag == self.abs
        } else {
            mag >= self.abs && mag < self.abs + Decimal::ONE
        }
    }
}

fn nonblank(text: &Option<String>) -> Option<&str> {
    text.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Half-open UTC window implied by a fuzzy date string. `tzoffset_minutes`
/// shifts operator-local time to UTC.
fn date_window(text: &str, tzoffset_minutes: i32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let (naive, resolution) = parse_datetime(text)?;
    let start = Utc.from_utc_datetime(&naive) + Duration::minutes(tzoffset_minutes as i64);
    Some((start, start + resolution.window()))
}

fn transfer_digits(text: &str) -> Option<String> {
    let run = TRANSFER_RE.find(text)?;
    let digits: String = run.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Find unreconciled movements matching the typed filters. Unusable filter
/// text disables that filter; with no usable filter at all the result is
/// empty rather than the whole period. Results are chronological, truncated
/// to `config.search_limit`.
pub fn search_movements(
    store: &Store,
    config: &EngineConfig,
    period: &Period,
    query: &MovementQuery,
) -> Vec<MovementCandidate> {
    let amount = nonblank(&query.amount).and_then(AmountFilter::parse);
    if let Some(filter) = &amount {
        if let Some(code) = &filter.currency {
            // A typed currency code that disagrees with the period can
            // never match anything in it.
            if code != &period.currency {
                return Vec::new();
            }
        }
    }
    let window = nonblank(&query.date).and_then(|t| date_window(t, query.tzoffset_minutes));
    let transfer = nonblank(&query.transfer).and_then(transfer_digits);

    if amount.is_none() && window.is_none() && transfer.is_none() {
        return Vec::new();
    }

    let mut rows: Vec<_> = store
        .movements()
        .filter(|m| m.period_id == period.id && m.in_scope(period))
        .filter(|m| m.is_reconcilable())
        .filter(|m| m.reco_id.is_none() || m.reco_id == query.reco_id)
        .filter(|m| !query.seen_ids.contains(&m.id))
        .filter(|m| {
            amount
                .as_ref()
                .map_or(true, |f| f.matches(m.wallet_delta) || f.matches(m.vault_delta))
        })
        .filter(|m| {
            window
                .as_ref()
                .map_or(true, |(start, end)| m.ts >= *start && m.ts < *end)
        })
        .filter(|m| {
            transfer
                .as_ref()
                .map_or(true, |digits| m.transfer_id.to_string().contains(digits.as_str()))
        })
        .collect();

    rows.sort_by_key(|m| (m.ts, m.id));
    rows.truncate(config.search_limit);
    rows.into_iter()
        .map(|m| MovementCandidate {
            id: m.id,
            transfer_id: m.transfer_id,
            ts: m.ts,
            wallet_delta: m.wallet_delta,
            vault_delta: m.vault_delta,
        })
        .collect()
}

/// Find unreconciled account entries matching the typed filters. Same filter
/// semantics as the movement search; entry dates match exactly and the
/// description filter is a case-insensitive substring.
pub fn search_account_entries(
    store: &Store,
    config: &EngineConfig,
    period: &Period,
    query: &EntryQuery,
) -> Vec<EntryCandidate> {
    let amount = nonblank(&query.delta).and_then(AmountFilter::parse);
    if let Some(filter) = &amount {
        if let Some(code) = &filter.currency {
            if code != &period.currency {
                return Vec::new();
            }
        }
    }
    let entry_date = nonblank(&query.entry_date).and_then(parse_date);
    let desc = nonblank(&query.desc).map(str::to_lowercase);

    if amount.is_none() && entry_date.is_none() && desc.is_none() {
        return Vec::new();
    }

    let mut rows: Vec<_> = store
        .account_entries()
        .filter(|e| e.period_id == period.id && e.in_scope(period))
        .filter(|e| !e.delta.is_zero())
        .filter(|e| e.reco_id.is_none() || e.reco_id == query.reco_id)
        .filter(|e| !query.seen_ids.contains(&e.id))
        .filter(|e| amount.as_ref().map_or(true, |f| f.matches(e.delta)))
        .filter(|e| entry_date.map_or(true, |d| e.entry_date == d))
        .filter(|e| {
            desc.as_ref()
                .map_or(true, |needle| e.desc.to_lowercase().contains(needle))
        })
        .collect();

    rows.sort_by(|a, b| (a.entry_date, a.id).cmp(&(b.entry_date, b.id)));
    rows.truncate(config.search_limit);
    rows.into_iter()
        .map(|e| EntryCandidate {
            id: e.id,
            entry_date: e.entry_date,
            delta: e.delta,
            desc: e.desc.clone(),
        })
        .collect()
}
