//! crn-match
//!
//! Automatic partitioning of movement sequences into self-balancing runs.
//!
//! Design decisions:
//! - Pure, single pass, no IO. The caller feeds an ordered slice and gets
//!   ordered disjoint groups back.
//! - Exact decimal arithmetic; prefix sums are `Decimal` keys in a `BTreeMap`.
//! - Ineligible or manually-reconciled movements are barriers: no group may
//!   span one.
//! - A run balances only as a hill or a valley: the cumulative sum may rise
//!   and return, or sink and return, but once it strictly crosses its
//!   starting level no run spanning the crossing can be committed.
//! - The earliest repeated prefix sum wins, which yields the leftmost
//!   admissible group at each step. Many small groups beat one big group.

use std::collections::{BTreeMap, BTreeSet};

use crn_schemas::{Movement, MovementId};
use rust_decimal::Decimal;

/// The slice of a movement the matcher needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunMovement {
    pub id: MovementId,
    /// Combined wallet + vault delta. A run balances when these sum to zero.
    pub delta: Decimal,
    /// False for action tags that cross to another holder (`move`).
    pub internal: bool,
}

impl RunMovement {
    pub fn new(id: MovementId, delta: Decimal, internal: bool) -> Self {
        Self {
            id,
            delta,
            internal,
        }
    }
}

/// Adapt full movement rows to matcher input.
pub fn run_inputs(movements: &[Movement]) -> Vec<RunMovement> {
    movements
        .iter()
        .map(|m| RunMovement {
            id: m.id,
            delta: m.wallet_delta + m.vault_delta,
            internal: m.action.is_internal(),
        })
        .collect()
}

fn crossed(prev_rel: Decimal, rel: Decimal) -> bool {
    (prev_rel > Decimal::ZERO && rel < Decimal::ZERO)
        || (prev_rel < Decimal::ZERO && rel > Decimal::ZERO)
}

/// Find disjoint contiguous runs of eligible movements summing to exactly
/// zero. `excluded` holds movements already reconciled manually; they act as
/// barriers exactly like ineligible actions and never join a group.
///
/// Guarantees: groups are disjoint, appear in input order, and each sums to
/// exactly zero under decimal arithmetic.
pub fn find_internal_groups(
    movements: &[RunMovement],
    excluded: &BTreeSet<MovementId>,
) -> Vec<Vec<MovementId>> {
    let mut groups: Vec<Vec<MovementId>> = Vec::new();

    // Cumulative sum value -> index where a run starting on that value would
    // begin. Seeded with the current sum at every restart.
    let mut seen: BTreeMap<Decimal, usize> = BTreeMap::new();
    // Absolute cumulative sum over eligible movements since the last barrier.
    let mut sum = Decimal::ZERO;
    // Sum value at the last restart; `sum - base` tells hill from valley.
    let mut base = Decimal::ZERO;
    let mut prev_rel = Decimal::ZERO;

    seen.insert(Decimal::ZERO, 0);

    for (pos, m) in movements.iter().enumerate() {
        if !m.internal || excluded.contains(&m.id) {
            // Barrier: drop all accumulated history. Nothing may span this
            // movement and the movement itself joins no group.
            seen.clear();
            sum = Decimal::ZERO;
            base = Decimal::ZERO;
            prev_rel = Decimal::ZERO;
            seen.insert(Decimal::ZERO, pos + 1);
            continue;
        }

        let prev_sum = sum;
        sum += m.delta;

        if crossed(prev_rel, sum - base) {
            // The cumulative sum crossed its starting level: no hill or
            // valley spans this point. Restart with this movement as the
            // first candidate member.
            seen.clear();
            base = prev_sum;
            seen.insert(prev_sum, pos);
        }

        if let Some(&start) = seen.get(&sum) {
            // The cumulative sum repeated: movements (start..=pos) net to
            // zero. Commit the run and reseed so later runs cannot overlap.
            groups.push(movements[start..=pos].iter().map(|m| m.id).collect());
            seen.clear();
            base = sum;
            seen.insert(sum, pos + 1);
        } else {
            seen.insert(sum, pos + 1);
        }

        prev_rel = sum - base;
    }

    groups
}
