use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crn_schemas::{AccountEntryId, MovementId, RecoId, RecoType, TransferId};

/// Structural limits and tuning knobs for the engine. The defaults mirror the
/// limits enforced on operator input forms.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub max_comment_len: usize,
    pub max_movements: usize,
    pub max_account_entries: usize,
    /// Max characters of a typed amount field on a new account entry.
    pub max_amount_len: usize,
    /// Max characters of a typed description on a new account entry.
    pub max_desc_len: usize,
    /// Candidate searches return at most this many rows.
    pub search_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_comment_len: 10_000,
            max_movements: 100,
            max_account_entries: 100,
            max_amount_len: 100,
            max_desc_len: 1_000,
            search_limit: 5,
        }
    }
}

/// One account entry reference in a save request: either an existing row or
/// a new row typed by the operator as free text.
#[derive(Clone, Debug)]
pub enum AccountEntryInput {
    Existing(AccountEntryId),
    New {
        /// Free text; parsed fuzzily ("-250", "1,250.00 USD").
        amount: String,
        /// Free text; parsed fuzzily ("2024-01-05", "Jan 5, 2024").
        date: String,
        desc: String,
    },
}

/// A full reconciliation save request.
#[derive(Clone, Debug)]
pub struct RecoInput {
    pub reco_type: RecoType,
    pub comment: String,
    pub movement_ids: Vec<MovementId>,
    pub account_entries: Vec<AccountEntryInput>,
}

/// What a save did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { reco_id: RecoId },
    /// An existing reco emptied of movements, entries and comment is removed.
    Deleted { reco_id: RecoId },
    /// A new reco with nothing in it; nothing was persisted.
    Empty,
}

/// Filters for the movement candidate search. All filters are optional free
/// text; unusable text disables the filter it was typed into.
#[derive(Clone, Debug, Default)]
pub struct MovementQuery {
    pub amount: Option<String>,
    pub date: Option<String>,
    /// Browser-style offset: minutes to add to local time to reach UTC.
    pub tzoffset_minutes: i32,
    pub transfer: Option<String>,
    /// Rows already shown to the operator; never returned again.
    pub seen_ids: Vec<MovementId>,
    /// Rows linked to this reco stay eligible (the reco being edited).
    pub reco_id: Option<RecoId>,
}

/// Filters for the account entry candidate search.
#[derive(Clone, Debug, Default)]
pub struct EntryQuery {
    pub delta: Option<String>,
    pub entry_date: Option<String>,
    pub desc: Option<String>,
    pub seen_ids: Vec<AccountEntryId>,
    pub reco_id: Option<RecoId>,
}

/// A movement offered to the operator as a reconciliation candidate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MovementCandidate {
    pub id: MovementId,
    pub transfer_id: TransferId,
    pub ts: DateTime<Utc>,
    pub wallet_delta: Decimal,
    pub vault_delta: Decimal,
}

/// An account entry offered as a candidate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntryCandidate {
    pub id: AccountEntryId,
    pub entry_date: chrono::NaiveDate,
    pub delta: Decimal,
    pub desc: String,
}
