//! crn-schemas
//!
//! Shared domain types for the reconciliation core:
//! - movements (one leg of a transfer, as seen by one holder)
//! - account entries (one line of an external account statement)
//! - recos (reconciliation records linking the two)
//! - exchanges (wallet/vault balancing rows created during ingestion)
//!
//! All monetary deltas are `rust_decimal::Decimal`. Never floats: the engines
//! compare sums against exact zero.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($name:ident) => {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(MovementId);
id_type!(AccountEntryId);
id_type!(RecoId);
id_type!(TransferId);
id_type!(PeriodId);
id_type!(ExchangeId);

/// The scope an operator reconciles against: one peer, one cash design
/// (loop), one currency, over one period of time. Movements and account
/// entries are owned by exactly one period and never cross scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: PeriodId,
    pub peer_id: String,
    pub loop_id: String,
    pub currency: String,
}

/// Movement action tag assigned by the payment network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Issue,
    Grant,
    Move,
    Split,
    Redeem,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Issue => "issue",
            Action::Grant => "grant",
            Action::Move => "move",
            Action::Split => "split",
            Action::Redeem => "redeem",
        }
    }

    /// True for legs generated inside the holder's own wallet/vault pair.
    /// A `move` leg crosses to another holder, so it can never be part of an
    /// automatically created internal reco; the auto-matcher treats it as a
    /// barrier.
    pub fn is_internal(&self) -> bool {
        !matches!(self, Action::Move)
    }
}

/// One leg of a money transfer as seen by one party.
///
/// Created by ingestion and immutable afterwards except for `reco_id` and
/// `reco_wallet_delta`, which the save engine maintains. The store logs every
/// change to the mutable fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub transfer_id: TransferId,
    /// Ordinal of the movement within its transfer.
    pub number: i32,
    /// Disambiguates multiple sub-amounts of one movement number.
    pub amount_index: i32,
    pub peer_id: String,
    pub loop_id: String,
    pub currency: String,
    pub issuer_id: String,
    pub action: Action,
    pub ts: DateTime<Utc>,
    /// Positive for money moving into the wallet, negative for out.
    pub wallet_delta: Decimal,
    /// Positive for money moving into the vault, negative for out.
    pub vault_delta: Decimal,
    pub period_id: PeriodId,
    pub reco_id: Option<RecoId>,
    /// Equals `wallet_delta`, except zero while the movement belongs to a
    /// wallet-only reco. Invariant: `reco_wallet_delta ∈ {wallet_delta, 0}`.
    pub reco_wallet_delta: Decimal,
}

impl Movement {
    /// Account-side delta of the movement: the account moves inversely to the
    /// wallet and vault combined. This is the value the ledger report shows.
    pub fn delta(&self) -> Decimal {
        -(self.wallet_delta + self.vault_delta)
    }

    /// Account-side delta honoring wallet-only reconciliation.
    pub fn reco_delta(&self) -> Decimal {
        -(self.reco_wallet_delta + self.vault_delta)
    }

    /// Movements with both deltas zero are never reconcilable.
    pub fn is_reconcilable(&self) -> bool {
        !self.wallet_delta.is_zero() || !self.vault_delta.is_zero()
    }

    pub fn in_scope(&self, period: &Period) -> bool {
        self.peer_id == period.peer_id
            && self.loop_id == period.loop_id
            && self.currency == period.currency
    }
}

/// One line of an external account statement, or a manual adjustment entered
/// by the operator through the save engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub id: AccountEntryId,
    pub period_id: PeriodId,
    pub peer_id: String,
    pub loop_id: String,
    pub currency: String,
    pub entry_date: NaiveDate,
    /// Negative for account decreases.
    pub delta: Decimal,
    pub desc: String,
    pub reco_id: Option<RecoId>,
}

impl AccountEntry {
    pub fn in_scope(&self, period: &Period) -> bool {
        self.loop_id == period.loop_id && self.currency == period.currency
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoType {
    Standard,
    WalletOnly,
    AccountOnly,
}

impl RecoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoType::Standard => "standard",
            RecoType::WalletOnly => "wallet_only",
            RecoType::AccountOnly => "account_only",
        }
    }
}

/// A reconciliation record. Referenced (never owned) by movements and account
/// entries through their `reco_id`; deleting a reco detaches them first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reco {
    pub id: RecoId,
    pub period_id: PeriodId,
    pub reco_type: RecoType,
    /// Derived: standard and owning no account entries. Internal recos are
    /// fully resolved within movements and hidden from the ledger report.
    pub internal: bool,
    /// True if the reco was created by the auto-matcher.
    pub auto: bool,
    /// True if an auto-created reco was later edited by an operator.
    pub auto_edited: bool,
    pub comment: String,
}

/// Balances the wallet/vault split created when a transfer leg crosses
/// issuers. Produced by ingestion; settled when `reco_id` is set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub id: ExchangeId,
    pub transfer_id: TransferId,
    pub peer_id: String,
    pub loop_id: String,
    pub currency: String,
    pub ts: DateTime<Utc>,
    pub wallet_delta: Decimal,
    pub vault_delta: Decimal,
    /// The auto-generated reco that originated the exchange.
    pub origin_reco_id: RecoId,
    /// The reco that settles the exchange, once reconciled.
    pub reco_id: Option<RecoId>,
    pub period_id: PeriodId,
}

impl Exchange {
    pub fn delta(&self) -> Decimal {
        -(self.wallet_delta + self.vault_delta)
    }
}
