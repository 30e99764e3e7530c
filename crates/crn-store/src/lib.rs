//! Deterministic in-memory reconciliation store.
//!
//! Design decisions (kept intentionally simple/deterministic):
//! - Tables are `BTreeMap`s keyed by id, so iteration order is stable.
//! - One id sequence feeds every table; ids are assigned on insert.
//! - `apply` is the only mutation entry point for reconciliation state.
//!   The save engine validates first and hands the store a fully resolved
//!   `RecoCommit`; the store executes it as a unit and appends the change
//!   logs and the audit event in the same step.
//! - Deleting a reco detaches every reference before removing the row, so
//!   no movement or account entry ever points at a missing reco.
//!
//! A SQL-backed store would implement the same surface; nothing in the
//! engine or report crates knows these tables live in memory.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};

use crn_audit::{AuditEvent, AuditLog};
use crn_schemas::{
    AccountEntry, AccountEntryId, Exchange, ExchangeId, Movement, MovementId, Period, PeriodId,
    Reco, RecoId, RecoType,
};

/// Append-only record of one change to a movement's mutable fields.
#[derive(Clone, Debug, Serialize)]
pub struct MovementLog {
    pub ts: DateTime<Utc>,
    pub movement_id: MovementId,
    /// "link", "unlink", "auto_link".
    pub event_type: String,
    pub changes: Value,
}

/// Append-only record of one change to an account entry.
#[derive(Clone, Debug, Serialize)]
pub struct AccountEntryLog {
    pub ts: DateTime<Utc>,
    pub account_entry_id: AccountEntryId,
    /// "link", "unlink", "manual_add".
    pub event_type: String,
    pub changes: Value,
}

/// A new manual account entry carried inside a [`RecoCommit`].
#[derive(Clone, Debug)]
pub struct NewAccountEntry {
    pub entry_date: NaiveDate,
    pub delta: Decimal,
    pub desc: String,
}

/// A fully validated reconciliation commit. Built by the save engine (or the
/// auto-matcher) after all checks pass; the store applies it without further
/// validation.
#[derive(Clone, Debug)]
pub struct RecoCommit {
    /// `None` creates a reco, `Some` updates one.
    pub existing: Option<RecoId>,
    pub period_id: PeriodId,
    pub reco_type: RecoType,
    pub internal: bool,
    pub auto: bool,
    /// Set when an operator edits an auto-created reco.
    pub mark_auto_edited: bool,
    pub comment: String,
    /// Movements linked after the commit. Movements currently linked to
    /// `existing` but absent here are detached.
    pub movement_ids: Vec<MovementId>,
    /// Under wallet_only, linked movements get `reco_wallet_delta = 0`.
    pub wallet_only: bool,
    pub account_entry_ids: Vec<AccountEntryId>,
    pub new_entries: Vec<NewAccountEntry>,
    /// "reco_add", "reco_change" or "auto_reco".
    pub audit_event_type: String,
    pub audit_content: Value,
}

/// In-memory reconciliation store for one owner.
#[derive(Debug)]
pub struct Store {
    owner_id: String,
    periods: BTreeMap<PeriodId, Period>,
    movements: BTreeMap<MovementId, Movement>,
    account_entries: BTreeMap<AccountEntryId, AccountEntry>,
    recos: BTreeMap<RecoId, Reco>,
    exchanges: BTreeMap<ExchangeId, Exchange>,
    movement_log: Vec<MovementLog>,
    account_entry_log: Vec<AccountEntryLog>,
    audit: AuditLog,
    next_id: i64,
}

impl Store {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            periods: BTreeMap::new(),
            movements: BTreeMap::new(),
            account_entries: BTreeMap::new(),
            recos: BTreeMap::new(),
            exchanges: BTreeMap::new(),
            movement_log: Vec::new(),
            account_entry_log: Vec::new(),
            audit: AuditLog::new(true),
            next_id: 1,
        }
    }

    fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    // ---- seeding (ingestion stand-ins) ------------------------------------

    pub fn add_period(&mut self, peer_id: &str, loop_id: &str, currency: &str) -> PeriodId {
        let id = PeriodId(self.next_id());
        self.periods.insert(
            id,
            Period {
                id,
                peer_id: peer_id.to_string(),
                loop_id: loop_id.to_string(),
                currency: currency.to_string(),
            },
        );
        id
    }

    /// Insert a movement with a fresh id. Linkage fields are forced to their
    /// unreconciled state regardless of what the caller passed.
    pub fn add_movement(&mut self, mut movement: Movement) -> MovementId {
        let id = MovementId(self.next_id());
        movement.id = id;
        movement.reco_id = None;
        movement.reco_wallet_delta = movement.wallet_delta;
        self.movements.insert(id, movement);
        id
    }

    /// Insert an account entry with a fresh id, unlinked.
    pub fn add_account_entry(&mut self, mut entry: AccountEntry) -> AccountEntryId {
        let id = AccountEntryId(self.next_id());
        entry.id = id;
        entry.reco_id = None;
        self.account_entries.insert(id, entry);
        id
    }

    /// Insert an unsettled exchange with a fresh id.
    pub fn add_exchange(&mut self, mut exchange: Exchange) -> ExchangeId {
        let id = ExchangeId(self.next_id());
        exchange.id = id;
        exchange.reco_id = None;
        self.exchanges.insert(id, exchange);
        id
    }

    // ---- reads ------------------------------------------------------------

    pub fn period(&self, id: PeriodId) -> Option<&Period> {
        self.periods.get(&id)
    }

    pub fn movement(&self, id: MovementId) -> Option<&Movement> {
        self.movements.get(&id)
    }

    pub fn account_entry(&self, id: AccountEntryId) -> Option<&AccountEntry> {
        self.account_entries.get(&id)
    }

    pub fn reco(&self, id: RecoId) -> Option<&Reco> {
        self.recos.get(&id)
    }

    pub fn exchange(&self, id: ExchangeId) -> Option<&Exchange> {
        self.exchanges.get(&id)
    }

    pub fn movements(&self) -> impl Iterator<Item = &Movement> {
        self.movements.values()
    }

    pub fn account_entries(&self) -> impl Iterator<Item = &AccountEntry> {
        self.account_entries.values()
    }

    pub fn recos(&self) -> impl Iterator<Item = &Reco> {
        self.recos.values()
    }

    pub fn exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.values()
    }

    /// Movements of one period in network order: timestamp, then transfer,
    /// then leg number and sub-amount index. This is the order the
    /// auto-matcher partitions.
    pub fn movements_in_period(&self, period_id: PeriodId) -> Vec<&Movement> {
        let mut rows: Vec<&Movement> = self
            .movements
            .values()
            .filter(|m| m.period_id == period_id)
            .collect();
        rows.sort_by_key(|m| (m.ts, m.transfer_id, m.number, m.amount_index, m.id));
        rows
    }

    /// Account entries of one period, statement order.
    pub fn account_entries_in_period(&self, period_id: PeriodId) -> Vec<&AccountEntry> {
        let mut rows: Vec<&AccountEntry> = self
            .account_entries
            .values()
            .filter(|e| e.period_id == period_id)
            .collect();
        rows.sort_by(|a, b| (a.entry_date, a.id).cmp(&(b.entry_date, b.id)));
        rows
    }

    pub fn movements_for_reco(&self, reco_id: RecoId) -> Vec<&Movement> {
        self.movements
            .values()
            .filter(|m| m.reco_id == Some(reco_id))
            .collect()
    }

    pub fn account_entries_for_reco(&self, reco_id: RecoId) -> Vec<&AccountEntry> {
        self.account_entries
            .values()
            .filter(|e| e.reco_id == Some(reco_id))
            .collect()
    }

    pub fn movement_log(&self) -> &[MovementLog] {
        &self.movement_log
    }

    pub fn account_entry_log(&self) -> &[AccountEntryLog] {
        &self.account_entry_log
    }

    pub fn audit_events(&self) -> &[AuditEvent] {
        self.audit.events()
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    // ---- mutations --------------------------------------------------------

    /// Execute a validated commit: detach removed links, create or update the
    /// reco, persist new entries, link movements and entries, write the
    /// change logs and the audit event. Returns the reco id.
    ///
    /// The commit is taken at face value; callers validate first. A dangling
    /// reference here is a logic fault and fails the whole apply with no
    /// partial state visible to readers (errors are only raised before the
    /// first write).
    pub fn apply(&mut self, commit: RecoCommit, now: DateTime<Utc>) -> Result<RecoId> {
        // Resolve everything fallible up front so the mutation below cannot
        // stop halfway.
        if let Some(reco_id) = commit.existing {
            if !self.recos.contains_key(&reco_id) {
                bail!("apply: reco {reco_id} not found");
            }
        }
        for id in &commit.movement_ids {
            if !self.movements.contains_key(id) {
                bail!("apply: movement {id} not found");
            }
        }
        for id in &commit.account_entry_ids {
            if !self.account_entries.contains_key(id) {
                bail!("apply: account entry {id} not found");
            }
        }
        let period = match self.periods.get(&commit.period_id) {
            Some(p) => p.clone(),
            None => bail!("apply: period {} not found", commit.period_id),
        };

        let reco_id = match commit.existing {
            Some(id) => id,
            None => RecoId(self.next_id()),
        };

        // Detach links dropped by this save.
        if commit.existing.is_some() {
            let detach_movements: Vec<MovementId> = self
                .movements
                .values()
                .filter(|m| m.reco_id == Some(reco_id) && !commit.movement_ids.contains(&m.id))
                .map(|m| m.id)
                .collect();
            for id in detach_movements {
                self.unlink_movement(id, now);
            }

            let detach_entries: Vec<AccountEntryId> = self
                .account_entries
                .values()
                .filter(|e| {
                    e.reco_id == Some(reco_id) && !commit.account_entry_ids.contains(&e.id)
                })
                .map(|e| e.id)
                .collect();
            for id in detach_entries {
                self.unlink_account_entry(id, now);
            }
        }

        // Create or update the reco row.
        match self.recos.get_mut(&reco_id) {
            Some(reco) => {
                reco.reco_type = commit.reco_type;
                reco.internal = commit.internal;
                reco.comment = commit.comment.clone();
                if commit.mark_auto_edited {
                    reco.auto_edited = true;
                }
            }
            None => {
                self.recos.insert(
                    reco_id,
                    Reco {
                        id: reco_id,
                        period_id: commit.period_id,
                        reco_type: commit.reco_type,
                        internal: commit.internal,
                        auto: commit.auto,
                        auto_edited: false,
                        comment: commit.comment.clone(),
                    },
                );
            }
        }

        // Persist operator-typed entries, then link everything.
        let mut entry_ids = commit.account_entry_ids.clone();
        for new_entry in &commit.new_entries {
            let id = AccountEntryId(self.next_id());
            self.account_entries.insert(
                id,
                AccountEntry {
                    id,
                    period_id: commit.period_id,
                    peer_id: period.peer_id.clone(),
                    loop_id: period.loop_id.clone(),
                    currency: period.currency.clone(),
                    entry_date: new_entry.entry_date,
                    delta: new_entry.delta,
                    desc: new_entry.desc.clone(),
                    reco_id: None,
                },
            );
            self.account_entry_log.push(AccountEntryLog {
                ts: now,
                account_entry_id: id,
                event_type: "manual_add".to_string(),
                changes: json!({
                    "entry_date": new_entry.entry_date.to_string(),
                    "delta": new_entry.delta.to_string(),
                    "desc": new_entry.desc,
                }),
            });
            entry_ids.push(id);
        }

        let event_type = if commit.auto { "auto_link" } else { "link" };
        for id in commit.movement_ids {
            // Presence was checked before the first write.
            let Some(movement) = self.movements.get_mut(&id) else {
                continue;
            };
            let reco_wallet_delta = if commit.wallet_only {
                Decimal::ZERO
            } else {
                movement.wallet_delta
            };
            if movement.reco_id == Some(reco_id)
                && movement.reco_wallet_delta == reco_wallet_delta
            {
                continue;
            }
            movement.reco_id = Some(reco_id);
            movement.reco_wallet_delta = reco_wallet_delta;
            self.movement_log.push(MovementLog {
                ts: now,
                movement_id: id,
                event_type: event_type.to_string(),
                changes: json!({
                    "reco_id": reco_id.0,
                    "reco_wallet_delta": reco_wallet_delta.to_string(),
                }),
            });
        }

        for id in entry_ids {
            let Some(entry) = self.account_entries.get_mut(&id) else {
                continue;
            };
            if entry.reco_id == Some(reco_id) {
                continue;
            }
            entry.reco_id = Some(reco_id);
            self.account_entry_log.push(AccountEntryLog {
                ts: now,
                account_entry_id: id,
                event_type: "link".to_string(),
                changes: json!({"reco_id": reco_id.0}),
            });
        }

        let owner_id = self.owner_id.clone();
        self.audit
            .append(now, &owner_id, &commit.audit_event_type, commit.audit_content)?;

        Ok(reco_id)
    }

    /// Remove a reco: detach every movement and account entry referencing it
    /// (logging each change), then delete the row and audit the deletion.
    pub fn delete_reco(&mut self, reco_id: RecoId, now: DateTime<Utc>) -> Result<()> {
        if !self.recos.contains_key(&reco_id) {
            bail!("delete_reco: reco {reco_id} not found");
        }

        let movement_ids: Vec<MovementId> = self
            .movements
            .values()
            .filter(|m| m.reco_id == Some(reco_id))
            .map(|m| m.id)
            .collect();
        for id in movement_ids {
            self.unlink_movement(id, now);
        }

        let entry_ids: Vec<AccountEntryId> = self
            .account_entries
            .values()
            .filter(|e| e.reco_id == Some(reco_id))
            .map(|e| e.id)
            .collect();
        for id in entry_ids {
            self.unlink_account_entry(id, now);
        }

        for exchange in self.exchanges.values_mut() {
            if exchange.reco_id == Some(reco_id) {
                exchange.reco_id = None;
            }
        }

        self.recos.remove(&reco_id);
        let owner_id = self.owner_id.clone();
        self.audit
            .append(now, &owner_id, "reco_delete", json!({"reco_id": reco_id.0}))?;
        Ok(())
    }

    /// Settle an exchange against a reco.
    pub fn settle_exchange(&mut self, exchange_id: ExchangeId, reco_id: RecoId) -> Result<()> {
        match self.exchanges.get_mut(&exchange_id) {
            Some(exchange) => {
                exchange.reco_id = Some(reco_id);
                Ok(())
            }
            None => bail!("settle_exchange: exchange {exchange_id} not found"),
        }
    }

    fn unlink_movement(&mut self, id: MovementId, now: DateTime<Utc>) {
        if let Some(movement) = self.movements.get_mut(&id) {
            movement.reco_id = None;
            movement.reco_wallet_delta = movement.wallet_delta;
            self.movement_log.push(MovementLog {
                ts: now,
                movement_id: id,
                event_type: "unlink".to_string(),
                changes: json!({
                    "reco_id": Value::Null,
                    "reco_wallet_delta": movement.reco_wallet_delta.to_string(),
                }),
            });
        }
    }

    fn unlink_account_entry(&mut self, id: AccountEntryId, now: DateTime<Utc>) {
        if let Some(entry) = self.account_entries.get_mut(&id) {
            entry.reco_id = None;
            self.account_entry_log.push(AccountEntryLog {
                ts: now,
                account_entry_id: id,
                event_type: "unlink".to_string(),
                changes: json!({"reco_id": Value::Null}),
            });
        }
    }
}
