use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::json;

use crn_param::{parse_amount, parse_currency, parse_date};
use crn_schemas::{AccountEntry, Movement, Period, RecoId, RecoType};
use crn_store::{NewAccountEntry, RecoCommit, Store};

use crate::error::SaveError;
use crate::types::{AccountEntryInput, EngineConfig, RecoInput, SaveOutcome};

/// Shape check for a typed amount field: optional sign, one numeric run,
/// optional currency word. Anything else is rejected before parsing.
static NEW_AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[+\-−]?[0-9.,]+(\s*[A-Za-z]+)?\s*$").unwrap());

/// Save a reconciliation: validate the full request, then apply it to the
/// store as one commit. `existing` is the reco being edited, if any.
///
/// All-or-nothing: any rejection happens before the store sees a write.
/// An existing reco emptied of movements, entries and comment is deleted.
pub fn save_reco(
    store: &mut Store,
    config: &EngineConfig,
    period: &Period,
    now: DateTime<Utc>,
    existing: Option<RecoId>,
    input: RecoInput,
) -> Result<SaveOutcome, SaveError> {
    let result = save_inner(store, config, period, now, existing, input);
    match &result {
        Ok(SaveOutcome::Saved { reco_id }) => {
            tracing::info!(%reco_id, "reconciliation saved");
        }
        Ok(SaveOutcome::Deleted { reco_id }) => {
            tracing::info!(%reco_id, "reconciliation deleted by emptying");
        }
        Ok(SaveOutcome::Empty) => {
            tracing::debug!("empty save request ignored");
        }
        Err(err) => {
            tracing::warn!(code = err.code(), "reconciliation save rejected: {err}");
        }
    }
    result
}

/// Delete a reconciliation outright. The store detaches every movement and
/// account entry before removing the row.
pub fn delete_reco(
    store: &mut Store,
    period: &Period,
    now: DateTime<Utc>,
    reco_id: RecoId,
) -> Result<(), SaveError> {
    match store.reco(reco_id) {
        Some(reco) if reco.period_id == period.id => {}
        _ => return Err(SaveError::RecoNotFound),
    }
    store
        .delete_reco(reco_id, now)
        .map_err(|err| SaveError::Store {
            message: err.to_string(),
        })?;
    tracing::info!(%reco_id, "reconciliation deleted");
    Ok(())
}

fn save_inner(
    store: &mut Store,
    config: &EngineConfig,
    period: &Period,
    now: DateTime<Utc>,
    existing: Option<RecoId>,
    input: RecoInput,
) -> Result<SaveOutcome, SaveError> {
    check_limits(config, &input)?;

    let movements = resolve_movements(store, period, existing, &input)?;
    check_scope_agreement(&movements)?;

    let entries = resolve_entries(store, period, existing, &input)?;

    // The reco being edited must exist and belong to this period.
    let mut was_auto = false;
    if let Some(reco_id) = existing {
        match store.reco(reco_id) {
            Some(reco) if reco.period_id == period.id => was_auto = reco.auto,
            _ => return Err(SaveError::RecoNotFound),
        }
    }

    let comment = input.comment.trim().to_string();

    check_type_invariants(&input.reco_type, &comment, &movements, &entries)?;

    if movements.is_empty()
        && entries.existing.is_empty()
        && entries.new.is_empty()
        && comment.is_empty()
    {
        return match existing {
            // Emptying a reco removes it.
            Some(reco_id) => {
                store
                    .delete_reco(reco_id, now)
                    .map_err(|err| SaveError::Store {
                        message: err.to_string(),
                    })?;
                Ok(SaveOutcome::Deleted { reco_id })
            }
            None => Ok(SaveOutcome::Empty),
        };
    }

    let internal = input.reco_type == RecoType::Standard
        && entries.existing.is_empty()
        && entries.new.is_empty();

    let movement_ids: Vec<_> = movements.iter().map(|m| m.id).collect();
    let account_entry_ids: Vec<_> = entries.existing.iter().map(|e| e.id).collect();
    let audit_event_type = if existing.is_some() {
        "reco_change"
    } else {
        "reco_add"
    };
    let audit_content = json!({
        "reco_id": existing.map(|id| id.0),
        "reco_type": input.reco_type.as_str(),
        "internal": internal,
        "movement_ids": movement_ids.iter().map(|id| id.0).collect::<Vec<_>>(),
        "account_entry_ids": account_entry_ids.iter().map(|id| id.0).collect::<Vec<_>>(),
        "new_entries": entries.new.len(),
        "comment": comment,
    });

    let commit = RecoCommit {
        existing,
        period_id: period.id,
        reco_type: input.reco_type,
        internal,
        auto: false,
        mark_auto_edited: was_auto,
        comment,
        movement_ids,
        wallet_only: input.reco_type == RecoType::WalletOnly,
        account_entry_ids,
        new_entries: entries.new,
        audit_event_type: audit_event_type.to_string(),
        audit_content,
    };

    let reco_id = store.apply(commit, now).map_err(|err| SaveError::Store {
        message: err.to_string(),
    })?;
    Ok(SaveOutcome::Saved { reco_id })
}

fn check_limits(config: &EngineConfig, input: &RecoInput) -> Result<(), SaveError> {
    if input.comment.chars().count() > config.max_comment_len {
        return Err(SaveError::CommentTooLong {
            limit: config.max_comment_len,
        });
    }
    if input.movement_ids.len() > config.max_movements {
        return Err(SaveError::TooManyMovements {
            limit: config.max_movements,
        });
    }
    if input.account_entries.len() > config.max_account_entries {
        return Err(SaveError::TooManyAccountEntries {
            limit: config.max_account_entries,
        });
    }
    for entry in &input.account_entries {
        if let AccountEntryInput::New { amount, desc, .. } = entry {
            if amount.chars().count() > config.max_amount_len {
                return Err(SaveError::FieldTooLong {
                    field: "amount",
                    limit: config.max_amount_len,
                });
            }
            if desc.chars().count() > config.max_desc_len {
                return Err(SaveError::FieldTooLong {
                    field: "description",
                    limit: config.max_desc_len,
                });
            }
            let amount = amount.trim();
            if !amount.is_empty() && !NEW_AMOUNT_RE.is_match(amount) {
                return Err(SaveError::InvalidAmount {
                    text: amount.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn resolve_movements(
    store: &Store,
    period: &Period,
    existing: Option<RecoId>,
    input: &RecoInput,
) -> Result<Vec<Movement>, SaveError> {
    if input.reco_type == RecoType::AccountOnly {
        if !input.movement_ids.is_empty() {
            return Err(SaveError::AccountOnlyExcludesMovements);
        }
        return Ok(Vec::new());
    }

    let mut ids = Vec::new();
    for id in &input.movement_ids {
        if !ids.contains(id) {
            ids.push(*id);
        }
    }

    let mut resolved = Vec::with_capacity(ids.len());
    for id in ids {
        let movement = store
            .movement(id)
            .filter(|m| m.period_id == period.id && m.in_scope(period))
            .filter(|m| m.is_reconcilable())
            .filter(|m| m.reco_id.is_none() || m.reco_id == existing)
            .ok_or(SaveError::InvalidMovementId)?;
        resolved.push(movement.clone());
    }
    Ok(resolved)
}

/// All resolved movements must agree on currency, cash design, transfer and
/// peer. The first disagreement wins.
fn check_scope_agreement(movements: &[Movement]) -> Result<(), SaveError> {
    let Some(first) = movements.first() else {
        return Ok(());
    };
    for m in &movements[1..] {
        if m.currency != first.currency {
            return Err(SaveError::MultipleCurrencies);
        }
        if m.loop_id != first.loop_id {
            return Err(SaveError::MultipleCashDesigns);
        }
        if m.transfer_id != first.transfer_id {
            return Err(SaveError::MultipleTransfers);
        }
        if m.peer_id != first.peer_id {
            return Err(SaveError::MultiplePeers);
        }
    }
    Ok(())
}

struct ResolvedEntries {
    existing: Vec<AccountEntry>,
    new: Vec<NewAccountEntry>,
}

fn resolve_entries(
    store: &Store,
    period: &Period,
    existing_reco: Option<RecoId>,
    input: &RecoInput,
) -> Result<ResolvedEntries, SaveError> {
    let mut resolved = ResolvedEntries {
        existing: Vec::new(),
        new: Vec::new(),
    };

    // The account statement side of a wallet-only reco stays untouched.
    if input.reco_type == RecoType::WalletOnly {
        return Ok(resolved);
    }

    for entry_input in &input.account_entries {
        match entry_input {
            AccountEntryInput::Existing(id) => {
                if resolved.existing.iter().any(|e| e.id == *id) {
                    continue;
                }
                let entry = store
                    .account_entry(*id)
                    .filter(|e| e.period_id == period.id && e.in_scope(period))
                    .filter(|e| !e.delta.is_zero())
                    .filter(|e| e.reco_id.is_none() || e.reco_id == existing_reco)
                    .ok_or(SaveError::InvalidAccountEntryId)?;
                resolved.existing.push(entry.clone());
            }
            AccountEntryInput::New { amount, date, desc } => {
                let amount = amount.trim();
                let date = date.trim();
                let desc = desc.trim();
                // A row the operator left entirely blank is not an entry.
                if amount.is_empty() && date.is_empty() && desc.is_empty() {
                    continue;
                }
                if amount.is_empty() {
                    return Err(SaveError::AmountRequired);
                }
                let parsed = parse_amount(amount).ok_or_else(|| SaveError::AmountParseError {
                    text: amount.to_string(),
                })?;
                if let Some(code) = parse_currency(amount) {
                    if code != period.currency {
                        return Err(SaveError::CurrencyMismatch {
                            expected: period.currency.clone(),
                        });
                    }
                }
                if date.is_empty() {
                    return Err(SaveError::DateRequired);
                }
                let entry_date = parse_date(date).ok_or_else(|| SaveError::DateParseError {
                    text: date.to_string(),
                })?;
                resolved.new.push(NewAccountEntry {
                    entry_date,
                    delta: parsed.value,
                    desc: desc.to_string(),
                });
            }
        }
    }
    Ok(resolved)
}

fn check_type_invariants(
    reco_type: &RecoType,
    comment: &str,
    movements: &[Movement],
    entries: &ResolvedEntries,
) -> Result<(), SaveError> {
    match reco_type {
        RecoType::Standard => {
            let wallet_sum: Decimal = movements.iter().map(|m| m.wallet_delta).sum();
            let vault_sum: Decimal = movements.iter().map(|m| m.vault_delta).sum();
            let account_sum: Decimal = entries.existing.iter().map(|e| e.delta).sum::<Decimal>()
                + entries.new.iter().map(|e| e.delta).sum::<Decimal>();
            if !(wallet_sum + vault_sum + account_sum).is_zero() {
                return Err(SaveError::UnbalancedReconciliation {
                    wallet_sum,
                    vault_sum,
                    account_sum,
                });
            }
        }
        RecoType::WalletOnly => {
            if movements.iter().any(|m| !m.vault_delta.is_zero()) {
                return Err(SaveError::WalletOnlyExcludesVault);
            }
            if comment.is_empty() {
                return Err(SaveError::CommentRequired);
            }
        }
        RecoType::AccountOnly => {
            if comment.is_empty() {
                return Err(SaveError::CommentRequired);
            }
        }
    }
    Ok(())
}
