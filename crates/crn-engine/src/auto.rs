use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;

use crn_match::{find_internal_groups, RunMovement};
use crn_schemas::{Period, RecoId, RecoType};
use crn_store::{RecoCommit, Store};

/// Partition a period's unreconciled movements into self-balancing runs and
/// commit one internal standard reco per run. Movements already reconciled
/// act as barriers and keep their links.
///
/// Returns the ids of the recos created, in movement order.
pub fn auto_reco_groups(
    store: &mut Store,
    period: &Period,
    now: DateTime<Utc>,
) -> Result<Vec<RecoId>> {
    let rows = store.movements_in_period(period.id);

    let inputs: Vec<RunMovement> = rows
        .iter()
        .filter(|m| m.is_reconcilable())
        .map(|m| RunMovement::new(m.id, m.wallet_delta + m.vault_delta, m.action.is_internal()))
        .collect();
    let excluded = rows
        .iter()
        .filter(|m| m.reco_id.is_some())
        .map(|m| m.id)
        .collect();

    let groups = find_internal_groups(&inputs, &excluded);

    let mut reco_ids = Vec::with_capacity(groups.len());
    for group in groups {
        let commit = RecoCommit {
            existing: None,
            period_id: period.id,
            reco_type: RecoType::Standard,
            internal: true,
            auto: true,
            mark_auto_edited: false,
            comment: String::new(),
            movement_ids: group.clone(),
            wallet_only: false,
            account_entry_ids: Vec::new(),
            new_entries: Vec::new(),
            audit_event_type: "auto_reco".to_string(),
            audit_content: json!({
                "movement_ids": group.iter().map(|id| id.0).collect::<Vec<_>>(),
            }),
        };
        let reco_id = store
            .apply(commit, now)
            .context("auto reco commit failed")?;
        reco_ids.push(reco_id);
    }

    tracing::info!(
        period_id = %period.id,
        created = reco_ids.len(),
        "automatic internal reconciliation complete"
    );
    Ok(reco_ids)
}
