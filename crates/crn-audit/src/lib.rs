//! crn-audit
//!
//! Append-only audit trail for reconciliation mutations. Every save records
//! one event in the same transaction as the mutation it describes. Events
//! carry an optional hash chain (hash_prev + hash_self over canonical JSON)
//! so an exported log can be verified for tampering.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub owner_id: String,
    /// "reco_add", "reco_change", "reco_delete", "auto_reco", ...
    pub event_type: String,
    pub content: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Append-only event log. The store owns one and appends inside `apply`, so
/// the trail commits or rolls back with the mutation it records.
#[derive(Debug, Default)]
pub struct AuditLog {
    events: Vec<AuditEvent>,
    hash_chain: bool,
    last_hash: Option<String>,
}

impl AuditLog {
    pub fn new(hash_chain: bool) -> Self {
        Self {
            events: Vec::new(),
            hash_chain,
            last_hash: None,
        }
    }

    /// Append one event and return it as recorded.
    pub fn append(
        &mut self,
        ts_utc: DateTime<Utc>,
        owner_id: &str,
        event_type: &str,
        content: Value,
    ) -> Result<AuditEvent> {
        let mut ev = AuditEvent {
            event_id: Uuid::new_v4(),
            ts_utc,
            owner_id: owner_id.to_string(),
            event_type: event_type.to_string(),
            content,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            ev.hash_prev = self.last_hash.clone();
            let self_hash = compute_event_hash(&ev)?;
            ev.hash_self = Some(self_hash.clone());
            self.last_hash = Some(self_hash);
        }

        self.events.push(ev.clone());
        Ok(ev)
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// One event per line, canonical JSON.
    pub fn to_jsonl(&self) -> Result<String> {
        let mut out = String::new();
        for ev in &self.events {
            out.push_str(&canonical_json_line(ev)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Append the full log to a JSONL file (creating it if needed).
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open audit log {:?}", path))?;
        f.write_all(self.to_jsonl()?.as_bytes())
            .context("write audit lines failed")?;
        Ok(())
    }
}

/// Canonicalize by sorting keys recursively and emitting compact JSON.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit event failed")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash is computed from canonical JSON of the event WITHOUT hash_self.
pub fn compute_event_hash(ev: &AuditEvent) -> Result<String> {
    let mut clone = ev.clone();
    clone.hash_self = None;

    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Result of hash chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { events: usize },
    Broken { index: usize, reason: String },
}

/// Walk the chain: every hash_prev must match the previous hash_self, and
/// every hash_self must recompute.
pub fn verify_hash_chain(events: &[AuditEvent]) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;

    for (i, ev) in events.iter().enumerate() {
        if ev.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                index: i,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, ev.hash_prev
                ),
            });
        }

        if let Some(ref claimed) = ev.hash_self {
            let recomputed = compute_event_hash(ev)?;
            if *claimed != recomputed {
                return Ok(VerifyResult::Broken {
                    index: i,
                    reason: format!("hash_self mismatch: claimed {claimed}, recomputed {recomputed}"),
                });
            }
        }

        prev_hash = ev.hash_self.clone();
    }

    Ok(VerifyResult::Valid {
        events: events.len(),
    })
}
