//! crn-engine
//!
//! The reconciliation save engine and candidate search.
//!
//! Architectural decisions:
//! - Validate everything, then mutate once. `save_reco` resolves and checks
//!   every reference before handing the store a single `RecoCommit`; a
//!   rejected save leaves no trace.
//! - Every rejection carries a stable machine-readable code plus a prose
//!   description an operator can act on.
//! - Search never fails: unusable filter text means "no filter", and no
//!   usable filter at all means an empty result.
//! - Pure decision logic plus one store call. No IO, no wall clock; callers
//!   pass `now`.

mod auto;
mod error;
mod save;
mod search;
mod types;

pub use auto::auto_reco_groups;
pub use error::SaveError;
pub use save::{delete_reco, save_reco};
pub use search::{search_account_entries, search_movements};
pub use types::*;
