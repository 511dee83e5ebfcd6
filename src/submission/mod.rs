// Anonymous message submission: domain types, storage, and the gate that
// runs the checks in order.
pub mod domain;
pub mod gate;
pub mod repository;

pub use domain::{inbox_slug, Disposition, Submission};
pub use gate::{GateError, SubmissionGate};
pub use repository::{SqliteSubmissionRepository, SubmissionRepository};

use crate::state::AppState;

/// Gate backed by the application's database and in-memory stores.
pub fn gate_for(state: &AppState) -> SubmissionGate<SqliteSubmissionRepository> {
    SubmissionGate::new(
        SqliteSubmissionRepository::new(state.db.clone()),
        state.rate_limiter.clone(),
        state.inbox_access.clone(),
        state.config.limits.message_max_chars,
    )
}
