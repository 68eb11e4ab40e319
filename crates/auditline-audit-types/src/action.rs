//! Audited mutation kinds.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// The kind of entity mutation an audit record describes.
///
/// Always supplied by the lifecycle hook that fired; never inferred from
/// entity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumIter, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AuditAction {
    /// Entity is about to be persisted for the first time.
    Create,
    /// Existing entity is about to be modified.
    Update,
    /// Entity is about to be removed.
    Delete,
}

impl AuditAction {
    /// Get all actions.
    pub fn all() -> impl Iterator<Item = Self> {
        use strum::IntoEnumIterator;
        Self::iter()
    }

    /// Whether a snapshot of the prior state is meaningful for this action.
    pub fn has_prior_state(&self) -> bool {
        matches!(self, Self::Update | Self::Delete)
    }
}
