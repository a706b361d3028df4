//! Change actions.

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// The kind of mutation a change event records.
///
/// Serialized on the wire as the single letters `"C"`, `"U"`, `"D"`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeAction {
    #[serde(rename = "C")]
    Created,
    #[serde(rename = "U")]
    Updated,
    #[serde(rename = "D")]
    Deleted,
}

impl ChangeAction {
    pub fn as_code(&self) -> &'static str {
        match self {
            ChangeAction::Created => "C",
            ChangeAction::Updated => "U",
            ChangeAction::Deleted => "D",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, SyncError> {
        match code {
            "C" => Ok(ChangeAction::Created),
            "U" => Ok(ChangeAction::Updated),
            "D" => Ok(ChangeAction::Deleted),
            other => Err(SyncError::validation(format!(
                "action must be one of C/U/D, got '{other}'"
            ))),
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, ChangeAction::Deleted)
    }
}

impl core::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_code())
    }
}
