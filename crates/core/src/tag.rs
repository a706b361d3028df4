//! App-qualified entity tags.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Fully-qualified entity type name: `<app_label>.<ModelName>`.
///
/// The tag is the lookup key into the entity registry and the generic
/// reference stored on change events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityTag(String);

impl EntityTag {
    /// Build a tag from its two halves. Both must be non-empty and free of
    /// dots.
    pub fn new(app_label: &str, model_name: &str) -> Result<Self, SyncError> {
        if app_label.is_empty() || model_name.is_empty() {
            return Err(SyncError::validation("entity tag halves must be non-empty"));
        }
        if app_label.contains('.') || model_name.contains('.') {
            return Err(SyncError::validation(
                "entity tag halves must not contain '.'",
            ));
        }
        Ok(Self(format!("{app_label}.{model_name}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn app_label(&self) -> &str {
        self.0.split_once('.').map(|(a, _)| a).unwrap_or(&self.0)
    }

    pub fn model_name(&self) -> &str {
        self.0.split_once('.').map(|(_, m)| m).unwrap_or("")
    }
}

impl core::fmt::Display for EntityTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityTag {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((app, model)) if !app.is_empty() && !model.is_empty() && !model.contains('.') => {
                Ok(Self(s.to_string()))
            }
            _ => Err(SyncError::validation(format!(
                "entity tag must be '<app_label>.<ModelName>', got '{s}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_qualified_names() {
        let tag: EntityTag = "drivers.Driver".parse().unwrap();
        assert_eq!(tag.app_label(), "drivers");
        assert_eq!(tag.model_name(), "Driver");
        assert_eq!(tag.to_string(), "drivers.Driver");
    }

    #[test]
    fn rejects_malformed_tags() {
        assert!("drivers".parse::<EntityTag>().is_err());
        assert!(".Driver".parse::<EntityTag>().is_err());
        assert!("drivers.".parse::<EntityTag>().is_err());
        assert!("a.b.c".parse::<EntityTag>().is_err());
    }
}
