//! Skill records: named instruction bundles surfaced to the model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SKILL_NAME_MAX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid skill name '{name}': expected lowercase alphanumeric words joined by single hyphens, 1-64 characters")]
pub struct InvalidSkillName {
    pub name: String,
}

/// A skill name matching `^[a-z0-9]+(-[a-z0-9]+)*$`, at most 64 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SkillName(String);

impl SkillName {
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidSkillName> {
        let value = value.into();
        if is_valid_skill_name(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidSkillName { name: value })
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid_skill_name(name: &str) -> bool {
    if name.is_empty() || name.len() > SKILL_NAME_MAX_LEN {
        return false;
    }
    name.split('-').all(|word| {
        !word.is_empty()
            && word
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    })
}

impl TryFrom<String> for SkillName {
    type Error = InvalidSkillName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SkillName> for String {
    fn from(value: SkillName) -> Self {
        value.0
    }
}

impl std::fmt::Display for SkillName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A skill as loaded from configuration. `path` is the skill's directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillRecord {
    pub name: SkillName,
    pub description: String,
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_names() {
        for name in ["a", "pdf", "code-review", "v2-api-docs", "x1-2-3"] {
            assert!(SkillName::new(name).is_ok(), "{name}");
        }
        assert!(SkillName::new("a".repeat(64)).is_ok());
    }

    #[test]
    fn rejects_invalid_names() {
        for name in ["", "-lead", "trail-", "double--hyphen", "Upper", "snake_case", "sp ace"] {
            assert!(SkillName::new(name).is_err(), "{name:?}");
        }
        assert!(SkillName::new("a".repeat(65)).is_err());
    }

    #[test]
    fn deserialize_validates_name() {
        let ok: Result<SkillRecord, _> = serde_json::from_value(serde_json::json!({
            "name": "release-notes",
            "description": "Draft release notes",
            "path": "/skills/release-notes"
        }));
        assert_eq!(ok.unwrap().name.as_str(), "release-notes");

        let bad: Result<SkillRecord, _> = serde_json::from_value(serde_json::json!({
            "name": "Release_Notes",
            "description": "",
            "path": "/skills"
        }));
        assert!(bad.is_err());
    }
}
