use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Which taxonomy a mapped skill came from.
///
/// Stored as a plain TEXT tag so adding a second framework is a new tag
/// value, not a schema migration. Only ESCO is implemented today.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SkillSystem {
    Esco,
    Other(String),
}

pub const ESCO_TAG: &str = "ESCO";

impl SkillSystem {
    pub fn as_tag(&self) -> &str {
        match self {
            SkillSystem::Esco => ESCO_TAG,
            SkillSystem::Other(tag) => tag,
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        if tag == ESCO_TAG {
            SkillSystem::Esco
        } else {
            SkillSystem::Other(tag.to_string())
        }
    }

    /// All systems the API knows how to populate.
    pub fn known() -> Vec<&'static str> {
        vec![ESCO_TAG]
    }
}

impl fmt::Display for SkillSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl Serialize for SkillSystem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_tag())
    }
}

impl<'de> Deserialize<'de> for SkillSystem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(SkillSystem::from_tag(&tag))
    }
}

/// A skill phrase successfully linked to a taxonomy entry.
///
/// `origin_message_id` always references a message in `session_id` — the
/// pipeline only ever links a skill to the message it just persisted.
/// `preferred_label` and `description` are language→string JSON maps.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MappedSkillRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub origin_message_id: Uuid,
    pub skill_system: String,
    pub uri: String,
    pub title: String,
    pub reference_language: String,
    pub preferred_label: Value,
    pub description: Value,
    pub extra_links: Value,
    pub created_at: DateTime<Utc>,
}
