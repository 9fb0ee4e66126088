//! Tag catalog entries.

use serde::{Deserialize, Serialize};

/// Category of a catalog tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    Team,
    Player,
}

impl TagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagKind::Team => "team",
            TagKind::Player => "player",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "team" | "teams" => Some(TagKind::Team),
            "player" | "players" => Some(TagKind::Player),
            _ => None,
        }
    }
}

/// A keyword tag; articles whose title contains `name` receive it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagDefinition {
    pub name: String,
    pub kind: TagKind,
}
