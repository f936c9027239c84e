use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What an item's body holds. Each kind is listed on its own tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// Shell command template, may contain placeholders.
    Command,
    /// SQL snippet; shown, never executed.
    Query,
}

impl ItemKind {
    pub fn other(self) -> Self {
        match self {
            ItemKind::Command => ItemKind::Query,
            ItemKind::Query => ItemKind::Command,
        }
    }

    pub fn noun(self) -> &'static str {
        match self {
            ItemKind::Command => "command",
            ItemKind::Query => "query",
        }
    }

    pub fn body_label(self) -> &'static str {
        match self {
            ItemKind::Command => "Command",
            ItemKind::Query => "SQL",
        }
    }

    /// Wording used when another item already has the same body.
    pub fn body_phrase(self) -> &'static str {
        match self {
            ItemKind::Command => "command",
            ItemKind::Query => "SQL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub body: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Last values of non-sensitive placeholders, keyed by name.
    #[serde(default)]
    pub last_params: HashMap<String, String>,
}

impl Item {
    /// Text the fuzzy ranking runs against.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.name, self.body)
    }

    /// First line of the body, for single-row previews.
    pub fn preview(&self) -> &str {
        self.body.lines().next().unwrap_or_default()
    }
}
