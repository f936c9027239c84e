//! Durable storage for commands and queries.
//!
//! [`Store`] is the interface the interaction loop consumes. [`JsonStore`]
//! keeps every item in one JSON document and rewrites it atomically on each
//! mutation; a failed write leaves the in-memory copy untouched.

use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{Item, ItemKind};

const STORE_FILE: &str = "store.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub trait Store {
    /// Most recently used first (never used last), then newest first.
    fn list(&self, kind: ItemKind) -> Result<Vec<Item>>;
    fn add(&mut self, kind: ItemKind, name: &str, body: &str, description: &str) -> Result<i64>;
    fn update(
        &mut self,
        kind: ItemKind,
        id: i64,
        name: &str,
        body: &str,
        description: &str,
    ) -> Result<()>;
    fn delete(&mut self, kind: ItemKind, id: i64) -> Result<()>;
    fn mark_used(&mut self, kind: ItemKind, id: i64, at: DateTime<Utc>) -> Result<()>;
    /// Callers must drop sensitive values before saving.
    fn save_last_params(&mut self, id: i64, params: &HashMap<String, String>) -> Result<()>;
    fn is_duplicate_body(
        &self,
        kind: ItemKind,
        body: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool>;
    fn is_duplicate_name(
        &self,
        kind: ItemKind,
        name: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    next_id: i64,
    #[serde(default)]
    commands: Vec<Item>,
    #[serde(default)]
    queries: Vec<Item>,
}

impl StoreData {
    fn items(&self, kind: ItemKind) -> &Vec<Item> {
        match kind {
            ItemKind::Command => &self.commands,
            ItemKind::Query => &self.queries,
        }
    }

    fn items_mut(&mut self, kind: ItemKind) -> &mut Vec<Item> {
        match kind {
            ItemKind::Command => &mut self.commands,
            ItemKind::Query => &mut self.queries,
        }
    }

    fn item_mut(&mut self, kind: ItemKind, id: i64) -> Result<&mut Item> {
        self.items_mut(kind)
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(StoreError::NotFound {
                kind: kind.noun(),
                id,
            })
    }

    fn allocate_id(&mut self) -> i64 {
        let highest = self
            .commands
            .iter()
            .chain(self.queries.iter())
            .map(|item| item.id)
            .max()
            .unwrap_or_default();
        self.next_id = self.next_id.max(highest) + 1;
        self.next_id
    }

    fn any_other(
        &self,
        kind: ItemKind,
        exclude_id: Option<i64>,
        matches: impl Fn(&Item) -> bool,
    ) -> bool {
        self.items(kind)
            .iter()
            .filter(|item| Some(item.id) != exclude_id)
            .any(matches)
    }
}

pub struct JsonStore {
    path: Option<PathBuf>,
    data: StoreData,
}

impl JsonStore {
    /// Opens the store at `path`, creating parent directories as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = if path.exists() {
            let content = fs::read_to_string(path)?;
            if content.trim().is_empty() {
                StoreData::default()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            StoreData::default()
        };

        info!(
            path = %path.display(),
            commands = data.commands.len(),
            queries = data.queries.len(),
            "store opened"
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            data,
        })
    }

    /// Store that never touches the filesystem.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: StoreData::default(),
        }
    }

    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join(STORE_FILE)
    }

    fn mutate<T>(&mut self, apply: impl FnOnce(&mut StoreData) -> Result<T>) -> Result<T> {
        let mut next = self.data.clone();
        let value = apply(&mut next)?;
        if let Some(path) = &self.path {
            persist(path, &next)?;
        }
        self.data = next;
        Ok(value)
    }
}

fn persist(path: &Path, data: &StoreData) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    let file = fs::File::create(&tmp_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    fs::rename(&tmp_path, path)?;
    debug!(path = %path.display(), "store saved");
    Ok(())
}

impl Store for JsonStore {
    fn list(&self, kind: ItemKind) -> Result<Vec<Item>> {
        let mut items = self.data.items(kind).clone();
        items.sort_by(|a, b| {
            // `None` sorts below `Some`, so reversing puts never-used items last.
            b.last_used_at
                .cmp(&a.last_used_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(items)
    }

    fn add(&mut self, kind: ItemKind, name: &str, body: &str, description: &str) -> Result<i64> {
        let id = self.mutate(|data| {
            let id = data.allocate_id();
            data.items_mut(kind).push(Item {
                id,
                name: name.to_string(),
                body: body.to_string(),
                description: description.to_string(),
                created_at: Utc::now(),
                last_used_at: None,
                last_params: HashMap::new(),
            });
            Ok(id)
        })?;
        debug!(kind = kind.noun(), id, "item added");
        Ok(id)
    }

    fn update(
        &mut self,
        kind: ItemKind,
        id: i64,
        name: &str,
        body: &str,
        description: &str,
    ) -> Result<()> {
        self.mutate(|data| {
            let item = data.item_mut(kind, id)?;
            item.name = name.to_string();
            item.body = body.to_string();
            item.description = description.to_string();
            Ok(())
        })
    }

    fn delete(&mut self, kind: ItemKind, id: i64) -> Result<()> {
        self.mutate(|data| {
            let items = data.items_mut(kind);
            let before = items.len();
            items.retain(|item| item.id != id);
            if items.len() == before {
                return Err(StoreError::NotFound {
                    kind: kind.noun(),
                    id,
                });
            }
            Ok(())
        })
    }

    fn mark_used(&mut self, kind: ItemKind, id: i64, at: DateTime<Utc>) -> Result<()> {
        self.mutate(|data| {
            data.item_mut(kind, id)?.last_used_at = Some(at);
            Ok(())
        })
    }

    fn save_last_params(&mut self, id: i64, params: &HashMap<String, String>) -> Result<()> {
        self.mutate(|data| {
            data.item_mut(ItemKind::Command, id)?.last_params = params.clone();
            Ok(())
        })
    }

    fn is_duplicate_body(
        &self,
        kind: ItemKind,
        body: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        let normalized = body.trim();
        Ok(self
            .data
            .any_other(kind, exclude_id, |item| item.body.trim() == normalized))
    }

    fn is_duplicate_name(
        &self,
        kind: ItemKind,
        name: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        let normalized = name.trim();
        Ok(self
            .data
            .any_other(kind, exclude_id, |item| item.name.trim() == normalized))
    }
}
