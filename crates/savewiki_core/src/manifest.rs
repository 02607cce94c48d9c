use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::GameRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Added,
    Updated,
    Unchanged,
}

impl MergeOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Game records keyed by wiki page title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    games: BTreeMap<String, GameRecord>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let rendered = serde_yaml::to_string(self).context("failed to serialize manifest")?;
        fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Replaces the stored record for `title`; a page is always rebuilt whole.
    pub fn merge_game(&mut self, title: &str, record: GameRecord) -> MergeOutcome {
        match self.games.get_mut(title) {
            Some(existing) if *existing == record => MergeOutcome::Unchanged,
            Some(existing) => {
                *existing = record;
                MergeOutcome::Updated
            }
            None => {
                self.games.insert(title.to_string(), record);
                MergeOutcome::Added
            }
        }
    }

    pub fn get(&self, title: &str) -> Option<&GameRecord> {
        self.games.get(title)
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}
