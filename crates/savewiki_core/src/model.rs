use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Windows,
    Mac,
    Linux,
    Dos,
}

impl Os {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Mac => "mac",
            Self::Linux => "linux",
            Self::Dos => "dos",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Store {
    Steam,
    Gog,
    Epic,
    Uplay,
    Microsoft,
}

impl Store {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Steam => "steam",
            Self::Gog => "gog",
            Self::Epic => "epic",
            Self::Uplay => "uplay",
            Self::Microsoft => "microsoft",
        }
    }
}

/// Applicability predicate for a path: a missing axis means "any".
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Constraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<Os>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<Store>,
}

impl Constraint {
    pub const fn os(os: Os) -> Self {
        Self {
            os: Some(os),
            store: None,
        }
    }

    pub const fn store(store: Store) -> Self {
        Self {
            os: None,
            store: Some(store),
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.os.is_none() && self.store.is_none()
    }

    pub fn describe(&self) -> String {
        match (self.os, self.store) {
            (Some(os), Some(store)) => format!("{}+{}", os.as_str(), store.as_str()),
            (Some(os), None) => os.as_str().to_string(),
            (None, Some(store)) => store.as_str().to_string(),
            (None, None) => "any".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathType {
    FileSystem,
    Registry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    Save,
    Config,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl PathEntry {
    /// Adds the constraint unless it is unconstrained or already present.
    pub fn add_constraint(&mut self, constraint: Constraint) -> bool {
        if constraint.is_unconstrained() || self.when.contains(&constraint) {
            return false;
        }
        self.when.push(constraint);
        true
    }

    pub fn add_tag(&mut self, tag: Tag) -> bool {
        if self.tags.contains(&tag) {
            return false;
        }
        self.tags.push(tag);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteamInfo {
    pub id: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steam: Option<SteamInfo>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, PathEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub registry: BTreeMap<String, PathEntry>,
}

impl GameRecord {
    pub fn entries_mut(&mut self, path_type: PathType) -> &mut BTreeMap<String, PathEntry> {
        match path_type {
            PathType::FileSystem => &mut self.files,
            PathType::Registry => &mut self.registry,
        }
    }

    /// Get-or-insert the entry for `path`, then apply `update` to it.
    pub fn upsert_entry<F>(&mut self, path_type: PathType, path: &str, update: F)
    where
        F: FnOnce(&mut PathEntry),
    {
        let entry = self
            .entries_mut(path_type)
            .entry(path.to_string())
            .or_default();
        update(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.registry.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_equality_covers_both_axes() {
        assert_eq!(Constraint::default(), Constraint::default());
        assert_ne!(Constraint::os(Os::Windows), Constraint::store(Store::Steam));
        assert_ne!(
            Constraint::os(Os::Windows),
            Constraint {
                os: Some(Os::Windows),
                store: Some(Store::Microsoft),
            }
        );
    }

    #[test]
    fn path_entry_keeps_set_semantics() {
        let mut entry = PathEntry::default();
        assert!(entry.add_constraint(Constraint::store(Store::Steam)));
        assert!(!entry.add_constraint(Constraint::store(Store::Steam)));
        assert!(!entry.add_constraint(Constraint::default()));
        assert!(entry.add_tag(Tag::Save));
        assert!(!entry.add_tag(Tag::Save));
        assert!(entry.add_tag(Tag::Config));
        assert_eq!(entry.when.len(), 1);
        assert_eq!(entry.tags, vec![Tag::Save, Tag::Config]);
    }

    #[test]
    fn game_record_serializes_sparsely() {
        let mut record = GameRecord::default();
        record.upsert_entry(PathType::FileSystem, "<base>/save.dat", |_| {});
        let rendered = serde_yaml::to_string(&record).expect("serialize");
        assert!(rendered.contains("save.dat"));
        assert!(rendered.contains("{}"));
        assert!(!rendered.contains("registry"));
        assert!(!rendered.contains("steam"));
        assert!(!rendered.contains("when"));
    }

    #[test]
    fn constraint_serializes_only_known_axes() {
        let rendered = serde_json::to_string(&Constraint::store(Store::Gog)).expect("serialize");
        assert_eq!(rendered, r#"{"store":"gog"}"#);
        let both = Constraint {
            os: Some(Os::Windows),
            store: Some(Store::Microsoft),
        };
        assert_eq!(
            serde_json::to_string(&both).expect("serialize"),
            r#"{"os":"windows","store":"microsoft"}"#
        );
    }
}
