use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::extract::Tallies;
use crate::wiki::CategoryMember;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCacheEntry {
    pub page_id: u64,
    /// `None` until the page content has been processed once.
    #[serde(default)]
    pub rev_id: Option<u64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unsupported_os: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unsupported_path: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub too_broad: bool,
}

impl PageCacheEntry {
    pub fn is_pending(&self) -> bool {
        self.rev_id.is_none()
    }

    pub fn is_flagged(&self) -> bool {
        self.unsupported_os || self.unsupported_path || self.too_broad
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Per-page bookkeeping keyed by wiki page title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WikiGameCache {
    entries: BTreeMap<String, PageCacheEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub pages: usize,
    pub pending: usize,
    pub unsupported_os: usize,
    pub unsupported_path: usize,
    pub too_broad: usize,
}

impl WikiGameCache {
    /// Load the cache from YAML. Returns an empty cache if the file doesn't exist.
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
        let rendered = serde_yaml::to_string(self).context("failed to serialize wiki game cache")?;
        fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Inserts a placeholder for every listed page not already tracked.
    /// Returns the number of pages added.
    pub fn mark_new_pages(&mut self, pages: &[CategoryMember]) -> usize {
        let mut added = 0usize;
        for page in pages {
            if self.entries.contains_key(&page.title) {
                continue;
            }
            self.entries.insert(
                page.title.clone(),
                PageCacheEntry {
                    page_id: page.page_id,
                    rev_id: None,
                    ..PageCacheEntry::default()
                },
            );
            added += 1;
        }
        added
    }

    pub fn update_after_extraction(&mut self, title: &str, tallies: &Tallies, rev_id: Option<u64>) {
        let entry = self.entries.entry(title.to_string()).or_default();
        entry.unsupported_os = tallies.unsupported_os > 0;
        entry.unsupported_path = tallies.unsupported_path > 0;
        entry.too_broad = tallies.too_broad > 0;
        entry.rev_id = Some(rev_id.unwrap_or(0));
    }

    pub fn get(&self, title: &str) -> Option<&PageCacheEntry> {
        self.entries.get(title)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.entries.contains_key(title)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn titles(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn pending_titles(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_pending())
            .map(|(title, _)| title.clone())
            .collect()
    }

    pub fn flagged_titles(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_flagged())
            .map(|(title, _)| title.clone())
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            pages: self.entries.len(),
            ..CacheStats::default()
        };
        for entry in self.entries.values() {
            if entry.is_pending() {
                stats.pending += 1;
            }
            if entry.unsupported_os {
                stats.unsupported_os += 1;
            }
            if entry.unsupported_path {
                stats.unsupported_path += 1;
            }
            if entry.too_broad {
                stats.too_broad += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn member(page_id: u64, title: &str) -> CategoryMember {
        CategoryMember {
            page_id,
            title: title.to_string(),
        }
    }

    #[test]
    fn mark_new_pages_only_adds_unseen_titles() {
        let mut cache = WikiGameCache::default();
        assert_eq!(cache.mark_new_pages(&[member(1, "Alpha"), member(2, "Beta")]), 2);
        cache.update_after_extraction("Alpha", &Tallies::default(), Some(50));

        assert_eq!(cache.mark_new_pages(&[member(1, "Alpha"), member(3, "Gamma")]), 1);
        assert_eq!(cache.get("Alpha").and_then(|entry| entry.rev_id), Some(50));
        assert_eq!(
            cache.get("Gamma"),
            Some(&PageCacheEntry {
                page_id: 3,
                rev_id: None,
                ..PageCacheEntry::default()
            })
        );
        assert_eq!(cache.pending_titles(), vec!["Beta".to_string(), "Gamma".to_string()]);
    }

    #[test]
    fn update_sets_and_clears_flags() {
        let mut cache = WikiGameCache::default();
        cache.mark_new_pages(&[member(7, "Alpha")]);
        cache.update_after_extraction(
            "Alpha",
            &Tallies {
                unsupported_os: 2,
                unsupported_path: 0,
                too_broad: 1,
            },
            Some(10),
        );
        let entry = cache.get("Alpha").expect("entry");
        assert!(entry.unsupported_os);
        assert!(!entry.unsupported_path);
        assert!(entry.too_broad);
        assert_eq!(cache.flagged_titles(), vec!["Alpha".to_string()]);

        cache.update_after_extraction("Alpha", &Tallies::default(), None);
        let entry = cache.get("Alpha").expect("entry");
        assert!(!entry.is_flagged());
        assert_eq!(entry.rev_id, Some(0));
        assert_eq!(entry.page_id, 7);
        assert!(cache.flagged_titles().is_empty());
    }

    #[test]
    fn serializes_camel_case_with_explicit_null_revision() {
        let mut cache = WikiGameCache::default();
        cache.mark_new_pages(&[member(5, "Alpha")]);
        let rendered = serde_yaml::to_string(&cache).expect("serialize");
        assert!(rendered.contains("pageId: 5"));
        assert!(rendered.contains("revId: null"));
        assert!(!rendered.contains("tooBroad"));
    }

    #[test]
    fn save_and_load_preserve_entries() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("data").join("wiki-game-cache.yaml");
        let mut cache = WikiGameCache::default();
        cache.mark_new_pages(&[member(1, "Alpha"), member(2, "Beta")]);
        cache.update_after_extraction(
            "Beta",
            &Tallies {
                unsupported_os: 0,
                unsupported_path: 1,
                too_broad: 0,
            },
            Some(99),
        );
        cache.save(&path).expect("save");

        let loaded = WikiGameCache::load(&path).expect("load");
        assert_eq!(loaded, cache);
        let stats = loaded.stats();
        assert_eq!(stats.pages, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.unsupported_path, 1);
    }

    #[test]
    fn load_returns_empty_cache_for_missing_file() {
        let cache = WikiGameCache::load(Path::new("/nonexistent/cache.yaml")).expect("load");
        assert!(cache.is_empty());
    }

    #[test]
    fn load_returns_error_for_invalid_yaml() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("cache.yaml");
        fs::write(&path, "Alpha: [not, an, entry").expect("write");
        let error = WikiGameCache::load(&path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }
}
