use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::resolve::BroadPathDenylist;

pub const DEFAULT_USER_AGENT: &str = "savewiki/0.1";
pub const DEFAULT_API_URL: &str = "https://www.pcgamingwiki.com/w/api.php";
pub const DEFAULT_CATEGORY: &str = "Games";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SavewikiConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub manifest: ManifestSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ManifestSection {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub extra_broad_paths: Vec<String>,
}

impl SavewikiConfig {
    /// Resolve the wiki API URL: env WIKI_API_URL > config > DEFAULT_API_URL.
    pub fn api_url(&self) -> String {
        if let Some(value) = env_override("WIKI_API_URL") {
            return value;
        }
        self.wiki
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        if let Some(value) = env_override("WIKI_USER_AGENT") {
            return value;
        }
        self.wiki
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn categories(&self) -> Vec<String> {
        let categories = self
            .manifest
            .categories
            .iter()
            .map(|category| category.trim().to_string())
            .filter(|category| !category.is_empty())
            .collect::<Vec<_>>();
        if categories.is_empty() {
            vec![DEFAULT_CATEGORY.to_string()]
        } else {
            categories
        }
    }

    pub fn broad_path_denylist(&self) -> BroadPathDenylist {
        BroadPathDenylist::default().with_extra(&self.manifest.extra_broad_paths)
    }
}

fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Load and parse a SavewikiConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SavewikiConfig> {
    if !config_path.exists() {
        return Ok(SavewikiConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SavewikiConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}
