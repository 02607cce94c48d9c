use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

pub const STATE_DIR_NAME: &str = ".savewiki";
pub const CACHE_FILENAME: &str = "wiki-game-cache.yaml";
pub const MANIFEST_FILENAME: &str = "manifest.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub data_dir: PathBuf,
    pub cache_path: PathBuf,
    pub manifest_path: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nstate_dir={}\ncache_path={}\nmanifest_path={}\nconfig_path={} ({})",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.cache_path),
            normalize_for_display(&self.manifest_path),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
        )
    }
}

pub fn resolve_paths(overrides: &PathOverrides) -> Result<ResolvedPaths> {
    let cwd = env::current_dir().context("failed to read current directory")?;
    resolve_paths_with_lookup(&cwd, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    cwd: &Path,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = if let Some(path) = overrides.project_root.as_deref() {
        (absolutize(path, cwd), ValueSource::Flag)
    } else if let Some(value) = lookup_env("SAVEWIKI_PROJECT_ROOT").filter(|v| !v.trim().is_empty())
    {
        (absolutize(Path::new(value.trim()), cwd), ValueSource::Env)
    } else {
        (cwd.to_path_buf(), ValueSource::Default)
    };
    if project_root.is_file() {
        bail!(
            "project root is a file, not a directory: {}",
            normalize_for_display(&project_root)
        );
    }

    let state_dir = project_root.join(STATE_DIR_NAME);
    let data_dir = project_root.join("data");

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &project_root), ValueSource::Flag)
    } else if let Some(value) = lookup_env("SAVEWIKI_CONFIG").filter(|v| !v.trim().is_empty()) {
        (
            absolutize(Path::new(value.trim()), &project_root),
            ValueSource::Env,
        )
    } else {
        (state_dir.join("config.toml"), ValueSource::Default)
    };

    Ok(ResolvedPaths {
        cache_path: data_dir.join(CACHE_FILENAME),
        manifest_path: data_dir.join(MANIFEST_FILENAME),
        project_root,
        state_dir,
        data_dir,
        config_path,
        root_source,
        config_source,
    })
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
