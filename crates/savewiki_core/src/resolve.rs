use crate::error::ExtractError;
use crate::model::PathType;
use crate::path_args::{PATH_ARGUMENTS, PathArgument, path_arguments};

pub const MAX_REWRITE_PASSES: usize = 100;

/// Resolved paths that exist whether or not a game is installed. The wiki
/// should narrow these down; until it does they cannot identify a game.
const DEFAULT_BROAD_PATHS: &[&str] = &[
    "<home>/Documents",
    "<home>/Saved Games",
    "<home>/AppData",
    "<home>/AppData/Local",
    "<home>/AppData/Local/Temp",
    "<home>/AppData/LocalLow",
    "<home>/AppData/Roaming",
    "<home>/Documents/My Games",
    "<home>/Library",
    "<home>/Library/Application Support",
    "<home>/Library/Preferences",
    "<home>/Telltale Games",
    "<root>/config",
    "<winAppData>/Microsoft/Windows/Start Menu/Programs",
    "<winDir>/win.ini",
    "<winDocuments>/My Games",
    "<winLocalAppData>/Microsoft/Windows/Start Menu/Programs",
    "<winProgramData>/Microsoft/Windows/Start Menu/Programs",
    "<xdgConfig>/autostart",
    "HKEY_CURRENT_USER/Software",
    "HKEY_LOCAL_MACHINE/Software",
    "HKEY_LOCAL_MACHINE/SOFTWARE/WOW6432Node",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadPathDenylist {
    paths: Vec<String>,
}

impl Default for BroadPathDenylist {
    fn default() -> Self {
        Self {
            paths: DEFAULT_BROAD_PATHS
                .iter()
                .map(|path| (*path).to_string())
                .collect(),
        }
    }
}

impl BroadPathDenylist {
    pub fn with_extra<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in extra {
            let normalized = normalize_separators(path.as_ref().trim());
            if !normalized.is_empty() && !self.contains(&normalized) {
                self.paths.push(normalized);
            }
        }
        self
    }

    pub fn contains(&self, resolved: &str) -> bool {
        self.paths
            .iter()
            .any(|path| path.eq_ignore_ascii_case(resolved))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Rewrites every known placeholder in `raw` and classifies the result.
pub fn resolve_path(raw: &str) -> Result<(String, PathType), ExtractError> {
    resolve_with(path_arguments(), raw)
}

/// Resolves against an explicit argument table, in the table's order.
pub fn resolve_with(
    arguments: &[PathArgument],
    raw: &str,
) -> Result<(String, PathType), ExtractError> {
    if raw.matches("{{").count() != raw.matches("}}").count() {
        return Err(ExtractError::Malformed(format!(
            "unbalanced template braces in: {raw}"
        )));
    }
    let path_type = path_type_with(arguments, raw);
    let mut path = raw.to_string();

    for argument in arguments {
        if !argument.is_present_in(&path) {
            continue;
        }
        if argument.definition.unsupported {
            return Err(ExtractError::UnsupportedPath(format!(
                "unsupported path argument: {}",
                argument.definition.token
            )));
        }

        let mut passes = 0usize;
        while argument.is_present_in(&path) {
            if passes >= MAX_REWRITE_PASSES {
                return Err(ExtractError::UnsupportedPath(format!(
                    "unable to resolve path arguments in: {path}"
                )));
            }
            path = argument.replace_all(&path);
            passes += 1;
        }
    }

    Ok((normalize_separators(&path), path_type))
}

/// Registry iff a registry-root marker appears in the raw, unresolved text.
pub fn path_type(raw: &str) -> PathType {
    path_type_with(path_arguments(), raw)
}

fn path_type_with(arguments: &[PathArgument], raw: &str) -> PathType {
    let is_registry = arguments
        .iter()
        .any(|argument| argument.definition.registry_root && argument.is_present_in(raw));
    if is_registry {
        PathType::Registry
    } else {
        PathType::FileSystem
    }
}

pub fn is_too_broad(resolved: &str, denylist: &BroadPathDenylist) -> bool {
    if PATH_ARGUMENTS
        .iter()
        .any(|definition| definition.normalized == resolved)
    {
        return true;
    }
    if denylist.contains(resolved) {
        return true;
    }
    if resolved == "/" || resolved.starts_with('*') {
        return true;
    }
    is_bare_drive(resolved)
}

fn is_bare_drive(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn normalize_separators(path: &str) -> String {
    let mut output = String::with_capacity(path.len());
    let mut previous_was_separator = false;
    for ch in path.chars() {
        let ch = if ch == '\\' { '/' } else { ch };
        if ch == '/' {
            if previous_was_separator {
                continue;
            }
            previous_was_separator = true;
        } else {
            previous_was_separator = false;
        }
        output.push(ch);
    }

    if output.len() > 1 && output.ends_with('/') {
        output.pop();
    }

    if output == "~" {
        return "<home>".to_string();
    }
    if let Some(rest) = output.strip_prefix("~/") {
        return format!("<home>/{rest}");
    }
    output
}
