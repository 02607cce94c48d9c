use std::sync::LazyLock;

use regex::Regex;

use crate::model::{Constraint, Os, Store};

/// One `{{P|token}}` placeholder the wiki uses inside save/config paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderDefinition {
    pub token: &'static str,
    pub normalized: &'static str,
    pub applicability: Option<Constraint>,
    pub registry_root: bool,
    pub unsupported: bool,
}

impl PlaceholderDefinition {
    pub const fn new(token: &'static str, normalized: &'static str) -> Self {
        Self {
            token,
            normalized,
            applicability: None,
            registry_root: false,
            unsupported: false,
        }
    }

    const fn when(mut self, constraint: Constraint) -> Self {
        self.applicability = Some(constraint);
        self
    }

    const fn registry(mut self) -> Self {
        self.registry_root = true;
        self
    }

    const fn unsupported(mut self) -> Self {
        self.unsupported = true;
        self
    }

    pub fn os(&self) -> Option<Os> {
        self.applicability.and_then(|constraint| constraint.os)
    }

    pub fn store(&self) -> Option<Store> {
        self.applicability.and_then(|constraint| constraint.store)
    }
}

const WINDOWS: Constraint = Constraint::os(Os::Windows);

/// Resolution order matters only for termination; distinct tokens never overlap.
pub const PATH_ARGUMENTS: &[PlaceholderDefinition] = &[
    PlaceholderDefinition::new("game", "<base>"),
    PlaceholderDefinition::new("uid", "<storeUserId>"),
    PlaceholderDefinition::new("steam", "<root>").when(Constraint::store(Store::Steam)),
    PlaceholderDefinition::new("uplay", "<root>").when(Constraint::store(Store::Uplay)),
    PlaceholderDefinition::new("ubisoftconnect", "<root>").when(Constraint::store(Store::Uplay)),
    PlaceholderDefinition::new("hkcu", "HKEY_CURRENT_USER")
        .when(WINDOWS)
        .registry(),
    PlaceholderDefinition::new("hklm", "HKEY_LOCAL_MACHINE")
        .when(WINDOWS)
        .registry(),
    // 64-bit registry view; the manifest has no way to express it.
    PlaceholderDefinition::new("wow64", "<regWow64>")
        .when(WINDOWS)
        .registry()
        .unsupported(),
    PlaceholderDefinition::new("username", "<osUserName>").when(WINDOWS),
    PlaceholderDefinition::new("userprofile", "<home>").when(WINDOWS),
    PlaceholderDefinition::new("userprofile\\documents", "<winDocuments>").when(WINDOWS),
    PlaceholderDefinition::new("userprofile\\appdata\\locallow", "<home>/AppData/LocalLow")
        .when(WINDOWS),
    PlaceholderDefinition::new("appdata", "<winAppData>").when(WINDOWS),
    PlaceholderDefinition::new("localappdata", "<winLocalAppData>").when(WINDOWS),
    PlaceholderDefinition::new("public", "<winPublic>").when(WINDOWS),
    PlaceholderDefinition::new("allusersprofile", "<winProgramData>").when(WINDOWS),
    PlaceholderDefinition::new("programdata", "<winProgramData>").when(WINDOWS),
    PlaceholderDefinition::new("windir", "<winDir>").when(WINDOWS),
    PlaceholderDefinition::new("syswow64", "<winDir>/SysWOW64").when(WINDOWS),
    PlaceholderDefinition::new("osxhome", "<home>").when(Constraint::os(Os::Mac)),
    PlaceholderDefinition::new("linuxhome", "<home>").when(Constraint::os(Os::Linux)),
    PlaceholderDefinition::new("xdgdatahome", "<xdgData>").when(Constraint::os(Os::Linux)),
    PlaceholderDefinition::new("xdgconfighome", "<xdgConfig>").when(Constraint::os(Os::Linux)),
];

/// A table entry paired with the compiled matcher for its marker.
#[derive(Debug)]
pub struct PathArgument {
    pub definition: &'static PlaceholderDefinition,
    pattern: Regex,
}

impl PathArgument {
    pub fn new(definition: &'static PlaceholderDefinition) -> Self {
        Self {
            definition,
            pattern: marker_pattern(definition.token),
        }
    }

    pub fn is_present_in(&self, raw_path: &str) -> bool {
        self.pattern.is_match(raw_path)
    }

    pub fn replace_all(&self, raw_path: &str) -> String {
        self.pattern
            .replace_all(raw_path, regex::NoExpand(self.definition.normalized))
            .into_owned()
    }
}

static PATH_ARGUMENT_TABLE: LazyLock<Vec<PathArgument>> = LazyLock::new(|| {
    PATH_ARGUMENTS.iter().map(PathArgument::new).collect()
});

/// Matches `{{P|token}}` and `{{Path|token}}`, case-insensitively, on the whole token.
fn marker_pattern(token: &str) -> Regex {
    Regex::new(&format!(r"(?i)\{{\{{P(?:ath)?\|{}\}}\}}", regex::escape(token)))
        .expect("escaped placeholder token is a valid pattern")
}

pub fn path_arguments() -> &'static [PathArgument] {
    &PATH_ARGUMENT_TABLE
}

pub fn lookup(token: &str) -> Option<&'static PlaceholderDefinition> {
    let token = token.trim();
    PATH_ARGUMENTS
        .iter()
        .find(|definition| definition.token.eq_ignore_ascii_case(token))
}

static ANY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\{\{P(?:ath)?\|([^{}|]*)\}\}").expect("marker pattern is valid")
});

/// Marker tokens in `raw_path` that the table does not define, in order of
/// first appearance, compared case-insensitively.
pub fn unknown_tokens(raw_path: &str) -> Vec<String> {
    let mut unknown: Vec<String> = Vec::new();
    for captures in ANY_MARKER.captures_iter(raw_path) {
        let token = captures[1].trim();
        if lookup(token).is_none() && !unknown.iter().any(|seen| seen.eq_ignore_ascii_case(token)) {
            unknown.push(token.to_string());
        }
    }
    unknown
}

/// Table entries whose marker occurs in `raw_path`, in table order.
pub fn tokens_in(raw_path: &str) -> impl Iterator<Item = &'static PlaceholderDefinition> + '_ {
    path_arguments()
        .iter()
        .filter(move |argument| argument.is_present_in(raw_path))
        .map(|argument| argument.definition)
}
