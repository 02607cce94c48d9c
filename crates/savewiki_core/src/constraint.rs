use crate::error::ExtractError;
use crate::model::{Constraint, Os, Store};
use crate::path_args::tokens_in;

/// Storefront names recognized in the System column, checked in order.
const SYSTEM_STORES: &[(&str, Store)] = &[
    ("steam", Store::Steam),
    ("microsoft store", Store::Microsoft),
    ("gog.com", Store::Gog),
    ("epic games", Store::Epic),
    ("uplay", Store::Uplay),
];

pub fn parse_os(text: &str) -> Result<Os, ExtractError> {
    match text.trim() {
        "Windows" => Ok(Os::Windows),
        "OS X" => Ok(Os::Mac),
        "Linux" => Ok(Os::Linux),
        "DOS" => Ok(Os::Dos),
        other => Err(ExtractError::UnsupportedOs(other.to_string())),
    }
}

/// Derives a constraint from the System column text, falling back to
/// storefront markers in the raw path when the column names no store.
pub fn constraint_from_system(system: &str, raw_path: &str) -> Result<Constraint, ExtractError> {
    let mut constraint = Constraint::default();

    let lowered = system.to_ascii_lowercase();
    match SYSTEM_STORES
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
    {
        Some((_, store)) => {
            constraint.store = Some(*store);
            if *store == Store::Microsoft {
                constraint.os = Some(Os::Windows);
            }
        }
        None => constraint.os = Some(parse_os(system)?),
    }

    if constraint.store.is_none() {
        constraint.store = store_from_path(raw_path);
    }
    Ok(constraint)
}

pub fn constraint_from_path(raw_path: &str) -> Constraint {
    Constraint {
        os: os_from_path(raw_path),
        store: store_from_path(raw_path),
    }
}

pub fn os_from_path(raw_path: &str) -> Option<Os> {
    tokens_in(raw_path).find_map(|definition| definition.os())
}

pub fn store_from_path(raw_path: &str) -> Option<Store> {
    tokens_in(raw_path).find_map(|definition| definition.store())
}
