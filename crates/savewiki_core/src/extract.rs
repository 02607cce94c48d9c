use serde::Serialize;
use tracing::debug;

use crate::constraint::constraint_from_system;
use crate::error::{ExtractError, FailureKind};
use crate::model::{Constraint, GameRecord, PathType, SteamInfo, Tag};
use crate::resolve::{BroadPathDenylist, is_too_broad, resolve_path};
use crate::template::TemplateNode;

pub const INFOBOX_TEMPLATE: &str = "Infobox game";
pub const SAVES_TEMPLATE: &str = "Game data/saves";
pub const CONFIG_TEMPLATE: &str = "Game data/config";

const STEAM_APPID_PARAMETER: &str = "steam appid";

/// Per-page counts of template paths skipped by failure category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tallies {
    pub unsupported_os: u32,
    pub unsupported_path: u32,
    pub too_broad: u32,
}

impl Tallies {
    fn record_failure(&mut self, kind: FailureKind) {
        match kind {
            FailureKind::UnsupportedOs => self.unsupported_os += 1,
            FailureKind::UnsupportedPath => self.unsupported_path += 1,
            FailureKind::Other => {}
        }
    }

    pub fn is_clean(&self) -> bool {
        self.unsupported_os == 0 && self.unsupported_path == 0 && self.too_broad == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub record: GameRecord,
    pub tallies: Tallies,
}

enum PathOutcome {
    Accepted {
        path: String,
        path_type: PathType,
        constraint: Constraint,
    },
    TooBroad(String),
}

#[derive(Debug, Clone, Default)]
pub struct GameExtractor {
    denylist: BroadPathDenylist,
}

impl GameExtractor {
    pub fn new(denylist: BroadPathDenylist) -> Self {
        Self { denylist }
    }

    /// Folds every relevant template on one page into a single game record.
    /// Bad nodes are tallied and skipped; they never abort the page.
    pub fn extract(&self, title: &str, nodes: &[TemplateNode]) -> Extraction {
        let mut extraction = Extraction::default();

        for node in nodes {
            if node.is_named(INFOBOX_TEMPLATE) {
                if let Some(steam) = parse_steam_id(node) {
                    extraction.record.steam = Some(steam);
                }
                continue;
            }

            let tag = if node.is_named(SAVES_TEMPLATE) {
                Tag::Save
            } else if node.is_named(CONFIG_TEMPLATE) {
                Tag::Config
            } else {
                continue;
            };
            self.apply_data_node(title, node, tag, &mut extraction);
        }

        extraction
    }

    fn apply_data_node(
        &self,
        title: &str,
        node: &TemplateNode,
        tag: Tag,
        extraction: &mut Extraction,
    ) {
        let Some((system, raw_paths)) = node.positional.split_first() else {
            return;
        };
        // The data templates accept several paths after the System column.
        for raw_path in raw_paths {
            let raw_path = raw_path.trim();
            if raw_path.is_empty() {
                continue;
            }

            match self.resolve_node_path(system, raw_path) {
                Ok(PathOutcome::Accepted {
                    path,
                    path_type,
                    constraint,
                }) => {
                    extraction
                        .record
                        .upsert_entry(path_type, &path, |entry| {
                            entry.add_constraint(constraint);
                            entry.add_tag(tag);
                        });
                }
                Ok(PathOutcome::TooBroad(path)) => {
                    debug!(page = title, path = %path, "skipping too-broad path");
                    extraction.tallies.too_broad += 1;
                }
                Err(error) => {
                    debug!(
                        page = title,
                        template = %node.name,
                        raw_path,
                        error = %error,
                        "skipping template path"
                    );
                    extraction.tallies.record_failure(error.kind());
                }
            }
        }
    }

    fn resolve_node_path(
        &self,
        system: &str,
        raw_path: &str,
    ) -> Result<PathOutcome, ExtractError> {
        let (path, path_type) = resolve_path(raw_path)?;
        if is_too_broad(&path, &self.denylist) {
            return Ok(PathOutcome::TooBroad(path));
        }

        let inferred = constraint_from_system(system, raw_path)?;
        let constraint = match path_type {
            PathType::FileSystem => inferred,
            // The registry only exists on Windows, so only the store axis says anything.
            PathType::Registry => Constraint {
                os: None,
                store: inferred.store,
            },
        };

        Ok(PathOutcome::Accepted {
            path,
            path_type,
            constraint,
        })
    }
}

/// Extracts with the built-in broad-path denylist.
pub fn extract_game(title: &str, nodes: &[TemplateNode]) -> Extraction {
    GameExtractor::default().extract(title, nodes)
}

fn parse_steam_id(node: &TemplateNode) -> Option<SteamInfo> {
    let raw = node.named(STEAM_APPID_PARAMETER)?;
    let first = raw.split(',').next()?.trim();
    match first.parse::<u32>() {
        Ok(id) if id > 0 => Some(SteamInfo { id }),
        _ => None,
    }
}
