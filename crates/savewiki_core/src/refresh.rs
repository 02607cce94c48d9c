use std::collections::BTreeSet;

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::WikiGameCache;
use crate::extract::{GameExtractor, Tallies};
use crate::manifest::Manifest;
use crate::wiki::{CategoryMember, WikiReadApi};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshMode {
    /// Pages discovered but never processed.
    Pending,
    All,
    /// Pages whose last extraction skipped something.
    Flagged,
    Titles(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct RefreshOptions {
    pub mode: RefreshMode,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoverReport {
    pub categories: Vec<String>,
    pub listed: usize,
    pub added: usize,
    pub request_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageRefreshResult {
    pub title: String,
    pub action: String,
    pub detail: Option<String>,
    pub tallies: Option<Tallies>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub success: bool,
    pub requested_pages: usize,
    pub processed: usize,
    pub missing: usize,
    pub flagged: usize,
    pub errors: Vec<String>,
    pub pages: Vec<PageRefreshResult>,
    pub request_count: usize,
}

/// Lists every category and records pages the cache has not seen yet.
pub fn discover_pages<A: WikiReadApi>(
    api: &mut A,
    cache: &mut WikiGameCache,
    categories: &[String],
) -> Result<DiscoverReport> {
    if categories.is_empty() {
        bail!("discover requires at least one category");
    }

    let mut listed = Vec::new();
    for category in categories {
        let members = api.get_category_members(category)?;
        info!(category = %category, members = members.len(), "listed category");
        listed.extend(members);
    }

    let added = cache.mark_new_pages(&listed);
    Ok(DiscoverReport {
        categories: categories.to_vec(),
        listed: listed.len(),
        added,
        request_count: api.request_count(),
    })
}

/// Re-extracts the selected pages one at a time. A page's cache entry and
/// manifest record change only after its extraction completes.
pub fn refresh_games<A: WikiReadApi>(
    api: &mut A,
    extractor: &GameExtractor,
    cache: &mut WikiGameCache,
    manifest: &mut Manifest,
    options: &RefreshOptions,
) -> Result<RefreshReport> {
    let mut titles = select_titles(cache, &options.mode)?;
    if let Some(limit) = options.limit {
        titles.truncate(limit);
    }

    let mut report = RefreshReport {
        success: true,
        requested_pages: titles.len(),
        processed: 0,
        missing: 0,
        flagged: 0,
        errors: Vec::new(),
        pages: Vec::new(),
        request_count: 0,
    };

    for title in titles {
        let page = match api.get_page(&title) {
            Ok(Some(page)) => page,
            Ok(None) => {
                warn!(page = %title, "page no longer exists on the wiki");
                report.missing += 1;
                report.pages.push(PageRefreshResult {
                    title,
                    action: "missing".to_string(),
                    detail: Some("page not found".to_string()),
                    tallies: None,
                });
                continue;
            }
            Err(error) => {
                warn!(page = %title, error = %error, "failed to fetch page");
                report.errors.push(format!("{title}: {error:#}"));
                report.pages.push(PageRefreshResult {
                    title,
                    action: "error".to_string(),
                    detail: Some("fetch failed".to_string()),
                    tallies: None,
                });
                continue;
            }
        };

        // Results are keyed by the title the wiki reports, not the one requested.
        let title = if page.title.trim().is_empty() {
            title
        } else {
            page.title.clone()
        };
        let extraction = extractor.extract(&title, &page.templates());
        if !cache.contains(&title) {
            cache.mark_new_pages(&[CategoryMember {
                page_id: page.page_id,
                title: title.clone(),
            }]);
        }
        let outcome = manifest.merge_game(&title, extraction.record);
        cache.update_after_extraction(&title, &extraction.tallies, page.revision_id);

        info!(
            page = %title,
            revision = page.revision_id.unwrap_or(0),
            outcome = outcome.as_str(),
            "processed page"
        );
        report.processed += 1;
        if !extraction.tallies.is_clean() {
            report.flagged += 1;
        }
        report.pages.push(PageRefreshResult {
            title,
            action: outcome.as_str().to_string(),
            detail: None,
            tallies: Some(extraction.tallies),
        });
    }

    report.request_count = api.request_count();
    report.success = report.errors.is_empty();
    Ok(report)
}

fn select_titles(cache: &WikiGameCache, mode: &RefreshMode) -> Result<Vec<String>> {
    let titles = match mode {
        RefreshMode::Pending => cache.pending_titles(),
        RefreshMode::All => cache.titles(),
        RefreshMode::Flagged => cache.flagged_titles(),
        RefreshMode::Titles(requested) => {
            let mut seen = BTreeSet::new();
            let mut titles = Vec::new();
            for title in requested {
                let title = title.replace('_', " ").trim().to_string();
                if title.is_empty() {
                    continue;
                }
                if seen.insert(title.clone()) {
                    titles.push(title);
                }
            }
            if titles.is_empty() {
                bail!("refresh requires at least one non-empty title");
            }
            titles
        }
    };
    Ok(titles)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{Constraint, Store, Tag};
    use crate::wiki::WikiPage;

    #[derive(Default)]
    struct MockApi {
        category_members: BTreeMap<String, Vec<CategoryMember>>,
        pages: BTreeMap<String, WikiPage>,
        failing_titles: Vec<String>,
        fetched: Vec<String>,
        request_count: usize,
    }

    impl WikiReadApi for MockApi {
        fn get_category_members(&mut self, category: &str) -> anyhow::Result<Vec<CategoryMember>> {
            self.request_count += 1;
            Ok(self
                .category_members
                .get(category)
                .cloned()
                .unwrap_or_default())
        }

        fn get_page(&mut self, title: &str) -> anyhow::Result<Option<WikiPage>> {
            self.request_count += 1;
            self.fetched.push(title.to_string());
            if self.failing_titles.iter().any(|failing| failing == title) {
                anyhow::bail!("connection reset");
            }
            Ok(self.pages.get(title).cloned())
        }

        fn request_count(&self) -> usize {
            self.request_count
        }
    }

    fn member(page_id: u64, title: &str) -> CategoryMember {
        CategoryMember {
            page_id,
            title: title.to_string(),
        }
    }

    fn page(page_id: u64, title: &str, revision_id: u64, content: &str) -> WikiPage {
        WikiPage {
            title: title.to_string(),
            page_id,
            revision_id: Some(revision_id),
            content: content.to_string(),
        }
    }

    fn options(mode: RefreshMode) -> RefreshOptions {
        RefreshOptions { mode, limit: None }
    }

    #[test]
    fn discover_marks_unseen_pages_across_categories() {
        let mut api = MockApi::default();
        api.category_members.insert(
            "Games".to_string(),
            vec![member(1, "Alpha"), member(2, "Beta")],
        );
        api.category_members
            .insert("Demos".to_string(), vec![member(2, "Beta"), member(3, "Gamma")]);
        let mut cache = WikiGameCache::default();

        let report = discover_pages(
            &mut api,
            &mut cache,
            &["Games".to_string(), "Demos".to_string()],
        )
        .expect("discover");
        assert_eq!(report.listed, 4);
        assert_eq!(report.added, 3);
        assert_eq!(report.request_count, 2);
        assert_eq!(cache.pending_titles().len(), 3);
    }

    #[test]
    fn refresh_processes_pending_page_end_to_end() {
        let mut api = MockApi::default();
        api.category_members
            .insert("Games".to_string(), vec![member(1, "Alpha")]);
        api.pages.insert(
            "Alpha".to_string(),
            page(
                1,
                "Alpha",
                321,
                "{{Game data/saves|Steam|{{P|game}}/save.dat}}",
            ),
        );
        let mut cache = WikiGameCache::default();
        let mut manifest = Manifest::default();
        discover_pages(&mut api, &mut cache, &["Games".to_string()]).expect("discover");

        let report = refresh_games(
            &mut api,
            &GameExtractor::default(),
            &mut cache,
            &mut manifest,
            &options(RefreshMode::Pending),
        )
        .expect("refresh");

        assert!(report.success);
        assert_eq!(report.processed, 1);
        assert_eq!(report.flagged, 0);
        let record = manifest.get("Alpha").expect("record");
        let entry = record.files.get("<base>/save.dat").expect("entry");
        assert_eq!(entry.when, vec![Constraint::store(Store::Steam)]);
        assert_eq!(entry.tags, vec![Tag::Save]);

        let cached = cache.get("Alpha").expect("cache entry");
        assert_eq!(cached.rev_id, Some(321));
        assert!(!cached.is_flagged());
        assert!(cache.pending_titles().is_empty());
    }

    #[test]
    fn refresh_sets_flags_for_unusable_page() {
        let mut api = MockApi::default();
        api.pages.insert(
            "Broad".to_string(),
            page(
                4,
                "Broad",
                10,
                "{{Game data/saves|Windows|{{P|userprofile}}\\Documents}}\n\
                 {{Game data/config|BeOS|{{P|game}}/cfg}}\n\
                 {{Game data/config|Windows|{{P|hklm}}\\{{P|wow64}}\\Game}}",
            ),
        );
        let mut cache = WikiGameCache::default();
        cache.mark_new_pages(&[member(4, "Broad")]);
        let mut manifest = Manifest::default();

        let report = refresh_games(
            &mut api,
            &GameExtractor::default(),
            &mut cache,
            &mut manifest,
            &options(RefreshMode::All),
        )
        .expect("refresh");

        assert_eq!(report.flagged, 1);
        let record = manifest.get("Broad").expect("record");
        assert!(record.files.is_empty());
        assert!(record.registry.is_empty());
        let cached = cache.get("Broad").expect("cache entry");
        assert!(cached.unsupported_os);
        assert!(cached.unsupported_path);
        assert!(cached.too_broad);
        assert_eq!(cache.flagged_titles(), vec!["Broad".to_string()]);
    }

    #[test]
    fn fetch_failure_leaves_cache_entry_untouched() {
        let mut api = MockApi {
            failing_titles: vec!["Alpha".to_string()],
            ..Default::default()
        };
        api.pages.insert(
            "Beta".to_string(),
            page(2, "Beta", 5, "{{Game data/saves|Linux|~/.beta}}"),
        );
        let mut cache = WikiGameCache::default();
        cache.mark_new_pages(&[member(1, "Alpha"), member(2, "Beta")]);
        let before = cache.get("Alpha").cloned();
        let mut manifest = Manifest::default();

        let report = refresh_games(
            &mut api,
            &GameExtractor::default(),
            &mut cache,
            &mut manifest,
            &options(RefreshMode::Pending),
        )
        .expect("refresh");

        assert!(!report.success);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.processed, 1);
        assert_eq!(cache.get("Alpha").cloned(), before);
        assert!(manifest.get("Alpha").is_none());
        assert!(
            manifest
                .get("Beta")
                .expect("beta")
                .files
                .contains_key("<home>/.beta")
        );
    }

    #[test]
    fn missing_page_is_reported_and_not_cached() {
        let mut api = MockApi::default();
        let mut cache = WikiGameCache::default();
        cache.mark_new_pages(&[member(9, "Gone")]);
        let mut manifest = Manifest::default();

        let report = refresh_games(
            &mut api,
            &GameExtractor::default(),
            &mut cache,
            &mut manifest,
            &options(RefreshMode::Pending),
        )
        .expect("refresh");
        assert!(report.success);
        assert_eq!(report.missing, 1);
        assert!(cache.get("Gone").expect("entry").is_pending());
    }

    #[test]
    fn explicit_titles_are_deduplicated_and_registered() {
        let mut api = MockApi::default();
        api.pages.insert(
            "New Game".to_string(),
            page(77, "New Game", 3, "{{Game data/saves|DOS|{{P|game}}\\SAVE}}"),
        );
        let mut cache = WikiGameCache::default();
        let mut manifest = Manifest::default();

        let report = refresh_games(
            &mut api,
            &GameExtractor::default(),
            &mut cache,
            &mut manifest,
            &options(RefreshMode::Titles(vec![
                "New_Game".to_string(),
                "New Game".to_string(),
            ])),
        )
        .expect("refresh");
        assert_eq!(report.requested_pages, 1);
        assert_eq!(api.fetched, vec!["New Game".to_string()]);
        let cached = cache.get("New Game").expect("entry");
        assert_eq!(cached.page_id, 77);
        assert_eq!(cached.rev_id, Some(3));
    }

    #[test]
    fn results_are_stored_under_the_wiki_title() {
        let mut api = MockApi::default();
        api.pages.insert(
            "alpha".to_string(),
            page(1, "Alpha", 8, "{{Game data/saves|Windows|{{P|game}}/save.dat}}"),
        );
        let mut cache = WikiGameCache::default();
        cache.mark_new_pages(&[member(1, "Alpha")]);
        let mut manifest = Manifest::default();

        let report = refresh_games(
            &mut api,
            &GameExtractor::default(),
            &mut cache,
            &mut manifest,
            &options(RefreshMode::Titles(vec!["alpha".to_string()])),
        )
        .expect("refresh");

        assert_eq!(api.fetched, vec!["alpha".to_string()]);
        assert_eq!(report.pages[0].title, "Alpha");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("Alpha").expect("entry").rev_id, Some(8));
        assert!(cache.get("alpha").is_none());
        assert_eq!(manifest.len(), 1);
        assert!(manifest.get("Alpha").is_some());
    }

    #[test]
    fn limit_truncates_selection() {
        let mut api = MockApi::default();
        let mut cache = WikiGameCache::default();
        cache.mark_new_pages(&[member(1, "A"), member(2, "B"), member(3, "C")]);
        let mut manifest = Manifest::default();

        let report = refresh_games(
            &mut api,
            &GameExtractor::default(),
            &mut cache,
            &mut manifest,
            &RefreshOptions {
                mode: RefreshMode::Pending,
                limit: Some(2),
            },
        )
        .expect("refresh");
        assert_eq!(report.requested_pages, 2);
        assert_eq!(api.fetched, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn empty_title_list_is_rejected() {
        let mut api = MockApi::default();
        let error = refresh_games(
            &mut api,
            &GameExtractor::default(),
            &mut WikiGameCache::default(),
            &mut Manifest::default(),
            &options(RefreshMode::Titles(vec![" ".to_string()])),
        )
        .expect_err("must fail");
        assert!(error.to_string().contains("non-empty title"));
    }
}
