mod logging;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use tracing::debug;

use savewiki_core::cache::WikiGameCache;
use savewiki_core::config::{SavewikiConfig, load_config};
use savewiki_core::constraint::{constraint_from_path, constraint_from_system};
use savewiki_core::extract::GameExtractor;
use savewiki_core::manifest::Manifest;
use savewiki_core::model::PathType;
use savewiki_core::path_args::unknown_tokens;
use savewiki_core::refresh::{
    DiscoverReport, RefreshMode, RefreshOptions, RefreshReport, discover_pages, refresh_games,
};
use savewiki_core::resolve::{is_too_broad, resolve_path};
use savewiki_core::runtime::{PathOverrides, ResolvedPaths, resolve_paths};
use savewiki_core::wiki::MediaWikiClient;

#[derive(Debug, Parser)]
#[command(
    name = "savewiki",
    version,
    about = "Build a save-location manifest from wiki game pages"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
    #[arg(long, global = true, help = "Print reports as JSON")]
    json: bool,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    json: bool,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            json: cli.json,
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "List category members and record unseen pages")]
    Discover,
    #[command(about = "Fetch pages and rebuild their manifest records")]
    Refresh(RefreshArgs),
    #[command(about = "Resolve a single raw wiki path")]
    Resolve(ResolveArgs),
    #[command(about = "Show cache and manifest counts")]
    Stats,
}

#[derive(Debug, Args)]
struct RefreshArgs {
    #[arg(long, conflicts_with_all = ["flagged", "games"], help = "Refresh every cached page")]
    all: bool,
    #[arg(long, conflicts_with = "games", help = "Refresh pages with skipped paths")]
    flagged: bool,
    #[arg(long = "game", value_name = "TITLE", help = "Refresh a specific page (repeatable)")]
    games: Vec<String>,
    #[arg(long, value_name = "N", help = "Stop after N pages")]
    limit: Option<usize>,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    raw: String,
    #[arg(long, value_name = "TEXT", help = "System column text, e.g. Windows or Steam")]
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResolveOutput {
    raw: String,
    resolved: Option<String>,
    path_type: Option<&'static str>,
    constraint: Option<String>,
    too_broad: bool,
    unknown_tokens: Vec<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatsOutput {
    pages: usize,
    pending: usize,
    unsupported_os: usize,
    unsupported_path: usize,
    too_broad: usize,
    manifest_games: usize,
}

struct Workspace {
    paths: ResolvedPaths,
    config: SavewikiConfig,
    cache: WikiGameCache,
    manifest: Manifest,
}

impl Workspace {
    fn open(runtime: &RuntimeOptions) -> Result<Self> {
        let paths = resolve_runtime_paths(runtime)?;
        let config = load_config(&paths.config_path)?;
        let cache = WikiGameCache::load(&paths.cache_path)?;
        let manifest = Manifest::load(&paths.manifest_path)?;
        debug!(
            cached_pages = cache.len(),
            manifest_games = manifest.len(),
            "loaded workspace"
        );
        Ok(Self {
            paths,
            config,
            cache,
            manifest,
        })
    }

    fn client(&self) -> Result<MediaWikiClient> {
        MediaWikiClient::from_config(&self.config).context("failed to build wiki client")
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Discover) => run_discover(&runtime),
        Some(Commands::Refresh(args)) => run_refresh(&runtime, args),
        Some(Commands::Resolve(args)) => run_resolve(&runtime, args),
        Some(Commands::Stats) => run_stats(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_discover(runtime: &RuntimeOptions) -> Result<()> {
    let mut workspace = Workspace::open(runtime)?;
    let mut client = workspace.client()?;
    let categories = workspace.config.categories();

    let report = discover_pages(&mut client, &mut workspace.cache, &categories)?;
    workspace.cache.save(&workspace.paths.cache_path)?;

    if runtime.json {
        return print_json(&report);
    }
    print_discover_report(&report);
    print_diagnostics(runtime, &workspace.paths);
    Ok(())
}

fn run_refresh(runtime: &RuntimeOptions, args: RefreshArgs) -> Result<()> {
    let mut workspace = Workspace::open(runtime)?;
    let mut client = workspace.client()?;
    let extractor = GameExtractor::new(workspace.config.broad_path_denylist());
    let options = RefreshOptions {
        mode: refresh_mode(&args),
        limit: args.limit,
    };

    let report = refresh_games(
        &mut client,
        &extractor,
        &mut workspace.cache,
        &mut workspace.manifest,
        &options,
    )?;
    workspace.cache.save(&workspace.paths.cache_path)?;
    workspace.manifest.save(&workspace.paths.manifest_path)?;

    if runtime.json {
        print_json(&report)?;
    } else {
        print_refresh_report(&report);
        print_diagnostics(runtime, &workspace.paths);
    }
    if !report.success {
        anyhow::bail!("refresh finished with {} error(s)", report.errors.len());
    }
    Ok(())
}

fn refresh_mode(args: &RefreshArgs) -> RefreshMode {
    if !args.games.is_empty() {
        RefreshMode::Titles(args.games.clone())
    } else if args.all {
        RefreshMode::All
    } else if args.flagged {
        RefreshMode::Flagged
    } else {
        RefreshMode::Pending
    }
}

fn run_resolve(runtime: &RuntimeOptions, args: ResolveArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let denylist = config.broad_path_denylist();

    let mut output = ResolveOutput {
        raw: args.raw.clone(),
        resolved: None,
        path_type: None,
        constraint: None,
        too_broad: false,
        unknown_tokens: unknown_tokens(&args.raw),
        error: None,
    };
    match resolve_path(&args.raw) {
        Ok((resolved, path_type)) => {
            output.too_broad = is_too_broad(&resolved, &denylist);
            output.path_type = Some(match path_type {
                PathType::FileSystem => "file",
                PathType::Registry => "registry",
            });
            output.resolved = Some(resolved);
            let constraint = match args.system.as_deref() {
                Some(system) => constraint_from_system(system, &args.raw),
                None => Ok(constraint_from_path(&args.raw)),
            };
            match constraint {
                Ok(constraint) => output.constraint = Some(constraint.describe()),
                Err(error) => output.error = Some(error.to_string()),
            }
        }
        Err(error) => output.error = Some(error.to_string()),
    }

    if runtime.json {
        return print_json(&output);
    }
    println!("raw: {}", output.raw);
    println!("resolved: {}", output.resolved.as_deref().unwrap_or("<none>"));
    println!("path_type: {}", output.path_type.unwrap_or("<none>"));
    println!(
        "constraint: {}",
        output.constraint.as_deref().unwrap_or("<none>")
    );
    println!("too_broad: {}", format_flag(output.too_broad));
    if !output.unknown_tokens.is_empty() {
        println!("unknown_tokens: {}", output.unknown_tokens.join(", "));
    }
    if let Some(error) = &output.error {
        println!("error: {error}");
    }
    Ok(())
}

fn run_stats(runtime: &RuntimeOptions) -> Result<()> {
    let workspace = Workspace::open(runtime)?;
    let stats = workspace.cache.stats();
    let output = StatsOutput {
        pages: stats.pages,
        pending: stats.pending,
        unsupported_os: stats.unsupported_os,
        unsupported_path: stats.unsupported_path,
        too_broad: stats.too_broad,
        manifest_games: workspace.manifest.len(),
    };

    if runtime.json {
        return print_json(&output);
    }
    println!("cache: {}", normalize_path(&workspace.paths.cache_path));
    println!("manifest: {}", normalize_path(&workspace.paths.manifest_path));
    println!("pages: {}", output.pages);
    println!("pending: {}", output.pending);
    println!("unsupported_os: {}", output.unsupported_os);
    println!("unsupported_path: {}", output.unsupported_path);
    println!("too_broad: {}", output.too_broad);
    println!("manifest_games: {}", output.manifest_games);
    print_diagnostics(runtime, &workspace.paths);
    Ok(())
}

fn print_discover_report(report: &DiscoverReport) {
    println!("discover");
    println!("categories: {}", report.categories.join(", "));
    println!("listed: {}", report.listed);
    println!("added: {}", report.added);
    println!("requests: {}", report.request_count);
}

fn print_refresh_report(report: &RefreshReport) {
    println!("refresh");
    println!("requested: {}", report.requested_pages);
    println!("processed: {}", report.processed);
    println!("flagged: {}", report.flagged);
    println!("missing: {}", report.missing);
    println!("requests: {}", report.request_count);
    for page in &report.pages {
        match &page.detail {
            Some(detail) => println!("  {} [{}] {}", page.title, page.action, detail),
            None => println!("  {} [{}]", page.title, page.action),
        }
    }
    if !report.errors.is_empty() {
        println!("errors:");
        for error in &report.errors {
            println!("  - {error}");
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{rendered}");
    Ok(())
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&overrides)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
