use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ragidx_core::config::{Config, Settings};
use ragidx_core::{FsLoader, HybridWeights, IndexInfo, QueryRequest, QueryResult, RefreshReport};
use ragidx_index::{IndexManager, IndexWatcher, ManagerSettings};

const USAGE: &str = "Usage: ragidx [--config <file>] <command> [args...]

Commands:
  create <name> <root>                    register an index over <root>
  refresh <name>                          reconcile an index with its root
  query <text> [--index <name>] [--top-k <n>] [--min-score <f>]
               [--keyword-only | --semantic-only] [--json]
  info <name>                             snapshot and storage details
  list                                    all indexes
  files <name>                            indexed files of an index
  files --search <pattern> [--index <name>]
  remove <name>                           delete an index and its storage
  watch [name...]                         refresh on file changes until Ctrl-C";

struct Args {
    config: Option<PathBuf>,
    command: String,
    rest: Vec<String>,
}

fn parse_args() -> Args {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let mut config = None;
    if args.first().map(String::as_str) == Some("--config") {
        if args.len() < 2 {
            eprintln!("Error: --config requires a path\n\n{USAGE}");
            std::process::exit(1);
        }
        config = Some(PathBuf::from(args.remove(1)));
        args.remove(0);
    }
    if args.is_empty() || matches!(args[0].as_str(), "-h" | "--help" | "help") {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    let command = args.remove(0);
    Args { config, command, rest: args }
}

/// Value following `flag`, removed from `args` together with the flag.
fn take_option(args: &mut Vec<String>, flag: &str) -> anyhow::Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        bail!("{flag} requires a value");
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    match args.iter().position(|a| a == flag) {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

fn positional(args: &[String], index: usize, what: &str) -> anyhow::Result<String> {
    args.get(index).cloned().with_context(|| format!("missing <{what}>\n\n{USAGE}"))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    Ok(config.settings()?)
}

/// Build the manager, reload persisted indexes and register the ones declared in the config.
fn open_manager(settings: &Settings) -> anyhow::Result<Arc<IndexManager>> {
    let embedder = ragidx_embed::from_settings(&settings.embedding)?;
    let manager = IndexManager::new(ManagerSettings::from_settings(settings), Arc::new(FsLoader::new()), embedder);
    let restored = manager.restore()?;
    if !restored.is_empty() {
        info!("Restored {} index(es): {}", restored.len(), restored.join(", "));
    }
    for config in settings.declared_indexes() {
        if manager.contains(&config.name) {
            continue;
        }
        let name = config.name.clone();
        if let Err(err) = manager.create(config) {
            warn!("Could not create declared index {}: {}", name, err);
        }
    }
    Ok(Arc::new(manager))
}

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn print_report(name: &str, report: &RefreshReport) {
    println!(
        "{name}: v{} | {} added, {} updated, {} removed, {} unchanged, {} failed | {} files, {} chunks",
        report.version,
        report.added,
        report.updated,
        report.removed,
        report.unchanged,
        report.failed,
        report.total,
        report.chunks
    );
    for path in &report.failed_files {
        println!("  failed: {path}");
    }
}

fn print_info(info: &IndexInfo) {
    println!("{}", info.name);
    println!("  root:        {}", info.root.display());
    println!("  version:     {}", info.version);
    println!("  files:       {}", info.file_count);
    println!("  chunks:      {}", info.chunk_count);
    println!("  dimension:   {}", info.dimension.map_or_else(|| "-".to_string(), |d| d.to_string()));
    println!("  disk size:   {} bytes", info.disk_size_bytes);
    match info.last_refresh {
        Some(at) => println!("  refreshed:   {}", at.to_rfc3339()),
        None => println!("  refreshed:   never (this process)"),
    }
}

fn refresh(manager: &IndexManager, name: &str) -> anyhow::Result<()> {
    let bar = spinner(format!("Refreshing {name}"));
    let outcome = manager.refresh(name);
    bar.finish_and_clear();
    print_report(name, &outcome?);
    Ok(())
}

fn query(manager: &IndexManager, mut args: Vec<String>) -> anyhow::Result<()> {
    let index = take_option(&mut args, "--index")?;
    let top_k = take_option(&mut args, "--top-k")?.map(|v| v.parse::<usize>()).transpose().context("--top-k")?;
    let min_score =
        take_option(&mut args, "--min-score")?.map(|v| v.parse::<f32>()).transpose().context("--min-score")?;
    let json = take_flag(&mut args, "--json");
    let weights = if take_flag(&mut args, "--keyword-only") {
        Some(HybridWeights::keyword_only())
    } else if take_flag(&mut args, "--semantic-only") {
        Some(HybridWeights::semantic_only())
    } else {
        None
    };
    if args.is_empty() {
        bail!("missing <text>\n\n{USAGE}");
    }

    let mut request = QueryRequest::new(args.join(" "));
    if let Some(top_k) = top_k {
        request = request.top_k(top_k);
    }
    if let Some(min_score) = min_score {
        request = request.min_score(min_score);
    }
    if let Some(weights) = weights {
        request = request.weights(weights);
    }

    let (rows, degraded) = match index {
        Some(name) => {
            let response = manager.query(&name, &request)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
                return Ok(());
            }
            let rows: Vec<(String, QueryResult)> = response.results.into_iter().map(|r| (name.clone(), r)).collect();
            (rows, response.degraded)
        }
        None => {
            let response = manager.query_all(&request)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
                return Ok(());
            }
            let rows: Vec<(String, QueryResult)> =
                response.results.into_iter().map(|r| (r.index, r.result)).collect();
            (rows, response.degraded)
        }
    };

    if degraded {
        println!("(embedding provider unavailable; keyword results only)");
    }
    if rows.is_empty() {
        println!("No results for \"{}\"", request.text);
    }
    for (i, (index, result)) in rows.iter().enumerate() {
        println!(
            "\n  {}. score={:.4}  {}:{}  [{}..{}]",
            i + 1,
            result.score,
            index,
            result.file_path,
            result.start,
            result.end
        );
        let preview: String = result.text.chars().take(200).collect();
        println!("     {}", preview.replace('\n', " "));
    }
    Ok(())
}

fn files(manager: &IndexManager, mut args: Vec<String>) -> anyhow::Result<()> {
    if let Some(pattern) = take_option(&mut args, "--search")? {
        let index = take_option(&mut args, "--index")?;
        for (index, path) in manager.search_files(&pattern, index.as_deref())? {
            println!("{index}:{path}");
        }
        return Ok(());
    }
    let name = positional(&args, 0, "name")?;
    for path in manager.list_files(&name)? {
        println!("{path}");
    }
    Ok(())
}

fn watch(manager: &Arc<IndexManager>, settings: &Settings, args: &[String]) -> anyhow::Result<()> {
    let names: Vec<String> = if args.is_empty() {
        let declared: Vec<String> =
            settings.declared_indexes().into_iter().filter(|c| c.watch).map(|c| c.name).collect();
        if declared.is_empty() { manager.names() } else { declared }
    } else {
        args.to_vec()
    };
    if names.is_empty() {
        bail!("no indexes to watch");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let mut watchers = Vec::with_capacity(names.len());
        for name in &names {
            let watcher = IndexWatcher::start(Arc::clone(manager), name, &settings.watch)?;
            // Catch up with changes made while nobody was watching.
            watcher.coordinator().request_refresh().await;
            watchers.push(watcher);
        }
        println!("Watching {} (Ctrl-C to stop)", names.join(", "));
        tokio::signal::ctrl_c().await?;
        info!("Stopping watchers");
        for (name, watcher) in names.iter().zip(watchers) {
            let status = watcher.coordinator().status();
            watcher.shutdown().await;
            let status = status.borrow().clone();
            if let Some(report) = status.last {
                print_report(name, &report);
            }
        }
        anyhow::Ok(())
    })
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = parse_args();
    let settings = load_settings(args.config.as_ref()).context("loading configuration")?;
    let manager = open_manager(&settings)?;
    let rest = args.rest;

    match args.command.as_str() {
        "create" => {
            let name = positional(&rest, 0, "name")?;
            let root = positional(&rest, 1, "root")?;
            let info = manager.create(settings.index_config(&name, &root))?;
            println!("Created index {} over {}", info.name, info.root.display());
        }
        "refresh" => {
            let name = positional(&rest, 0, "name")?;
            refresh(&manager, &name)?;
        }
        "query" => query(&manager, rest)?,
        "info" => {
            let name = positional(&rest, 0, "name")?;
            print_info(&manager.info(&name)?);
        }
        "list" => {
            let indexes = manager.list();
            if indexes.is_empty() {
                println!("No indexes under {}", settings.storage_root().display());
            }
            for info in indexes {
                println!(
                    "{:<20} v{:<4} {:>6} files {:>8} chunks  {}",
                    info.name,
                    info.version,
                    info.file_count,
                    info.chunk_count,
                    info.root.display()
                );
            }
        }
        "files" => files(&manager, rest)?,
        "remove" => {
            let name = positional(&rest, 0, "name")?;
            manager.remove(&name)?;
            println!("Removed index {name}");
        }
        "watch" => watch(&manager, &settings, &rest)?,
        other => {
            eprintln!("Unknown command: {other}\n\n{USAGE}");
            std::process::exit(1);
        }
    }
    Ok(())
}
