//! Quarry - local code-intelligence engine CLI.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

mod cli;
mod output;

use cli::{Cli, Commands};
use quarry::config::Config;
use quarry::editor::{ApplyOptions, DiffMode, Edit};
use quarry::graph::calls::CallGraphBuilder;
use quarry::indexer::{build_full_index, Engine, IndexPhase, IndexProgress};
use quarry::search::engine::SearchOptions;
use quarry::{watcher, workspace, ExitCode, OutputFormat};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    let format = cli.format;
    let quiet = cli.quiet;

    let workspace = match workspace::resolve_workspace(cli.workspace.as_deref()) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::Error.into();
        }
    };
    let db = workspace::resolve_db_path(cli.db.as_deref(), &workspace);

    let result = run(&cli.command, &workspace, &db, format, quiet);
    match result {
        Ok(code) => code.into(),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::Error.into()
        }
    }
}

fn run(
    command: &Commands,
    root: &Path,
    db: &Path,
    format: OutputFormat,
    quiet: bool,
) -> Result<ExitCode> {
    let config = Config::load(root)?;

    match command {
        Commands::Index { rebuild } => {
            if *rebuild && db.exists() {
                std::fs::remove_file(db).context("failed to remove existing index")?;
            }
            let engine = Engine::open(root, db, config)?;
            run_indexing_with_progress(&engine, quiet)?;
            Ok(ExitCode::Success)
        }
        Commands::Watch => {
            let engine = Engine::open(root, db, config)?;
            run_indexing_with_progress(&engine, quiet)?;
            let (shutdown_tx, shutdown_rx) = mpsc::channel();
            ctrlc::set_handler(move || {
                let _ = shutdown_tx.send(());
            })
            .ok();
            watcher::watch(&engine, shutdown_rx)?;
            Ok(ExitCode::Success)
        }
        Commands::Search {
            query,
            intent,
            patterns,
            word_boundary,
            file_types,
            limit,
        } => {
            let engine = Engine::open(root, db, config)?;
            let opts = SearchOptions {
                intent: intent.as_ref().map(|i| (*i).into()),
                patterns: patterns.clone(),
                word_boundary: *word_boundary,
                file_types: if file_types.is_empty() {
                    None
                } else {
                    Some(file_types.clone())
                },
                limit: Some(*limit),
            };
            let response = engine.search.search(&engine.trigrams.borrow(), query, &opts)?;
            let found = !response.results.is_empty();
            output::print_search(&response, format, quiet)?;
            Ok(found_code(found))
        }
        Commands::Symbols {
            query,
            fuzzy,
            limit,
        } => {
            let engine = Engine::open(root, db, config)?;
            let mut hits = match fuzzy {
                Some(distance) => engine.symbols.fuzzy_search(query, *distance)?,
                None => engine.symbols.search(query)?,
            };
            if let Some(limit) = limit {
                hits.truncate(*limit);
            }
            let found = !hits.is_empty();
            output::print_symbol_hits(&hits, format)?;
            Ok(found_code(found))
        }
        Commands::Resolve { specifier, file } => {
            let engine = Engine::open(root, db, config)?;
            let result = engine.resolver.resolve_detailed(file, specifier);
            match format {
                OutputFormat::Text => {
                    match &result.resolved_path {
                        Some(path) => println!(
                            "{} [{}]",
                            path.display(),
                            result.strategy.as_str()
                        ),
                        None if result.core => println!("(core module)"),
                        None if result.external => println!("(external package)"),
                        None => {
                            println!("unresolved: {}", result.error.as_deref().unwrap_or("?"));
                            if !quiet {
                                for attempt in &result.attempts {
                                    eprintln!("  tried {attempt}");
                                }
                            }
                        }
                    }
                }
                _ => {
                    let json = serde_json::json!({
                        "resolvedPath": result.resolved_path,
                        "strategy": result.strategy.as_str(),
                        "core": result.core,
                        "external": result.external,
                        "error": result.error,
                        "attempts": result.attempts,
                    });
                    println!("{}", serde_json::to_string_pretty(&json)?);
                }
            }
            Ok(found_code(result.resolved_path.is_some()))
        }
        Commands::Deps {
            file,
            direction,
            transitive,
            depth,
        } => {
            let engine = Engine::open(root, db, config)?;
            if *transitive {
                let files = engine
                    .graph
                    .get_transitive_dependencies(file, *direction, *depth)?;
                let found = !files.is_empty();
                output::print_file_list(&files, format)?;
                Ok(found_code(found))
            } else {
                let edges = engine.graph.get_dependencies(file, *direction)?;
                let found = !edges.is_empty();
                output::print_edges(&edges, format)?;
                Ok(found_code(found))
            }
        }
        Commands::Calls {
            symbol,
            file,
            direction,
            depth,
        } => {
            let engine = Engine::open(root, db, config)?;
            let builder = CallGraphBuilder::new(&engine.symbols, engine.resolver.clone())?;
            let graph = builder.analyze(symbol, file, *direction, *depth)?;
            let found = !graph.nodes.is_empty();
            output::print_call_graph(&graph, format)?;
            Ok(found_code(found))
        }
        Commands::Edit {
            file,
            edits,
            inline,
            dry_run,
            semantic,
            description,
        } => {
            let engine = Engine::open(root, db, config)?;
            let raw = if *inline {
                edits.clone()
            } else {
                std::fs::read_to_string(edits)
                    .with_context(|| format!("failed to read edits file {edits}"))?
            };
            let edits: Vec<Edit> =
                serde_json::from_str(&raw).context("edits must be a JSON array of edit objects")?;
            let opts = ApplyOptions {
                dry_run: *dry_run,
                description: description.clone(),
                diff_mode: if *semantic {
                    DiffMode::Semantic
                } else {
                    DiffMode::Default
                },
            };
            let result = engine.editor.apply_edits(file, &edits, &opts)?;
            let success = result.success;
            if success && !*dry_run {
                engine.drain_pending(true)?;
            }
            output::print_edit_result(&result, format)?;
            Ok(if success {
                ExitCode::Success
            } else {
                ExitCode::Error
            })
        }
        Commands::Undo { operation } => {
            let engine = Engine::open(root, db, config)?;
            let result = engine.editor.undo(operation.as_deref())?;
            let success = result.success;
            if success {
                engine.drain_pending(true)?;
            }
            output::print_edit_result(&result, format)?;
            Ok(if success {
                ExitCode::Success
            } else {
                ExitCode::Error
            })
        }
        Commands::Delete {
            file,
            confirm_hash,
            strict,
        } => {
            let engine = Engine::open(root, db, config)?;
            let result = engine
                .editor
                .delete_file(file, confirm_hash.as_deref(), *strict)?;
            let success = result.success;
            if success {
                engine.reindex_file(file)?;
            }
            output::print_edit_result(&result, format)?;
            Ok(if success {
                ExitCode::Success
            } else {
                ExitCode::Error
            })
        }
        Commands::Status => {
            let engine = Engine::open(root, db, config)?;
            let status = engine.graph.get_index_status()?;
            output::print_status(&status, format)?;
            Ok(ExitCode::Success)
        }
    }
}

fn found_code(found: bool) -> ExitCode {
    if found {
        ExitCode::Success
    } else {
        ExitCode::NotFound
    }
}

fn init_logging(verbosity: u8, quiet: bool) {
    let level = if quiet {
        "warn"
    } else {
        match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Run indexing with an indicatif progress bar: spinner while scanning,
/// bar with rate and ETA while parsing.
fn run_indexing_with_progress(engine: &Engine, quiet: bool) -> Result<()> {
    if quiet {
        build_full_index(engine, None::<fn(&IndexProgress)>)?;
        return Ok(());
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message("Scanning for files...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let pb_ref = pb.clone();
    let progress_callback = move |progress: &IndexProgress| match progress.phase {
        IndexPhase::Scanning => {
            pb_ref.set_message("Scanning for files...");
        }
        IndexPhase::Parsing => {
            if progress.files_total > 0 && pb_ref.length() != Some(progress.files_total as u64) {
                pb_ref.set_length(progress.files_total as u64);
                pb_ref.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.cyan} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                        .unwrap()
                        .progress_chars("=>-"),
                );
            }
            pb_ref.set_position(progress.files_done as u64);
            let mut msg = format!(
                "{:.0} files/sec, {} symbols",
                progress.files_per_sec, progress.symbols_found
            );
            if let Some(eta) = progress.eta_secs {
                msg.push_str(&format!(", ETA: {eta:.0}s"));
            }
            pb_ref.set_message(msg);
        }
        IndexPhase::Resolving => {
            pb_ref.set_message("Rebuilding dependency edges...");
        }
        IndexPhase::Finalizing => {
            pb_ref.set_message("Finalizing index...");
        }
    };

    let summary = build_full_index(engine, Some(progress_callback))?;
    pb.finish_and_clear();
    println!(
        "Indexed {} files ({} symbols) in {:.1}s ({:.1} files/sec)",
        summary.files_indexed, summary.symbols_found, summary.duration_secs, summary.files_per_sec
    );
    Ok(())
}
