//! Output formatting for command results.

use anyhow::Result;
use serde::Serialize;

use quarry::graph::calls::CallGraph;
use quarry::graph::deps::IndexStatus;
use quarry::search::SearchResponse;
use quarry::store::DependencyEdge;
use quarry::symbol_index::SymbolHit;
use quarry::OutputFormat;

/// Serialize a list of rows in the requested format. `to_row` supplies the
/// CSV/TSV cells; text rendering is the caller's business.
fn emit_rows<T, F>(items: &[T], format: OutputFormat, to_row: F) -> Result<()>
where
    T: Serialize,
    F: Fn(&T) -> Vec<String>,
{
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
        OutputFormat::Jsonl => {
            for item in items {
                println!("{}", serde_json::to_string(item)?);
            }
        }
        OutputFormat::Csv | OutputFormat::Tsv => {
            let delimiter = if matches!(format, OutputFormat::Tsv) {
                b'\t'
            } else {
                b','
            };
            let mut writer = csv::WriterBuilder::new()
                .delimiter(delimiter)
                .from_writer(std::io::stdout());
            for item in items {
                writer.write_record(to_row(item))?;
            }
            writer.flush()?;
        }
        OutputFormat::Text => unreachable!("text handled by callers"),
    }
    Ok(())
}

pub fn print_search(response: &SearchResponse, format: OutputFormat, quiet: bool) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for result in &response.results {
                println!(
                    "{}:{}: {} [{:.1}]",
                    result.file_path, result.line_number, result.preview, result.score
                );
                for secondary in &result.secondary_matches {
                    println!("  {}:{}: {}", result.file_path, secondary.line_number, secondary.preview);
                }
            }
            if response.degraded && !quiet {
                eprintln!(
                    "note: results degraded ({})",
                    response.degraded_reason.as_deref().unwrap_or("budget")
                );
            }
        }
        _ => emit_rows(&response.results, format, |r| {
            vec![
                r.file_path.clone(),
                r.line_number.to_string(),
                format!("{:.2}", r.score),
                r.preview.clone(),
            ]
        })?,
    }
    Ok(())
}

pub fn print_symbol_hits(hits: &[SymbolHit], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for hit in hits {
                let symbol = &hit.symbol;
                match symbol.as_definition() {
                    Some(def) => println!(
                        "{}:{}: {} {} [{:.2}]",
                        hit.file_path,
                        def.start_line,
                        def.kind.as_str(),
                        def.name,
                        hit.score
                    ),
                    None => println!("{}: {} [{:.2}]", hit.file_path, symbol.name(), hit.score),
                }
            }
        }
        _ => {
            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct Row<'a> {
                file_path: &'a str,
                symbol: &'a quarry::symbol::Symbol,
                score: f64,
            }
            let rows: Vec<Row> = hits
                .iter()
                .map(|h| Row {
                    file_path: &h.file_path,
                    symbol: &h.symbol,
                    score: h.score,
                })
                .collect();
            emit_rows(&rows, format, |r| {
                vec![
                    r.file_path.to_string(),
                    r.symbol.name().to_string(),
                    format!("{:.2}", r.score),
                ]
            })?;
        }
    }
    Ok(())
}

pub fn print_edges(edges: &[DependencyEdge], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for edge in edges {
                println!(
                    "{} -> {} [{}] line {} via {} ({})",
                    edge.source,
                    edge.target,
                    edge.kind,
                    edge.metadata.line,
                    edge.metadata.specifier,
                    edge.metadata.strategy
                );
            }
        }
        _ => emit_rows(edges, format, |e| {
            vec![
                e.source.clone(),
                e.target.clone(),
                e.kind.clone(),
                e.metadata.line.to_string(),
                e.metadata.specifier.clone(),
            ]
        })?,
    }
    Ok(())
}

pub fn print_file_list(files: &[String], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for file in files {
                println!("{file}");
            }
        }
        _ => emit_rows(files, format, |f| vec![f.clone()])?,
    }
    Ok(())
}

pub fn print_call_graph(graph: &CallGraph, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("root: {}", graph.root);
            let mut nodes: Vec<_> = graph.nodes.values().collect();
            nodes.sort_by(|a, b| a.id.cmp(&b.id));
            for node in nodes {
                println!("  {} ({}:{})", node.id, node.file_path, node.line);
            }
            for edge in &graph.edges {
                println!(
                    "  {} -> {} [{:?}, {:?}] at {}:{}",
                    edge.from, edge.to, edge.call_type, edge.confidence, edge.line, edge.column
                );
            }
            if graph.truncated {
                println!("  (truncated)");
            }
        }
        _ => {
            println!("{}", serde_json::to_string_pretty(graph)?);
        }
    }
    Ok(())
}

pub fn print_status(status: &IndexStatus, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("Files indexed: {}", status.total_files);
            println!("Dependency edges: {}", status.total_edges);
            println!(
                "Unresolved imports: {} across {} files ({:.1}%)",
                status.unresolved_imports,
                status.files_with_unresolved,
                status.unresolved_ratio * 100.0
            );
            println!("Confidence: {:?}", status.confidence);
            println!("Monorepo: {}", if status.is_monorepo { "yes" } else { "no" });
            if status.stale {
                println!("Index is stale; re-run `quarry index`");
            }
        }
        _ => println!("{}", serde_json::to_string_pretty(status)?),
    }
    Ok(())
}

pub fn print_edit_result(result: &quarry::editor::EditResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if result.success {
                if let Some(diff) = &result.diff {
                    print!("{diff}");
                }
                if let Some(op) = &result.operation {
                    println!("operation: {}", op.id);
                }
            } else {
                let code = result
                    .error_code
                    .map(|c| c.as_str())
                    .unwrap_or("UNKNOWN");
                eprintln!(
                    "error [{code}]: {}",
                    result.message.as_deref().unwrap_or("edit failed")
                );
                if let Some(suggestion) = &result.suggestion {
                    eprintln!("suggestion ({}): {}", suggestion.action, suggestion.detail);
                }
            }
        }
        _ => println!("{}", serde_json::to_string_pretty(result)?),
    }
    Ok(())
}
