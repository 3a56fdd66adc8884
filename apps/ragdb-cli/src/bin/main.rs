use std::env;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use ragdb_core::config::EngineConfig;
use ragdb_core::loader;
use ragdb_engine::RagEngine;

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    if args.is_empty() {
        eprintln!("Usage: {} <ingest|query|list|clear|status> [args...]", prog);
        std::process::exit(1);
    }
    let cmd = args.remove(0);
    (cmd, args)
}

fn collect_documents(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| loader::is_supported(p))
        .collect();
    files.sort();
    files
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = EngineConfig::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let engine = RagEngine::new(config)?;
    let (cmd, args) = parse_args();

    match cmd.as_str() {
        "ingest" => {
            let target = args.first().map(PathBuf::from).unwrap_or_else(|| {
                eprintln!("Usage: ragdb ingest <file-or-directory>");
                std::process::exit(1)
            });
            let files = collect_documents(&target);
            if files.is_empty() {
                println!("No supported documents under {}.", target.display());
                return Ok(());
            }
            let pb = ProgressBar::new(files.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
                    .progress_chars("#>-"),
            );
            let mut total_chunks = 0usize;
            let mut failed = 0usize;
            for file in &files {
                pb.set_message(file.display().to_string());
                match engine.ingest_document(file).await {
                    Ok(count) => total_chunks += count,
                    Err(e) => {
                        failed += 1;
                        pb.println(format!("⚠️  {}: {}", file.display(), e));
                    }
                }
                pb.inc(1);
            }
            pb.finish_with_message("done");
            println!(
                "✅ Ingested {} file(s) into {} chunk(s){}",
                files.len() - failed,
                total_chunks,
                if failed > 0 { format!(", {} failed", failed) } else { String::new() }
            );
        }
        "query" => {
            let text = args.first().cloned().unwrap_or_else(|| {
                eprintln!("Usage: ragdb query \"<text>\"");
                std::process::exit(1)
            });
            let (context, sources) = engine.query(&text).await;
            if context.is_empty() {
                println!("No matching context in the knowledge base.");
            } else {
                println!("{}", context);
                println!("\n📄 Sources: {}", sources.join(", "));
            }
        }
        "list" => {
            let docs = engine.list_documents().await?;
            if docs.is_empty() {
                println!("Knowledge base is empty.");
            } else {
                for doc in docs {
                    println!("{}", doc);
                }
            }
        }
        "clear" => {
            engine.clear_db().await?;
            println!("✅ Knowledge base cleared.");
        }
        "status" => {
            let docs = engine.list_documents().await?;
            let chunks = engine.count_chunks().await?;
            println!("{} document(s), {} chunk(s) indexed", docs.len(), chunks);
        }
        other => {
            eprintln!("Unknown command '{}'. Expected ingest|query|list|clear|status.", other);
            std::process::exit(1);
        }
    }
    Ok(())
}
