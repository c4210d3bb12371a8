use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use localrag_core::config::{resolve_with_base, Config, Settings};
use localrag_core::traits::Embedder;
use localrag_core::{Chunker, Error, Meta, MetaValue};
use localrag_embed::get_default_embedder;
use localrag_engine::RagEngine;
use localrag_vector::{meta_path, BackgroundPersister, VectorIndex};

const USAGE: &str = "Usage: localrag <ingest <path>... [--tag key=value]... | query \"<text>\" [-k N] | stats>";

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() { eprintln!("{USAGE}"); std::process::exit(1); }
    let cmd = args.remove(0);
    (cmd, args)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Engine over the configured embedder, restored from `index_path` when a saved index exists.
fn build_engine(settings: &Settings, index_path: &Path) -> anyhow::Result<RagEngine> {
    let embedder: Arc<dyn Embedder> = Arc::from(get_default_embedder(&settings.embedding)?);
    let index = Arc::new(VectorIndex::new(settings.index.dimension)?);
    let engine = RagEngine::new(Chunker::from_settings(&settings.chunking)?, embedder, index)
        .context("index.dimension must match the embedding model")?;
    if meta_path(index_path).exists() {
        let stats = engine.restore(index_path).with_context(|| format!("loading index at {}", index_path.display()))?;
        info!(vectors = stats.vectors, next_id = stats.next_id, "restored index");
    }
    Ok(engine)
}

fn collect_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            files.extend(
                WalkDir::new(input)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file())
                    .map(|e| e.into_path()),
            );
        } else {
            files.push(input.clone());
        }
    }
    files
}

fn parse_ingest_args(args: &[String]) -> anyhow::Result<(Vec<PathBuf>, Meta)> {
    let mut paths = Vec::new();
    let mut tags = Meta::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--tag" => {
                let Some((k, v)) = args.get(i + 1).and_then(|kv| kv.split_once('=')) else {
                    bail!("--tag requires key=value");
                };
                tags.insert(k.to_string(), MetaValue::from(v));
                i += 1;
            }
            other if other.starts_with('-') => bail!("unknown option {other}\n{USAGE}"),
            other => paths.push(PathBuf::from(other)),
        }
        i += 1;
    }
    if paths.is_empty() {
        bail!("ingest needs at least one file or directory\n{USAGE}");
    }
    Ok((paths, tags))
}

async fn ingest(engine: &RagEngine, settings: &Settings, index_path: &Path, args: &[String]) -> anyhow::Result<()> {
    let (inputs, tags) = parse_ingest_args(args)?;
    let files = collect_files(&inputs);
    let persister = settings.index.autosave.then(|| BackgroundPersister::spawn(Arc::clone(engine.index()), index_path.to_path_buf()));

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?);
    let (mut chunks, mut skipped) = (0usize, 0usize);
    let mut last_save = None;
    for file in &files {
        pb.set_message(file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default());
        match engine.ingest(file, &tags) {
            Ok(ids) => {
                chunks += ids.len();
                if let Some(p) = &persister {
                    last_save = Some(p.request_save());
                }
            }
            Err(Error::Parse(msg)) => {
                warn!(%msg, "skipping file");
                skipped += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("ingesting {}", file.display())),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    match persister {
        Some(p) => {
            if let Some(handle) = last_save {
                handle.wait().await.map_err(|e| anyhow::anyhow!("saving index: {e}"))?;
            }
            p.shutdown().await;
        }
        None => {
            engine.persist(index_path)?;
        }
    }
    println!("Ingested {} files ({} chunks, {} skipped) into {}", files.len() - skipped, chunks, skipped, index_path.display());
    Ok(())
}

fn query(engine: &RagEngine, args: &[String]) -> anyhow::Result<()> {
    let mut text = None;
    let mut top_k = 5usize;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-k" | "--top-k" => {
                top_k = args.get(i + 1).and_then(|v| v.parse().ok()).context("-k requires a number")?;
                i += 1;
            }
            other if text.is_none() => text = Some(other.to_string()),
            other => bail!("unexpected argument {other}\n{USAGE}"),
        }
        i += 1;
    }
    let text = text.context(USAGE)?;
    for hit in engine.query(&text, top_k)? {
        println!("{}", serde_json::to_string(&hit)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let (cmd, args) = parse_args();
    let index_path = resolve_with_base(&env::current_dir()?, &settings.index.path);
    let engine = build_engine(&settings, &index_path)?;

    match cmd.as_str() {
        "ingest" => ingest(&engine, &settings, &index_path, &args).await?,
        "query" => query(&engine, &args)?,
        "stats" => println!("{}", serde_json::to_string(&engine.stats())?),
        _ => { eprintln!("Unknown command: {}\n{USAGE}", cmd); std::process::exit(1); }
    }
    Ok(())
}
