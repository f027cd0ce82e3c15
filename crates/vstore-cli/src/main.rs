#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_lines)]

use clap::Parser;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use vstore_core::{DbConfig, Embedding, HnswParams, IndexParams, KdTreeParams, LshParams, Metric};
use vstore_engine::VectorDb;

mod repl;

#[derive(Parser, Debug)]
#[command(author, version, about = "A minimal line-oriented shell over the vector store's command surface", long_about = None)]
struct Args {
    /// Override the data directory (defaults to VSTORE_DATA_DIR or ./data)
    #[arg(long)]
    data_dir: Option<String>,

    /// Run a single command non-interactively and exit
    #[arg(long)]
    command: Option<String>,
}

fn parse_index_params(kind: &str) -> Result<IndexParams, String> {
    match kind.to_ascii_lowercase().as_str() {
        "hnsw" => Ok(IndexParams::Hnsw(HnswParams::default())),
        "lsh" => Ok(IndexParams::Lsh(LshParams::default())),
        "kdtree" | "kd-tree" | "kd_tree" => Ok(IndexParams::KdTree(KdTreeParams::default())),
        other => Err(format!("unknown index kind {other:?}, expected hnsw|lsh|kdtree")),
    }
}

fn parse_metric(metric: &str) -> Result<Metric, String> {
    match metric.to_ascii_lowercase().as_str() {
        "cosine" => Ok(Metric::Cosine),
        "euclidean" | "l2" => Ok(Metric::Euclidean),
        "dot" => Ok(Metric::Dot),
        other => Err(format!("unknown metric {other:?}, expected cosine|euclidean|dot")),
    }
}

fn parse_vector(csv: &str) -> Result<Embedding, String> {
    let coords: Result<Vec<f64>, _> = csv.split(',').map(|s| s.trim().parse::<f64>()).collect();
    let coords = coords.map_err(|e| format!("malformed vector: {e}"))?;
    Embedding::new(coords).map_err(|e| e.to_string())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("vstore-cli starting up");

    let args = Args::parse();
    let mut config = DbConfig::from_env();
    if let Some(dir) = args.data_dir {
        config.data_dir = dir.into();
    }

    let db = match VectorDb::open(&config) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            eprintln!("failed to open store at {:?}: {e}", config.data_dir);
            std::process::exit(1);
        }
    };
    println!("ready — {} librar{} loaded", db.library_count(), if db.library_count() == 1 { "y" } else { "ies" });

    let shutdown = Arc::new(AtomicBool::new(false));

    let rebuild_handle = {
        let db = db.clone();
        let shutdown = shutdown.clone();
        thread::spawn(move || background_rebuild_loop(&db, &shutdown))
    };
    let snapshot_handle = {
        let db = db.clone();
        let shutdown = shutdown.clone();
        let interval = config.snapshot_interval;
        thread::spawn(move || background_snapshot_loop(&db, &shutdown, interval))
    };

    if let Some(line) = args.command {
        let mut out = io::stdout();
        repl::run_line(&db, &line, &mut out);
    } else {
        repl::run_interactive(&db);
    }

    shutdown.store(true, Ordering::SeqCst);
    let _ = rebuild_handle.join();
    let _ = snapshot_handle.join();

    if let Err(e) = db.snapshot_now() {
        eprintln!("final snapshot failed: {e}");
    }
    println!("shut down cleanly");
}

fn background_rebuild_loop(db: &VectorDb, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::SeqCst) {
        db.rebuild_stale_indexes();
        sleep_in_ticks(shutdown, Duration::from_secs(30));
    }
}

fn background_snapshot_loop(db: &VectorDb, shutdown: &AtomicBool, interval: Duration) {
    while !shutdown.load(Ordering::SeqCst) {
        sleep_in_ticks(shutdown, interval);
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        if let Err(e) = db.snapshot_now() {
            tracing::warn!(%e, "periodic snapshot failed");
        }
    }
}

/// Sleeps in short ticks so a shutdown request is noticed promptly instead
/// of after a full interval.
fn sleep_in_ticks(shutdown: &AtomicBool, total: Duration) {
    let tick = Duration::from_millis(200);
    let mut waited = Duration::ZERO;
    while waited < total && !shutdown.load(Ordering::SeqCst) {
        thread::sleep(tick.min(total - waited));
        waited += tick;
    }
}
