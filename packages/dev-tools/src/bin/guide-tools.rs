//! Guide snapshot tools
//!
//! Maintenance commands over a guide stored as a JSON snapshot:
//!
//! - `check`   - report cache drift and circular crosslinks, fails if any are found
//! - `rebuild` - recompute every children cache and save the snapshot
//! - `export`  - rebuild, then write the release document
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin guide-tools -- check guide.json
//! cargo run --bin guide-tools -- rebuild guide.json --config guide-config.json
//! cargo run --bin guide-tools -- export guide.json --out release.json
//! ```
//!
//! Without `--config` the guide id and name are taken from the snapshot and all
//! other settings use their defaults. Log verbosity follows `RUST_LOG`, default
//! `info`.

use anyhow::{bail, Context};
use naturekey_core::db::{GuideState, GuideStore, JsonFileStore};
use naturekey_core::{
    drifted_parents, CrosslinkManager, GuideConfig, NatureGuideService, StaticTaxonomySource,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: guide-tools <check|rebuild|export> <snapshot.json> [--config FILE] [--out FILE]";

enum Command {
    Check,
    Rebuild,
    Export,
}

struct Args {
    command: Command,
    snapshot: PathBuf,
    config: Option<PathBuf>,
    out: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut raw = std::env::args().skip(1);

    let command = match raw.next().as_deref() {
        Some("check") => Command::Check,
        Some("rebuild") => Command::Rebuild,
        Some("export") => Command::Export,
        _ => bail!(USAGE),
    };
    let snapshot = raw.next().map(PathBuf::from).context(USAGE)?;

    let mut config = None;
    let mut out = None;
    while let Some(flag) = raw.next() {
        let value = raw.next().map(PathBuf::from);
        match flag.as_str() {
            "--config" => config = Some(value.context("--config needs a file")?),
            "--out" => out = Some(value.context("--out needs a file")?),
            other => bail!("unknown option {}\n{}", other, USAGE),
        }
    }

    Ok(Args {
        command,
        snapshot,
        config,
        out,
    })
}

async fn load_snapshot(store: &JsonFileStore) -> anyhow::Result<GuideState> {
    store
        .load()
        .await?
        .with_context(|| format!("no guide snapshot at {}", store.path().display()))
}

fn load_config(args: &Args, state: &GuideState) -> anyhow::Result<GuideConfig> {
    match &args.config {
        Some(path) => GuideConfig::from_json_file(path).map_err(anyhow::Error::msg),
        None => Ok(GuideConfig::new(state.guide_id, state.guide_name.clone())),
    }
}

fn check(state: &GuideState) -> anyhow::Result<()> {
    let drifted = drifted_parents(state);
    let circular = CrosslinkManager::check_circularity(&state.crosslink_pairs());

    println!(
        "guide {} \"{}\": {} nodes, {} crosslinks, {} matrix filters",
        state.guide_id,
        state.guide_name,
        state.nodes.len(),
        state.crosslinks.len(),
        state.matrix_filters.len()
    );

    if drifted.is_empty() && !circular {
        println!("ok");
        return Ok(());
    }
    if !drifted.is_empty() {
        println!("drifted caches: {:?}", drifted);
    }
    if circular {
        println!("crosslinks form a circle");
    }
    bail!("guide check failed")
}

async fn open_service(args: &Args, store: Arc<JsonFileStore>) -> anyhow::Result<NatureGuideService> {
    let state = load_snapshot(&store).await?;
    let config = load_config(args, &state)?;
    let service =
        NatureGuideService::open(config, store, Arc::new(StaticTaxonomySource::new())).await?;
    Ok(service)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args()?;
    let store = Arc::new(JsonFileStore::new(&args.snapshot));

    match args.command {
        Command::Check => {
            let state = load_snapshot(&store).await?;
            check(&state)?;
        }
        Command::Rebuild => {
            let service = open_service(&args, store).await?;
            let drifted = service.rebuild_all_children_caches().await?;
            println!("rebuilt children caches, {} drifted: {:?}", drifted.len(), drifted);
        }
        Command::Export => {
            let service = open_service(&args, store).await?;
            let release = service.build_release().await?;
            let rendered = serde_json::to_string_pretty(&release)?;
            match &args.out {
                Some(path) => {
                    tokio::fs::write(path, rendered)
                        .await
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    tracing::info!(
                        path = %path.display(),
                        exported_at = %chrono::Utc::now().to_rfc3339(),
                        "Wrote release document"
                    );
                }
                None => println!("{}", rendered),
            }
        }
    }

    Ok(())
}
