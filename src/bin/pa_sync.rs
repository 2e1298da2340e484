use std::fs;
use std::path::Path;

use anyhow::Context;
use pa_reconcile::config::{ConfigOverrides, SyncConfig, CONFIG_PATH_ENV};
use pa_reconcile::utils::{export_to_json, export_to_text_summary};
use pa_reconcile::{Reconciler, Record};
use tracing_subscriber::EnvFilter;

fn parse_arg(flag: &str) -> Option<String> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next();
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|arg| arg == flag)
}

fn print_help() {
    eprintln!(
        r#"pa_sync - Reconcile a protected-area candidate batch against a snapshot

USAGE:
    pa_sync --candidates <FILE> [OPTIONS]

OPTIONS:
    -i, --candidates <FILE>  Candidate batch (JSON array of records)
    -s, --snapshot <FILE>    Persisted snapshot (JSON array of records) [default: empty]
    -o, --output <FILE>      Write the change set JSON here [default: stdout]
    -c, --config <FILE>      Path to config file (TOML)
        --sequential         Disable parallel hierarchy assignment
        --summary            Print a text summary to stderr
    -h, --help               Print help

ENVIRONMENT:
    PA_SYNC_CONFIG                       Path to config file
    PA_SYNC_PARALLEL                     true/false
    PA_SYNC_NUMERIC__RELATIVE_THRESHOLD  Relative tolerance for area/coverage
    RUST_LOG                             Log filter [default: info]
"#
    );
}

fn read_records(path: &Path) -> anyhow::Result<Vec<Record>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let records = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse records from {}", path.display()))?;
    Ok(records)
}

fn main() -> anyhow::Result<()> {
    if has_flag("-h") || has_flag("--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let candidates_path = parse_arg("--candidates")
        .or_else(|| parse_arg("-i"))
        .context("missing --candidates <FILE>")?;

    let mut overrides = ConfigOverrides::default();
    if has_flag("--sequential") {
        overrides.parallel = Some(false);
    }

    // Load config: CLI > Env > File > Defaults
    let config_path = parse_arg("--config")
        .or_else(|| parse_arg("-c"))
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok());
    let config = SyncConfig::load(config_path.as_deref(), overrides)?;

    let candidates = read_records(Path::new(&candidates_path))?;
    let snapshot = match parse_arg("--snapshot").or_else(|| parse_arg("-s")) {
        Some(path) => read_records(Path::new(&path))?,
        None => Vec::new(),
    };

    let reconciler = Reconciler::new(config);
    let change_set = reconciler.reconcile(candidates, &snapshot)?;

    if has_flag("--summary") {
        eprintln!(
            "{}",
            export_to_text_summary(&change_set, reconciler.key_builder())?
        );
    }

    let json = export_to_json(&change_set)?;
    match parse_arg("--output").or_else(|| parse_arg("-o")) {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("failed to write {}", path))?
        }
        None => println!("{}", json),
    }

    Ok(())
}
