/*!
Worldsave CLI - inspect and manage a directory of world saves.
*/

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tabled::{Table, Tabled};
use tracing::{debug, error, info, warn};
use worldsave_core::model::{ResourceCounters, ResourceKind};
use worldsave_core::{
    DirectoryStore, GzipCompressor, SaveConfig, SaveError, Snapshot, SnapshotCodec,
    SnapshotSummary, StorageAdapter,
};

#[derive(Parser)]
#[command(name = "worldsave")]
#[command(about = "Inspect and manage world save files")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Save directory
    #[arg(short, long, global = true, env = "WORLDSAVE_DIR")]
    dir: Option<PathBuf>,

    /// Save file extension
    #[arg(short, long, global = true)]
    extension: Option<String>,

    /// JSON save config; --dir and --extension override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List saves, most recently modified first
    List,
    /// Show details of a save
    Show {
        /// Save name, without extension
        name: String,
    },
    /// Decode a save and check its content hash
    Verify {
        /// Save name, without extension
        name: String,
    },
    /// Delete a save
    Delete {
        /// Save name, without extension
        name: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Tabled)]
struct SaveRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Play time")]
    play_time: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Size")]
    size: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let store = DirectoryStore::new(&config.save_dir, config.extension.clone());
    debug!(dir = %store.dir().display(), extension = store.extension(), "Using save directory");

    match cli.command {
        Commands::List => list_saves(&store),
        Commands::Show { name } => show_save(&store, &name),
        Commands::Verify { name } => verify_save(&store, &name),
        Commands::Delete { name, force } => delete_save(&store, &name, force),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<SaveConfig, anyhow::Error> {
    let mut config = match &cli.config {
        Some(path) => SaveConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SaveConfig::default(),
    };
    if let Some(dir) = &cli.dir {
        config.save_dir = dir.clone();
    }
    if let Some(extension) = &cli.extension {
        config.extension = extension.clone();
    }
    Ok(config)
}

/// Saves may have been written with or without compression.
fn codecs() -> [SnapshotCodec; 2] {
    [
        SnapshotCodec::new(),
        SnapshotCodec::with_compressor(GzipCompressor::new()),
    ]
}

fn decode_any<T>(
    bytes: &[u8],
    decode: impl Fn(&SnapshotCodec, &[u8]) -> Result<T, SaveError>,
) -> Result<T, SaveError> {
    let mut last_error = SaveError::corrupt("no codec accepted the file");
    for codec in codecs() {
        match decode(&codec, bytes) {
            Ok(value) => return Ok(value),
            // Only a stage or parse failure means "try the next codec".
            Err(SaveError::CorruptSnapshot(reason)) => {
                debug!(codec = codec.compression_name(), %reason, "Codec rejected file");
                last_error = SaveError::CorruptSnapshot(reason);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_error)
}

fn read_summary(store: &DirectoryStore, name: &str) -> Result<SnapshotSummary, SaveError> {
    let bytes = store.read(name)?;
    decode_any(&bytes, |codec, bytes| codec.decode_header(bytes))
}

fn read_snapshot(store: &DirectoryStore, name: &str) -> Result<Snapshot, SaveError> {
    let bytes = store.read(name)?;
    decode_any(&bytes, |codec, bytes| codec.decode(bytes))
}

fn list_saves(store: &DirectoryStore) -> Result<(), anyhow::Error> {
    info!("Listing saves in {}", store.dir().display());

    let mut entries = Vec::new();
    for name in store.list()? {
        let stat = match store.stat(&name) {
            Ok(stat) => stat,
            Err(e) => {
                warn!("Failed to stat {}: {}", name, e);
                continue;
            }
        };
        match read_summary(store, &name) {
            Ok(summary) => entries.push((stat.modified, SaveRow {
                name,
                kind: summary.metadata.kind.as_str().to_string(),
                version: summary.metadata.version,
                play_time: format_play_time(summary.metadata.play_time_seconds),
                created: format_timestamp(summary.metadata.created_at.timestamp()),
                size: format_size(stat.size_bytes),
            })),
            Err(e) => warn!("Failed to read metadata for {}: {}", name, e),
        }
    }

    if entries.is_empty() {
        println!("No saves found in {}", store.dir().display());
    } else {
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        let table = Table::new(entries.into_iter().map(|(_, row)| row));
        println!("{table}");
    }

    Ok(())
}

fn show_save(store: &DirectoryStore, name: &str) -> Result<(), anyhow::Error> {
    info!("Showing save: {}", name);

    let summary = read_summary(store, name).with_context(|| format!("Failed to read '{name}'"))?;
    let snapshot = read_snapshot(store, name).with_context(|| format!("Failed to decode '{name}'"))?;
    let stat = store.stat(name)?;
    let metadata = &snapshot.metadata;

    println!("Save Details:");
    println!("  Name: {name}");
    println!("  Kind: {}", metadata.kind.as_str());
    println!("  Version: {}", metadata.version);
    println!("  Created: {}", format_timestamp(metadata.created_at.timestamp()));
    println!("  Play time: {}", format_play_time(metadata.play_time_seconds));
    println!("  Snapshot ID: {}", metadata.snapshot_id);
    println!("  Format Version: {}", summary.header.format_version);
    println!("  Compression: {}", summary.header.compression);
    println!("  Content Hash: {}", summary.header.content_hash);
    println!("  Size: {}", format_size(stat.size_bytes));
    println!();
    println!("World:");
    println!("  State: {:?}{}", snapshot.world.game_state, if snapshot.world.paused { " (paused)" } else { "" });
    println!("  Day {} at {:.1}h", snapshot.clock.day, snapshot.clock.time_of_day);
    println!("  Resources: {}", format_resources(&snapshot.economy));
    println!("  Buildings: {}", snapshot.buildings.len());
    println!("  Units: {}", snapshot.units.len());
    if let Some(population) = &snapshot.population {
        println!("  Population: {}/{}", population.current, population.capacity);
    }
    if let Some(reputation) = &snapshot.reputation {
        println!("  Reputation: {} ({:.0})", reputation.title, reputation.score);
    }

    Ok(())
}

fn verify_save(store: &DirectoryStore, name: &str) -> Result<(), anyhow::Error> {
    info!("Verifying save: {}", name);

    match read_snapshot(store, name) {
        Ok(snapshot) => {
            println!(
                "✓ Save '{name}' is valid ({} entities, integrity check passed)",
                snapshot.entity_count()
            );
            Ok(())
        }
        Err(SaveError::IntegrityCheckFailed { expected, actual }) => {
            error!("✗ Integrity check failed:");
            error!("  Expected hash: {}", expected);
            error!("  Actual hash: {}", actual);
            Err(anyhow!("Integrity check failed for '{name}'"))
        }
        Err(e) => {
            error!("✗ Failed to verify save: {}", e);
            Err(e.into())
        }
    }
}

fn delete_save(store: &DirectoryStore, name: &str, force: bool) -> Result<(), anyhow::Error> {
    if !store.exists(name) {
        return Err(anyhow!("Save '{name}' not found in {}", store.dir().display()));
    }

    if !force {
        print!("Are you sure you want to delete save '{name}'? (y/N): ");
        use std::io::{self, Write};
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().to_lowercase().starts_with('y') {
            println!("Deletion cancelled");
            return Ok(());
        }
    }

    store.delete(name)?;
    println!("✓ Save deleted successfully");
    Ok(())
}

fn format_resources(counters: &ResourceCounters) -> String {
    ResourceKind::ALL
        .iter()
        .map(|kind| format!("{} {}", kind.as_str(), counters.get(*kind)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_play_time(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{Local, TimeZone};

    match Local.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => timestamp.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_resources() {
        let counters = ResourceCounters {
            wood: 120,
            stone: 4,
            gold: 0,
            food: -3,
        };
        assert_eq!(
            format_resources(&counters),
            "wood 120, stone 4, gold 0, food -3"
        );
    }

    #[test]
    fn test_format_play_time() {
        assert_eq!(format_play_time(0.0), "0:00:00");
        assert_eq!(format_play_time(3725.9), "1:02:05");
        assert_eq!(format_play_time(-4.0), "0:00:00");
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::parse_from(["worldsave", "delete", "campaign", "--force", "--dir", "/tmp/saves"]);
        assert_eq!(cli.dir, Some(PathBuf::from("/tmp/saves")));
        match cli.command {
            Commands::Delete { name, force } => {
                assert_eq!(name, "campaign");
                assert!(force);
            }
            _ => panic!("expected delete"),
        }
    }
}
