use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use glob::Pattern;
use tools::{
    format_inspect_pretty, format_replay_pretty, inspect_message, replay_snapshots,
    CaptureSchema,
};

#[derive(Parser)]
#[command(
    name = "ghostline-tools",
    version,
    about = "ghostline capture inspection and replay"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect message framing and per-ghost record sizes.
    Inspect {
        /// A message file, or a capture directory.
        path: PathBuf,
        /// Capture manifest (collection.json) for ghost and command decoding.
        #[arg(long)]
        collection: Option<PathBuf>,
        /// Glob filter when inspecting a directory.
        #[arg(long)]
        glob: Option<String>,
        /// Sort inspected messages.
        #[arg(long, value_enum)]
        sort: Option<InspectSort>,
        /// Limit the number of inspected messages (after sorting).
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },
    /// Replay captured snapshots, in name order, through a fresh client.
    Replay {
        /// Capture directory.
        dir: PathBuf,
        /// Capture manifest; defaults to collection.json inside the directory.
        #[arg(long)]
        collection: Option<PathBuf>,
        #[arg(long, default_value = "snapshot_*.bin")]
        glob: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InspectSort {
    Size,
    Name,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match cli.command {
        Command::Inspect {
            path,
            collection,
            glob,
            sort,
            limit,
            format,
        } => {
            let manifest = collection
                .as_deref()
                .map(load_manifest)
                .transpose()
                .context("load collection")?;
            let ghosts = manifest
                .as_ref()
                .map(CaptureSchema::collection)
                .transpose()
                .map_err(|err| anyhow::anyhow!("invalid collection: {err}"))?;
            let command = manifest.as_ref().and_then(|manifest| manifest.command.as_ref());

            let entries = if path.is_dir() {
                let entries = collect_entries(&path, glob.as_deref())?;
                let mut entries = sort_entries(entries, sort);
                let limit = limit.or(sort.and_then(|sort| match sort {
                    InspectSort::Size => Some(10),
                    InspectSort::Name => None,
                }));
                if let Some(limit) = limit {
                    entries.truncate(limit);
                }
                entries
            } else {
                let size = fs::metadata(&path)
                    .with_context(|| format!("stat {}", path.display()))?
                    .len();
                vec![Entry { path, size }]
            };

            for entry in entries {
                let bytes = fs::read(&entry.path)
                    .with_context(|| format!("read message {}", entry.path.display()))?;
                let report =
                    inspect_message(&bytes, ghosts.as_ref(), command, &wire::Limits::default())
                        .with_context(|| format!("inspect {}", entry.path.display()))?;
                match format {
                    OutputFormat::Json => {
                        let json = serde_json::to_string_pretty(&report).context("serialize json")?;
                        println!("{json}");
                    }
                    OutputFormat::Pretty => {
                        println!("== {} ==", entry.path.display());
                        println!("{}", format_inspect_pretty(&report));
                    }
                }
            }
        }
        Command::Replay {
            dir,
            collection,
            glob,
            format,
        } => {
            let manifest_path = collection.unwrap_or_else(|| dir.join("collection.json"));
            let manifest = load_manifest(&manifest_path).context("load collection")?;
            let ghosts = manifest
                .collection()
                .map_err(|err| anyhow::anyhow!("invalid collection: {err}"))?;
            let entries = sort_entries(collect_entries(&dir, Some(&glob))?, Some(InspectSort::Name));
            let mut packets = Vec::with_capacity(entries.len());
            for entry in entries {
                let bytes = fs::read(&entry.path)
                    .with_context(|| format!("read message {}", entry.path.display()))?;
                packets.push((entry.path.display().to_string(), bytes));
            }
            log::info!("replaying {} snapshots from {}", packets.len(), dir.display());
            let report = replay_snapshots(Arc::new(ghosts), packets);
            match format {
                OutputFormat::Json => {
                    let json = serde_json::to_string_pretty(&report).context("serialize json")?;
                    println!("{json}");
                }
                OutputFormat::Pretty => println!("{}", format_replay_pretty(&report)),
            }
        }
    }
    Ok(())
}

fn load_manifest(path: &Path) -> Result<CaptureSchema> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).context("parse collection json")
}

struct Entry {
    path: PathBuf,
    size: u64,
}

fn collect_entries(dir: &Path, glob: Option<&str>) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    let pattern = match glob {
        Some(value) => Some(Pattern::new(value).context("invalid glob pattern")?),
        None => None,
    };

    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || path.extension().is_some_and(|ext| ext == "json") {
            continue;
        }
        if let Some(pattern) = &pattern {
            let matches_path = pattern.matches_path(&path);
            let matches_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.matches(name));
            if !matches_path && !matches_name {
                continue;
            }
        }
        let size = entry.metadata()?.len();
        entries.push(Entry { path, size });
    }
    Ok(entries)
}

fn sort_entries(mut entries: Vec<Entry>, sort: Option<InspectSort>) -> Vec<Entry> {
    match sort {
        Some(InspectSort::Size) => {
            entries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
        }
        Some(InspectSort::Name) => entries.sort_by(|a, b| a.path.cmp(&b.path)),
        None => {}
    }
    entries
}
