use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloud_autosave::{
    DirectoryStorage, Operation, Orchestrator, SaveConfig, SaveResult, SlotHandle,
    SlotSelection, SystemClock,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = "savectl.toml";

#[derive(Parser)]
#[command(author, version, about = "Inspect and edit saved games on disk")]
struct Cli {
    /// Directory holding the saved slots.
    #[arg(long, default_value = "saves")]
    root: PathBuf,
    /// Configuration file; defaults to `savectl.toml` inside the root.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the record restored from the automatic slot.
    Show {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Change record fields, then autosave.
    Edit {
        #[arg(long)]
        value: Option<String>,
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        counter: Option<String>,
    },
    /// Save the record to a manual slot.
    Save {
        #[arg(long)]
        slot: Option<String>,
    },
    /// Load a slot, or the automatic slot when none is named.
    Load {
        #[arg(long)]
        slot: Option<String>,
    },
    /// List slots, most recent first.
    List {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Delete a slot with its backup and cover image.
    Delete { slot: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let stdout = io::stdout();
    run(cli, &mut stdout.lock())
}

fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.root.join(CONFIG_FILE));
    let config = SaveConfig::load_or_default(&config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;

    match cli.command {
        Command::List { json } => list_slots(&cli.root, json, out),
        Command::Delete { slot } => {
            let storage = DirectoryStorage::new(cli.root.clone());
            if find_slot(&storage, &slot)?.is_none() {
                anyhow::bail!("no slot named '{slot}'");
            }
            storage
                .remove_slot(&slot)
                .with_context(|| format!("delete slot '{slot}'"))?;
            writeln!(out, "deleted {slot}")?;
            Ok(())
        }
        Command::Show { json } => {
            let orchestrator = signed_in(&cli.root, config)?;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(orchestrator.record())?)?;
            } else {
                let record = orchestrator.record();
                writeln!(out, "numeric value: {}", record.numeric_value)?;
                writeln!(out, "message: {}", record.message)?;
                writeln!(out, "counter: {}", record.counter)?;
                writeln!(out, "{}", orchestrator.display_line())?;
            }
            Ok(())
        }
        Command::Edit {
            value,
            message,
            counter,
        } => {
            let mut orchestrator = signed_in(&cli.root, config)?;
            if let Some(text) = value {
                orchestrator.edit_numeric_text(&text)?;
            }
            if let Some(text) = message {
                orchestrator.edit_message_text(&text);
            }
            if let Some(text) = counter {
                orchestrator.edit_counter_text(&text)?;
            }
            if !orchestrator.timer().is_dirty() {
                writeln!(out, "nothing to save")?;
                return Ok(());
            }
            drive(&mut orchestrator, |o| o.save_automatic())?;
            writeln!(out, "{}", orchestrator.display_line())?;
            Ok(())
        }
        Command::Save { slot } => {
            let mut orchestrator = signed_in(&cli.root, config)?;
            let selection = match slot {
                Some(name) => match find_slot(orchestrator.storage(), &name)? {
                    Some(handle) => SlotSelection::Existing(handle),
                    None => SlotSelection::Create { name: Some(name) },
                },
                None => SlotSelection::Create { name: None },
            };
            orchestrator.storage_mut().queue_selection(Ok(selection));
            drive(&mut orchestrator, |o| o.save_manual())?;
            writeln!(out, "{}", orchestrator.display_line())?;
            Ok(())
        }
        Command::Load { slot } => {
            let mut orchestrator = signed_in(&cli.root, config)?;
            if let Some(name) = slot {
                let handle = find_slot(orchestrator.storage(), &name)?
                    .with_context(|| format!("no slot named '{name}'"))?;
                orchestrator
                    .storage_mut()
                    .queue_selection(Ok(SlotSelection::Existing(handle)));
                drive(&mut orchestrator, |o| o.load_manual())?;
            }
            writeln!(out, "{}", orchestrator.display_line())?;
            Ok(())
        }
    }
}

/// Signs in, which also restores the automatic slot. A failed autoload is
/// reported but does not stop the command.
fn signed_in(root: &Path, config: SaveConfig) -> Result<Orchestrator<DirectoryStorage>> {
    let storage = DirectoryStorage::new(root.to_path_buf());
    storage
        .ensure_layout()
        .with_context(|| format!("prepare {}", root.display()))?;
    let mut orchestrator = Orchestrator::new(storage, config, SystemClock);
    orchestrator.sign_in()?;
    for completion in orchestrator.pump() {
        if let Err(err) = completion.result {
            if completion.operation == Operation::SignIn {
                return Err(err).context("sign in");
            }
            warn!(operation = ?completion.operation, %err, "startup request failed");
        }
    }
    Ok(orchestrator)
}

fn drive(
    orchestrator: &mut Orchestrator<DirectoryStorage>,
    start: impl FnOnce(&mut Orchestrator<DirectoryStorage>) -> SaveResult<()>,
) -> Result<()> {
    start(orchestrator)?;
    for completion in orchestrator.pump() {
        if let Err(err) = completion.result {
            return Err(err).context(format!("{:?} failed", completion.operation));
        }
    }
    Ok(())
}

fn find_slot(storage: &DirectoryStorage, name: &str) -> Result<Option<SlotHandle>> {
    let slots = storage.list_slots().context("list slots")?;
    Ok(slots.into_iter().find(|slot| slot.name == name))
}

fn list_slots(root: &Path, json: bool, out: &mut impl Write) -> Result<()> {
    let storage = DirectoryStorage::new(root.to_path_buf());
    let slots = storage.list_slots().context("list slots")?;
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&slots)?)?;
        return Ok(());
    }
    for slot in &slots {
        let modified = slot
            .last_modified
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{:<24} {:>8}s  {}  {}",
            slot.name,
            slot.played_time.as_secs(),
            modified,
            slot.description
        )?;
    }
    Ok(())
}
