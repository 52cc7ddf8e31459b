//! # daybook
//!
//! Command-line front end for the guest journal: lists days, shows an entry
//! and adds or removes its images and audio. Runs the same engine a client
//! app would, attached to the on-device guest store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use daybook_remote::{ImageLoad, MemoryBackend};
use daybook_shared::{DateKey, Identity, JournalEntry, JournalImage};
use daybook_store::{Database, GuestStore};
use daybook_sync::{spawn_engine, EngineConfig, EngineDeps, JournalHandle, LogNotifier};

/// Daybook - one photo journal entry per day.
#[derive(Parser, Debug)]
#[command(name = "daybook", version, about, long_about = None)]
struct Cli {
    /// Directory holding the guest database and blobs.
    #[arg(long, env = "DAYBOOK_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every day that has an entry.
    List,
    /// Show one day's images and audio.
    Show { date: DateKey },
    /// Add an image file to a day.
    AddImage { date: DateKey, file: PathBuf },
    /// Remove an image (by the reference shown in `show`).
    DeleteImage { date: DateKey, reference: String },
    /// Set (or replace) a day's audio.
    SetAudio { date: DateKey, file: PathBuf },
    /// Remove a day's audio.
    DeleteAudio { date: DateKey },
    /// Set the guest profile picture.
    SetProfileImage { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,daybook=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => Database::default_data_dir()?,
    };
    info!(path = %data_dir.display(), "Opening guest store");
    let guest = GuestStore::open_at(&data_dir)
        .with_context(|| format!("failed to open guest store at {}", data_dir.display()))?;

    let deps = EngineDeps::with_backend(MemoryBackend::new(), guest, Arc::new(LogNotifier));
    let journal = spawn_engine(deps, EngineConfig::from_env());
    journal.attach(Identity::Guest).await?;

    let outcome = run(&journal, cli.command).await;
    journal.shutdown().await;
    outcome
}

async fn run(journal: &JournalHandle, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::List => {
            let mut entries = journal.entries();
            entries.sort_by_key(|entry| entry.date);
            if entries.is_empty() {
                println!("no entries");
            }
            for entry in &entries {
                println!("{}", summary(entry));
            }
        }
        Commands::Show { date } => {
            let Some(entry) = journal.entry(date) else {
                bail!("no entry for {date}");
            };
            println!("{}", summary(&entry));
            for reference in &entry.images {
                let status = match journal.load_image(reference).await {
                    ImageLoad::Loaded(bytes) => format!("{} bytes", bytes.len()),
                    ImageLoad::Failed => "failed to load image".to_string(),
                    ImageLoad::Unavailable => "unavailable".to_string(),
                };
                println!("  image {reference} ({status})");
            }
            if let Some(audio) = &entry.audio_url {
                println!("  audio {audio}");
            }
        }
        Commands::AddImage { date, file } => {
            let data = read(&file).await?;
            let image = journal.add_image(date, data).await?;
            println!("{}", image.url.unwrap_or_else(|| image.id.to_string()));
        }
        Commands::DeleteImage { date, reference } => {
            let known = journal
                .entry(date)
                .is_some_and(|entry| entry.images.contains(&reference));
            if !known {
                bail!("{date} has no image {reference}");
            }
            journal
                .delete_image(date, JournalImage::confirmed(reference))
                .await?;
        }
        Commands::SetAudio { date, file } => {
            let data = read(&file).await?;
            journal.set_audio(date, data).await?;
            if let Some(audio) = journal.entry(date).and_then(|entry| entry.audio_url) {
                println!("{audio}");
            }
        }
        Commands::DeleteAudio { date } => {
            journal.delete_audio(date).await?;
        }
        Commands::SetProfileImage { file } => {
            let data = read(&file).await?;
            println!("{}", journal.set_guest_profile_image(data).await?);
        }
    }
    Ok(())
}

async fn read(file: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))
}

fn summary(entry: &JournalEntry) -> String {
    let mark = if entry.is_completed() { "*" } else { " " };
    let audio = if entry.audio_url.is_some() { "yes" } else { "no" };
    format!(
        "{mark} {}  images={}  audio={audio}",
        entry.date,
        entry.images.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_dates() {
        let cli = Cli::try_parse_from(["daybook", "show", "2024-03-01"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Show { date } if date == DateKey::new(2024, 3, 1)
        ));
        assert!(Cli::try_parse_from(["daybook", "show", "2024-13-01"]).is_err());
    }

    #[test]
    fn summary_marks_completed_days() {
        let mut entry = JournalEntry::new(DateKey::new(2024, 3, 1));
        entry.images.push("a".into());
        assert_eq!(summary(&entry), "  2024-03-01  images=1  audio=no");
        entry.audio_url = Some("b".into());
        assert_eq!(summary(&entry), "* 2024-03-01  images=1  audio=yes");
    }
}
