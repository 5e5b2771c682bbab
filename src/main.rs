//! ferry - copy, move and browse files across local disk, FTP, SFTP, SMB,
//! archives and cloud drives.
//!
//! Usage:
//!   ferry ls <LOCATION>               List a directory
//!   ferry cp <SOURCE>... <DEST>       Copy into a directory
//!   ferry mv <SOURCE>... <DEST>       Move into a directory
//!   ferry rm <TARGET>...              Delete files or directories
//!   ferry mkdir <LOCATION>            Create a folder
//!   ferry rename <DIR> <OLD=NEW>...   Rename entries of one directory
//!   ferry extract <ARCHIVE> <DEST>    Unpack a whole archive
//!   ferry profiles list|add|remove    Manage saved connections

mod location;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use ferryfile_core::{FileEntry, Settings, SortColumn, SortSpec, TransferConfig, sort_entries};
use ferryfile_ops::{
    OverwriteDecision, QueueEvent, RenamePair, RequestId, Source, TransferOperation,
    TransferQueue, TransferRequest,
};
use ferryfile_vfs::{ArchiveProvider, ConnectionProfile, ProfileStore, Protocol, ProviderHandle};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::location::Location;

#[derive(Parser)]
#[command(
    name = "ferry",
    version,
    about = "Copy, move and browse files across storage backends",
    long_about = "ferry moves files between the local disk, FTP, SFTP and SMB servers, \
                  archives and Google Drive.\n\n\
                  Locations are local paths, ftp:// sftp:// smb:// URLs, \
                  `archive.zip!inner/path`, `gdrive:/path` or `@profile:/path`."
)]
struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// What to do when a destination already exists
    #[arg(long, value_enum, default_value = "ask", global = true)]
    on_conflict: ConflictPolicy,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a directory
    Ls {
        /// Directory to list
        #[arg(default_value = ".")]
        location: String,

        /// Sort column
        #[arg(short, long, value_enum, default_value = "name")]
        sort: SortArg,

        /// Reverse the sort order
        #[arg(short, long)]
        reverse: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Copy files or directories into a directory
    Cp {
        /// Items to copy (all on the same storage)
        #[arg(required = true, num_args = 1..)]
        sources: Vec<String>,

        /// Destination directory
        dest: String,
    },

    /// Move files or directories into a directory
    Mv {
        /// Items to move (all on the same storage)
        #[arg(required = true, num_args = 1..)]
        sources: Vec<String>,

        /// Destination directory
        dest: String,
    },

    /// Delete files or directories
    Rm {
        /// Items to delete (all on the same storage)
        #[arg(required = true)]
        targets: Vec<String>,
    },

    /// Create a folder
    Mkdir {
        /// Folder to create
        location: String,
    },

    /// Rename entries inside one directory
    Rename {
        /// Directory holding the entries
        dir: String,

        /// Renames as OLD=NEW
        #[arg(required = true)]
        pairs: Vec<String>,
    },

    /// Extract a whole archive
    Extract {
        /// Archive file
        archive: PathBuf,

        /// Destination directory
        dest: PathBuf,
    },

    /// Manage saved connections
    Profiles {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List saved connections
    List,

    /// Add or replace a connection
    Add {
        /// Profile name, used as @NAME in locations
        name: String,

        #[arg(value_enum)]
        protocol: ProtocolArg,

        /// Server host (ignored for gdrive)
        #[arg(default_value = "")]
        host: String,

        #[arg(long)]
        port: Option<u16>,

        #[arg(short, long)]
        user: Option<String>,

        #[arg(long)]
        password: Option<String>,

        /// SMB share
        #[arg(long)]
        share: Option<String>,

        /// SMB domain or workgroup
        #[arg(long)]
        domain: Option<String>,

        /// Directory to start in
        #[arg(long)]
        path: Option<String>,

        /// SSH private key
        #[arg(long)]
        key: Option<PathBuf>,

        /// Drive access token
        #[arg(long)]
        token: Option<String>,
    },

    /// Remove a connection
    Remove { name: String },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum ConflictPolicy {
    #[default]
    Ask,
    Overwrite,
    Skip,
    Cancel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    Name,
    Ext,
    Size,
    Date,
}

impl From<SortArg> for SortColumn {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortColumn::Name,
            SortArg::Ext => SortColumn::Extension,
            SortArg::Size => SortColumn::Size,
            SortArg::Date => SortColumn::Modified,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProtocolArg {
    Ftp,
    Sftp,
    Smb,
    Gdrive,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Ftp => Protocol::Ftp,
            ProtocolArg::Sftp => Protocol::Sftp,
            ProtocolArg::Smb => Protocol::Smb,
            ProtocolArg::Gdrive => Protocol::Drive,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::load();
    let profiles = ProfileStore::load().context("Cannot read saved connections")?;
    let policy = cli.on_conflict;

    match cli.command {
        Command::Ls {
            location,
            sort,
            reverse,
            format,
        } => run_ls(&location, &profiles, &settings.transfer, sort, reverse, format).await?,
        Command::Cp { sources, dest } => {
            run_transfer(&sources, &dest, false, &profiles, &settings.transfer, policy).await?
        }
        Command::Mv { sources, dest } => {
            run_transfer(&sources, &dest, true, &profiles, &settings.transfer, policy).await?
        }
        Command::Rm { targets } => run_delete(&targets, &profiles, &settings.transfer, policy).await?,
        Command::Mkdir { location } => {
            let location: Location = location.parse()?;
            let target = location.open(&profiles, settings.transfer.connect_timeout())?;
            let mut request = TransferRequest::new(TransferOperation::mkdir(location.resolved_path(&profiles)));
            request.target = target;
            submit(request, &settings.transfer, policy).await?;
        }
        Command::Rename { dir, pairs } => {
            run_rename(&dir, &pairs, &profiles, &settings.transfer, policy).await?
        }
        Command::Extract { archive, dest } => run_extract(archive, dest).await?,
        Command::Profiles { action } => run_profiles(action, profiles)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("ferryfile=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ferryfile=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// List a directory.
async fn run_ls(
    location: &str,
    profiles: &ProfileStore,
    config: &TransferConfig,
    sort: SortArg,
    reverse: bool,
    format: OutputFormat,
) -> Result<()> {
    let location: Location = location.parse()?;
    let provider = location
        .open(profiles, config.connect_timeout())?
        .unwrap_or_else(ProviderHandle::local);
    let path = location.resolved_path(profiles);

    let listed = path.clone();
    let mut entries = provider
        .run(move |p| p.list_directory(&listed))
        .await
        .wrap_err_with(|| format!("Cannot list {}", path))?;
    sort_entries(&mut entries, SortSpec::new(sort.into(), !reverse));
    provider.close();

    match format {
        OutputFormat::Text => {
            println!();
            println!(" {} - {} ({} entries)", provider.label(), path, entries.len());
            println!("{}", "─".repeat(70));
            for entry in &entries {
                print_entry(entry);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }

    Ok(())
}

fn print_entry(entry: &FileEntry) {
    let name = if entry.is_dir {
        format!("{}/", entry.name)
    } else {
        entry.name.to_string()
    };
    println!(
        " {:<10} {:>10}  {:<16}  {}",
        entry.permissions.as_deref().unwrap_or(""),
        entry.size_display(),
        entry.modified_display(),
        name
    );
}

/// Parse every location and make sure they all share one origin.
fn same_origin(items: &[String]) -> Result<Vec<Location>> {
    let locations = items
        .iter()
        .map(|s| s.parse::<Location>())
        .collect::<Result<Vec<_>>>()?;

    if let Some(first) = locations.first() {
        if let Some(other) = locations.iter().find(|l| l.origin() != first.origin()) {
            bail!(
                "All items must be on the same storage ({} vs {})",
                first.origin(),
                other.origin()
            );
        }
    }
    Ok(locations)
}

async fn run_transfer(
    sources: &[String],
    dest: &str,
    is_move: bool,
    profiles: &ProfileStore,
    config: &TransferConfig,
    policy: ConflictPolicy,
) -> Result<()> {
    let sources = same_origin(sources)?;
    let dest: Location = dest.parse()?;

    let source_handle = match sources.first() {
        Some(first) => first.open(profiles, config.connect_timeout())?,
        None => None,
    };
    // Two locations on the same storage share one connection.
    let target_handle = match (&source_handle, sources.first()) {
        (Some(handle), Some(first)) if first.origin() == dest.origin() => Some(handle.clone()),
        _ => dest.open(profiles, config.connect_timeout())?,
    };

    let items: Vec<Source> = sources
        .iter()
        .map(|l| Source::from(l.resolved_path(profiles)))
        .collect();
    let target = dest.resolved_path(profiles);
    let operation = if is_move {
        TransferOperation::move_to(items, target)
    } else {
        TransferOperation::copy(items, target)
    };

    let request = TransferRequest {
        operation,
        source: source_handle,
        target: target_handle,
    };
    submit(request, config, policy).await
}

async fn run_delete(
    targets: &[String],
    profiles: &ProfileStore,
    config: &TransferConfig,
    policy: ConflictPolicy,
) -> Result<()> {
    let targets = same_origin(targets)?;
    let source = match targets.first() {
        Some(first) => first.open(profiles, config.connect_timeout())?,
        None => None,
    };
    let items = targets
        .iter()
        .map(|l| Source::from(l.resolved_path(profiles)))
        .collect();

    let mut request = TransferRequest::new(TransferOperation::delete(items));
    request.source = source;
    submit(request, config, policy).await
}

async fn run_rename(
    dir: &str,
    pairs: &[String],
    profiles: &ProfileStore,
    config: &TransferConfig,
    policy: ConflictPolicy,
) -> Result<()> {
    let location: Location = dir.parse()?;
    let base = location.resolved_path(profiles);
    let is_local = matches!(location, Location::Local(_));

    let renames = pairs
        .iter()
        .map(|pair| {
            let (old, new) = pair
                .split_once('=')
                .ok_or_else(|| eyre!("Expected OLD=NEW, got '{}'", pair))?;
            let path = if is_local {
                PathBuf::from(&base).join(old).to_string_lossy().into_owned()
            } else {
                ferryfile_vfs::path::join(&base, old)
            };
            Ok(RenamePair::new(path, new))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut request = TransferRequest::new(TransferOperation::rename(renames));
    request.source = location.open(profiles, config.connect_timeout())?;
    submit(request, config, policy).await
}

/// Enqueue one request and follow it to the end.
async fn submit(request: TransferRequest, config: &TransferConfig, policy: ConflictPolicy) -> Result<()> {
    let providers: Vec<ProviderHandle> = request
        .source
        .iter()
        .chain(request.target.iter())
        .cloned()
        .collect();

    let queue = TransferQueue::new(config.clone());
    let mut events = queue.subscribe();
    let id = queue.enqueue(request)?;
    debug!(%id, "request submitted");

    let result = follow(&queue, id, &mut events, policy).await;
    for provider in providers {
        provider.close();
    }

    let message = result?;
    eprintln!();
    println!("{}", message);
    Ok(())
}

async fn follow(
    queue: &TransferQueue,
    id: RequestId,
    events: &mut tokio::sync::broadcast::Receiver<QueueEvent>,
    policy: ConflictPolicy,
) -> Result<String> {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(e) => return Err(eyre!("Queue stopped: {}", e)),
        };

        match event {
            QueueEvent::Progress {
                id: got,
                percent,
                current_item,
            } if got == id => {
                eprint!("\r[{:>3}%] {:<60}", percent, truncate(&current_item, 60));
            }
            QueueEvent::Conflict {
                id: got,
                source,
                target,
            } if got == id => {
                let decision = decide(policy, &source, &target).await?;
                queue.resolve_conflict(id, decision);
            }
            QueueEvent::Finished {
                id: got,
                success,
                message,
            } if got == id => {
                if success {
                    return Ok(message);
                }
                eprintln!();
                bail!(message);
            }
            _ => {}
        }
    }
}

async fn decide(policy: ConflictPolicy, source: &FileEntry, target: &FileEntry) -> Result<OverwriteDecision> {
    match policy {
        ConflictPolicy::Overwrite => Ok(OverwriteDecision::Overwrite),
        ConflictPolicy::Skip => Ok(OverwriteDecision::Skip),
        ConflictPolicy::Cancel => Ok(OverwriteDecision::Cancel),
        ConflictPolicy::Ask => {
            let prompt = format!(
                "\n'{}' already exists ({}, {}); incoming is {}, {}.\nOverwrite, skip or cancel? [o/s/c] ",
                target.name,
                target.size_display(),
                target.modified_display(),
                source.size_display(),
                source.modified_display()
            );
            tokio::task::spawn_blocking(move || ask(&prompt))
                .await
                .context("Prompt task failed")?
        }
    }
}

fn ask(prompt: &str) -> Result<OverwriteDecision> {
    let stdin = std::io::stdin();
    loop {
        eprint!("{}", prompt);
        std::io::stderr().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(OverwriteDecision::Cancel);
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "o" | "overwrite" | "y" | "yes" => return Ok(OverwriteDecision::Overwrite),
            "s" | "skip" | "n" | "no" => return Ok(OverwriteDecision::Skip),
            "c" | "cancel" => return Ok(OverwriteDecision::Cancel),
            _ => continue,
        }
    }
}

/// Extract an entire archive into a local directory.
async fn run_extract(archive: PathBuf, dest: PathBuf) -> Result<()> {
    let provider = ProviderHandle::new(
        ArchiveProvider::open(&archive)
            .wrap_err_with(|| format!("Cannot open archive {}", archive.display()))?,
    );

    eprintln!("Extracting {}...", archive.display());
    let target = dest.clone();
    let count = provider
        .run(move |p| {
            let top = p.list_directory("")?;
            p.fetch_all(&target)?;
            Ok(top.len())
        })
        .await
        .context("Extraction failed")?;

    println!("Extracted {} top-level entries to {}", count, dest.display());
    Ok(())
}

fn run_profiles(action: ProfileAction, mut profiles: ProfileStore) -> Result<()> {
    match action {
        ProfileAction::List => {
            if profiles.profiles().is_empty() {
                println!(" No saved connections.");
            }
            for profile in profiles.profiles() {
                println!(
                    " @{:<16} {:<6} {}{}",
                    profile.name,
                    format!("{:?}", profile.protocol).to_lowercase(),
                    profile
                        .username
                        .as_deref()
                        .map(|u| format!("{}@", u))
                        .unwrap_or_default(),
                    profile.host
                );
            }
        }
        ProfileAction::Add {
            name,
            protocol,
            host,
            port,
            user,
            password,
            share,
            domain,
            path,
            key,
            token,
        } => {
            let protocol = Protocol::from(protocol);
            if host.is_empty() && protocol != Protocol::Drive {
                bail!("A host is required for {:?} connections", protocol);
            }
            let profile = ConnectionProfile {
                port,
                username: user,
                password,
                share,
                domain,
                initial_path: path,
                key_path: key,
                token,
                ..ConnectionProfile::new(name.clone(), protocol, host)
            };
            profiles.add_or_replace(profile);
            profiles.save().context("Cannot save connections")?;
            println!("Saved @{}", name);
        }
        ProfileAction::Remove { name } => {
            if !profiles.remove(&name) {
                bail!("No connection named '{}'", name);
            }
            profiles.save().context("Cannot save connections")?;
            println!("Removed @{}", name);
        }
    }
    Ok(())
}

/// Truncate a string to max length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
