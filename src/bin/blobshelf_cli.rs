//! Blobshelf CLI - Azure Blob Storage document client
//!
//! Usage:
//!   blobshelf-cli init                          Probe the container, create it if missing
//!   blobshelf-cli put <file> [--path P]         Upload a file
//!   blobshelf-cli get <name> [-o out]           Download an object
//!   blobshelf-cli rm <name>                     Delete an object
//!   blobshelf-cli ls [--prefix P]               List objects
//!   blobshelf-cli tree [--expand PATH]... [--all]  Show the folder tree
//!   blobshelf-cli configure [--container C]     Persist settings

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::Level;

use blobshelf::config::{self, StorageConfig};
use blobshelf::namespace::NamespaceProjection;
use blobshelf::providers::{AzureBlobGateway, ContainerStatus, ObjectRecord, ObjectStore};
use blobshelf::retry::{with_retry, RetryPolicy};
use blobshelf::tree_view::{FolderLoader, LazyTreeController, StoreFolderLoader, TreeRow};

#[derive(Parser)]
#[command(
    name = "blobshelf-cli",
    about = "Blobshelf CLI - Azure Blob Storage document client",
    version,
    long_about = "Reads AZURE_STORAGE_CONNECTION_STRING from the environment or a .env file.\nObject names may contain '/' and are shown as folders."
)]
struct Cli {
    /// Read variables from this .env file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// Retries for transient failures
    #[arg(long, global = true, default_value_t = 3)]
    retries: u32,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or update persisted settings
    Configure {
        #[arg(long)]
        container: Option<String>,
        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// blob, container or none
        #[arg(long)]
        public_access: Option<String>,
    },
    #[command(flatten)]
    Storage(StorageCommand),
}

/// Commands that talk to the storage account
#[derive(Subcommand, Clone)]
enum StorageCommand {
    /// Probe the container and create it when missing
    Init,
    /// Upload a local file
    Put {
        /// Local file path
        file: PathBuf,
        /// Remote folder to upload into
        #[arg(long)]
        path: Option<String>,
        /// Object name (default: local file name)
        #[arg(long)]
        name: Option<String>,
        /// Content type (default: guessed from the extension)
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Download an object
    Get {
        /// Object name
        name: String,
        /// Local destination (default: last segment of the name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete an object
    Rm {
        /// Object name
        name: String,
    },
    /// List objects
    Ls {
        /// Only names starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Show the folder tree
    Tree {
        /// Expand this folder (and its ancestors); repeatable
        #[arg(long)]
        expand: Vec<String>,
        /// Load the whole namespace once and expand every folder
        #[arg(long)]
        all: bool,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Format bytes as a short human-readable size
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

/// Object name for an upload: explicit name or the file name, under an optional folder
fn target_name(file: &Path, folder: Option<&str>, name: Option<&str>) -> Result<String> {
    let base = match name {
        Some(n) => n.trim_matches('/').to_string(),
        None => file.file_name()
            .and_then(|n| n.to_str())
            .context("Local file has no usable name, pass --name")?
            .to_string(),
    };
    Ok(match folder.map(|f| f.trim_matches('/')).filter(|f| !f.is_empty()) {
        Some(folder) => format!("{}/{}", folder, base),
        None => base,
    })
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_records(records: &[ObjectRecord]) {
    for record in records {
        let modified = record.last_modified
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:>10}  {:<16}  {}", format_size(record.size_bytes), modified, record.name);
    }
    println!("{} object(s)", records.len());
}

fn print_tree<L: FolderLoader>(tree: &LazyTreeController<L>, json: bool) -> Result<()> {
    let rows = tree.visible_rows();
    if json {
        return print_json(&rows);
    }
    println!("/");
    for row in rows {
        match row {
            TreeRow::Folder { path, depth, state } => {
                let name = path.rsplit('/').next().unwrap_or(path);
                let marker = if state.expanded { "-" } else { "+" };
                println!("{}{} {}/", "  ".repeat(depth + 1), marker, name);
            }
            TreeRow::File { record, depth } => {
                println!("{}  {}  ({})", "  ".repeat(depth + 1), record.file_name(), format_size(record.size_bytes));
            }
        }
    }
    Ok(())
}

fn configure(container: Option<String>, timeout: Option<u64>, public_access: Option<String>, json: bool) -> Result<()> {
    let mut settings = config::load_settings();
    let changed = container.is_some() || timeout.is_some() || public_access.is_some();

    if let Some(container) = container {
        config::validate_container_name(&container)?;
        settings.container = container;
    }
    if let Some(timeout) = timeout {
        if timeout == 0 {
            bail!("Timeout must be at least 1 second");
        }
        settings.request_timeout_secs = timeout;
    }
    if let Some(access) = public_access {
        settings.public_access = config::parse_public_access(&access)?;
    }

    if changed {
        let path = config::save_settings(&settings).context("Failed to save settings")?;
        if !json {
            println!("Saved {}", path.display());
        }
    }

    if json {
        print_json(&settings)
    } else {
        println!("container:        {}", settings.container);
        println!("request timeout:  {}s", settings.request_timeout_secs);
        println!(
            "public access:    {}",
            settings.public_access.map(|a| a.to_string()).unwrap_or_else(|| "none".to_string())
        );
        Ok(())
    }
}

async fn run(command: StorageCommand, cli: &Cli) -> Result<()> {
    let config = StorageConfig::load(cli.env_file.as_deref()).context("Failed to load configuration")?;
    let gateway = AzureBlobGateway::from_config(&config)?;
    let policy = RetryPolicy::default().with_max_retries(cli.retries);
    let gw = &gateway;

    match command {
        StorageCommand::Init => {
            let status = with_retry(&policy, move || gw.initialize()).await?;
            if cli.json {
                print_json(&json!({ "container": gateway.container(), "status": status }))?;
            } else {
                match status {
                    ContainerStatus::Existing => println!("Container '{}' is ready", gateway.container()),
                    ContainerStatus::Created => println!("Created container '{}'", gateway.container()),
                }
            }
        }
        StorageCommand::Put { file, path, name, content_type } => {
            let name = target_name(&file, path.as_deref(), name.as_deref())?;
            let content_type = content_type.unwrap_or_else(|| {
                mime_guess::from_path(&file).first_or_octet_stream().essence_str().to_string()
            });
            let content = tokio::fs::read(&file).await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let (name_ref, type_ref, content_ref) = (name.as_str(), content_type.as_str(), &content);
            let record = with_retry(&policy, move || gw.put(name_ref, content_ref.clone(), type_ref)).await?;

            if cli.json {
                print_json(&record)?;
            } else {
                println!("Uploaded {} -> {} ({})", file.display(), record.name, format_size(record.size_bytes));
                println!("{}", record.url);
            }
        }
        StorageCommand::Get { name, output } => {
            let name_ref = name.as_str();
            let object = with_retry(&policy, move || gw.get(name_ref)).await?;
            let output = output.unwrap_or_else(|| PathBuf::from(object.record.file_name()));
            tokio::fs::write(&output, &object.content).await
                .with_context(|| format!("Failed to write {}", output.display()))?;

            if cli.json {
                print_json(&json!({
                    "record": object.record,
                    "metadata": object.metadata,
                    "saved_to": output,
                }))?;
            } else {
                println!("Downloaded {} -> {} ({})", name, output.display(), format_size(object.content.len() as u64));
            }
        }
        StorageCommand::Rm { name } => {
            let name_ref = name.as_str();
            with_retry(&policy, move || gw.delete(name_ref)).await?;
            if cli.json {
                print_json(&json!({ "deleted": name }))?;
            } else {
                println!("Deleted {}", name);
            }
        }
        StorageCommand::Ls { prefix } => {
            let prefix_ref = prefix.as_deref();
            let records = with_retry(&policy, move || gw.list(prefix_ref)).await?;
            if cli.json {
                print_json(&records)?;
            } else {
                print_records(&records);
            }
        }
        StorageCommand::Tree { expand, all } => {
            if all {
                let records = with_retry(&policy, move || gw.list(None)).await?;
                let projection = NamespaceProjection::project(records);
                let folders: Vec<String> = projection.folder_paths().map(str::to_string).collect();

                let mut tree = LazyTreeController::new(projection);
                for folder in &folders {
                    tree.expand(folder).await?;
                }
                print_tree(&tree, cli.json)?;
            } else {
                let mut tree = LazyTreeController::new(StoreFolderLoader::new(gw));
                tree.expand("").await?;
                for folder in &expand {
                    tree.reveal(folder).await
                        .with_context(|| format!("Failed to expand '{}'", folder))?;
                }
                print_tree(&tree, cli.json)?;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Configure { ref container, timeout, ref public_access } => {
            configure(container.clone(), timeout, public_access.clone(), cli.json)
        }
        Commands::Storage(ref command) => run(command.clone(), &cli).await,
    }
}
