//! proptree - Hierarchical configuration store console.
//!
//! # Usage
//!
//! ```bash
//! # List versions under the configured root
//! proptree versions
//!
//! # Create a version cloned from another
//! proptree create-version 2.0.0 --from 1.0.0
//!
//! # Set and read a property
//! proptree set 2.0.0 db url jdbc:mysql://localhost --comment "primary"
//! proptree get 2.0.0 db url
//!
//! # Export a whole version and import it elsewhere
//! proptree export 2.0.0 -o release.zip
//! proptree import 3.0.0 release.zip
//!
//! # Reload on change
//! proptree watch-file ./app.properties
//! proptree watch-node 2.0.0 db
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use proptree_cli::{commands, output, ConfigConsole, OutputFormat};
use proptree_core::ProptreeConfig;
use std::path::PathBuf;
use std::process;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "proptree")]
#[command(about = "Versioned property tree on a coordination store", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "PROPTREE_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Namespace root (overrides console.root)
    #[arg(short, long, global = true)]
    root: Option<String>,

    /// Output format (human, json, plain)
    #[arg(long, global = true, default_value = "human")]
    format: OutputFormatArg,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormatArg {
    Human,
    Json,
    Plain,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Plain => OutputFormat::Plain,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Watch local files and reload them when modified
    WatchFile {
        /// Files to watch (defaults to watch.files from the configuration)
        files: Vec<PathBuf>,
    },

    #[command(flatten)]
    Console(ConsoleCommand),
}

/// Commands that run against a coordination session.
#[derive(Subcommand)]
enum ConsoleCommand {
    /// List versions, newest first
    Versions,

    /// List the groups of a version
    Groups {
        version: String,
    },

    /// Show the items of a group with their comments
    Show {
        version: String,
        group: String,
    },

    /// Create a version, optionally cloned from another
    CreateVersion {
        version: String,

        /// Version to copy groups and items from
        #[arg(long)]
        from: Option<String>,
    },

    /// Delete a version and its comments
    DeleteVersion {
        version: String,
    },

    /// Create an empty group
    CreateGroup {
        version: String,
        group: String,
    },

    /// Delete a group and its items
    DeleteGroup {
        version: String,
        group: String,
    },

    /// Print one item
    Get {
        version: String,
        group: String,
        key: String,
    },

    /// Create an item, or overwrite it with --update
    Set {
        version: String,
        group: String,
        key: String,
        value: String,

        /// Comment stored alongside the item
        #[arg(short = 'm', long)]
        comment: Option<String>,

        /// Overwrite an existing item instead of failing
        #[arg(short, long)]
        update: bool,
    },

    /// Delete an item and its comment
    Delete {
        version: String,
        group: String,
        key: String,
    },

    /// Export a group (.properties) or a whole version (.zip)
    Export {
        version: String,
        group: Option<String>,

        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a .properties file or a .zip of them into a version
    Import {
        version: String,
        file: PathBuf,
    },

    /// Watch a group in the store and show it when modified
    WatchNode {
        version: String,
        group: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::error(format!("{:#}", e));
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = ProptreeConfig::load_or_default(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;

    // Initialize logging
    init_logging(cli.verbose, &config.general().log_level);
    let format = OutputFormat::from(cli.format);

    match cli.command {
        Commands::WatchFile { files } => {
            let files = if files.is_empty() {
                config.watch().files.clone()
            } else {
                files
            };
            let cancel = CancellationToken::new();
            commands::cancel_on_ctrl_c(cancel.clone());
            commands::watch_files(files, cancel).await
        }
        Commands::Console(command) => {
            let console = commands::open_console(&config, cli.root).await?;
            let result = dispatch(&console, command, format).await;
            commands::close_console(&console).await;
            result
        }
    }
}

async fn dispatch(console: &ConfigConsole, command: ConsoleCommand, format: OutputFormat) -> Result<()> {
    match command {
        ConsoleCommand::Versions => commands::list_versions(console, format).await,
        ConsoleCommand::Groups { version } => commands::list_groups(console, &version, format).await,
        ConsoleCommand::Show { version, group } => {
            commands::show_group(console, &version, &group, format).await
        }
        ConsoleCommand::CreateVersion { version, from } => {
            commands::create_version(console, &version, from.as_deref()).await
        }
        ConsoleCommand::DeleteVersion { version } => commands::delete_version(console, &version).await,
        ConsoleCommand::CreateGroup { version, group } => {
            commands::create_group(console, &version, &group).await
        }
        ConsoleCommand::DeleteGroup { version, group } => {
            commands::delete_group(console, &version, &group).await
        }
        ConsoleCommand::Get {
            version,
            group,
            key,
        } => commands::get_item(console, &version, &group, &key, format).await,
        ConsoleCommand::Set {
            version,
            group,
            key,
            value,
            comment,
            update,
        } => {
            commands::set_item(
                console,
                &version,
                &group,
                &key,
                &value,
                comment.as_deref(),
                update,
                format,
            )
            .await
        }
        ConsoleCommand::Delete {
            version,
            group,
            key,
        } => commands::delete_item(console, &version, &group, &key).await,
        ConsoleCommand::Export {
            version,
            group,
            output,
        } => commands::export(console, &version, group.as_deref(), output).await,
        ConsoleCommand::Import { version, file } => {
            commands::import(console, &version, &file, format).await
        }
        ConsoleCommand::WatchNode { version, group } => {
            let cancel = CancellationToken::new();
            commands::cancel_on_ctrl_c(cancel.clone());
            commands::watch_node(console, &version, &group, cancel).await
        }
    }
}

fn init_logging(verbose: bool, level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("proptree=debug,proptree_core=debug,proptree_store=debug,proptree_watch=debug,proptree_cli=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "proptree={level},proptree_core={level},proptree_store={level},proptree_watch={level},proptree_cli={level},warn"
            ))
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
