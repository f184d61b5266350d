//! CLI command implementations.

use crate::console::ConfigConsole;
use crate::output::{self, OutputFormat};
use crate::properties::{self, PROPERTIES_EXTENSION};
use anyhow::{bail, Context, Result};
use proptree_core::ProptreeConfig;
use proptree_store::{CoordinationClient, PropertyTreeStore};
use proptree_watch::{ChangeWatchLoop, ReloadFn, WatchReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ============================================================================
// Session
// ============================================================================

/// Connect to the configured coordination store and scope a console to `root`.
pub async fn open_console(config: &ProptreeConfig, root: Option<String>) -> Result<ConfigConsole> {
    if config.coordination().is_memory() {
        warn!(
            "Using the in-process coordination tree at {}; changes are lost when proptree exits",
            config.coordination().address
        );
    }

    let client = CoordinationClient::new(config.coordination().clone());
    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", config.coordination().address))?;

    let root = root.unwrap_or_else(|| config.console().root.clone());
    Ok(ConfigConsole::new(
        PropertyTreeStore::new(Arc::new(client)),
        root,
    ))
}

/// Release the console's session.
pub async fn close_console(console: &ConfigConsole) {
    console.store().client().close().await;
}

// ============================================================================
// Listing
// ============================================================================

pub async fn list_versions(console: &ConfigConsole, format: OutputFormat) -> Result<()> {
    let versions = console.versions().await;
    output::names("Versions", &versions, format)
}

pub async fn list_groups(console: &ConfigConsole, version: &str, format: OutputFormat) -> Result<()> {
    let groups = console.groups(version).await;
    output::names("Groups", &groups, format)
}

pub async fn show_group(
    console: &ConfigConsole,
    version: &str,
    group: &str,
    format: OutputFormat,
) -> Result<()> {
    let items = console.display_items(version, group).await;
    output::items(&items, format)
}

// ============================================================================
// Versions and groups
// ============================================================================

pub async fn create_version(console: &ConfigConsole, version: &str, from: Option<&str>) -> Result<()> {
    if !console.create_version(version, from).await {
        bail!("Version {} already exists or is not a valid name", version);
    }
    match from {
        Some(from) => output::success(format!("Created version {} from {}", version, from)),
        None => output::success(format!("Created version {}", version)),
    }
    Ok(())
}

pub async fn delete_version(console: &ConfigConsole, version: &str) -> Result<()> {
    console.delete_version(version).await;
    output::success(format!("Deleted version {}", version));
    Ok(())
}

pub async fn create_group(console: &ConfigConsole, version: &str, group: &str) -> Result<()> {
    if !console.create_group(version, group).await {
        bail!("Group {} already exists in {} or is not a valid name", group, version);
    }
    output::success(format!("Created group {}/{}", version, group));
    Ok(())
}

pub async fn delete_group(console: &ConfigConsole, version: &str, group: &str) -> Result<()> {
    console.delete_group(version, group).await;
    output::success(format!("Deleted group {}/{}", version, group));
    Ok(())
}

// ============================================================================
// Items
// ============================================================================

pub async fn get_item(
    console: &ConfigConsole,
    version: &str,
    group: &str,
    key: &str,
    format: OutputFormat,
) -> Result<()> {
    let Some(item) = console.get_item(version, group, key).await else {
        bail!("Property {}/{}/{} not found", version, group, key);
    };

    match format {
        OutputFormat::Json => output::json(&item),
        OutputFormat::Plain => {
            println!("{}", item.value);
            Ok(())
        }
        OutputFormat::Human => output::items(std::slice::from_ref(&item), format),
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn set_item(
    console: &ConfigConsole,
    version: &str,
    group: &str,
    key: &str,
    value: &str,
    comment: Option<&str>,
    update: bool,
    format: OutputFormat,
) -> Result<()> {
    let target = format!("{}/{}/{}", version, group, key);
    let outcome = if update {
        console.update_item(version, group, key, value, comment).await
    } else {
        console.create_item(version, group, key, value, comment).await
    };

    let action = if update { "Updated" } else { "Created" };
    output::paired_write(action, &target, outcome, format)?;

    if !outcome.value {
        bail!("Failed to write {}", target);
    }
    Ok(())
}

pub async fn delete_item(console: &ConfigConsole, version: &str, group: &str, key: &str) -> Result<()> {
    console.delete_item(version, group, key).await;
    output::success(format!("Deleted {}/{}/{}", version, group, key));
    Ok(())
}

// ============================================================================
// Import / Export
// ============================================================================

/// Export a group as `.properties` or a whole version as a zip archive.
pub async fn export(
    console: &ConfigConsole,
    version: &str,
    group: Option<&str>,
    out: Option<PathBuf>,
) -> Result<()> {
    let (path, bytes) = match group {
        Some(group) => {
            let text = console.export_group(version, group).await;
            let path = out.unwrap_or_else(|| PathBuf::from(format!("{}.{}", group, PROPERTIES_EXTENSION)));
            (path, text.into_bytes())
        }
        None => {
            let Some(bytes) = console.export_version(version).await? else {
                bail!("Version {} has no groups to export", version);
            };
            let path = out.unwrap_or_else(|| PathBuf::from(console.export_file_name()));
            (path, bytes)
        }
    };

    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    output::success(format!("Exported to {} ({} bytes)", path.display(), bytes.len()));
    Ok(())
}

pub async fn import(console: &ConfigConsole, version: &str, file: &Path, format: OutputFormat) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Invalid file name: {}", file.display()))?;

    let summary = console.import(version, file_name, &bytes).await?;

    if format == OutputFormat::Json {
        return output::json(&summary);
    }
    output::success(format!(
        "Imported {} groups into {}: {} created, {} already present",
        summary.groups.len(),
        version,
        summary.created,
        summary.skipped
    ));
    Ok(())
}

// ============================================================================
// Watching
// ============================================================================

/// Cancel `token` on Ctrl-C.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping watchers");
            token.cancel();
        }
    });
}

/// Watch local files, re-reading each one whenever it is modified.
pub async fn watch_files(files: Vec<PathBuf>, cancel: CancellationToken) -> Result<()> {
    if files.is_empty() {
        bail!("No files to watch; pass files or set watch.files in the configuration");
    }

    let mut handles: Vec<(String, JoinHandle<WatchReport>)> = Vec::with_capacity(files.len());
    for file in files {
        let label = file.display().to_string();
        let reload_path = file.clone();
        let reload: ReloadFn = Arc::new(move || reload_file(&reload_path));

        let watch = ChangeWatchLoop::for_file(&file, reload, cancel.child_token())
            .with_context(|| format!("Failed to watch {}", label))?;
        output::info(format!("Watching {}", label));
        handles.push((label, watch.spawn()));
    }

    await_loops(handles).await
}

fn reload_file(path: &Path) {
    match std::fs::read_to_string(path) {
        Ok(text) => output::info(format!(
            "Reloaded {}: {} properties",
            path.display(),
            properties::parse(&text).len()
        )),
        Err(e) => output::warning(format!("Could not reload {}: {}", path.display(), e)),
    }
}

/// Watch a version node and show the group whenever one of its items is modified.
pub async fn watch_node(
    console: &ConfigConsole,
    version: &str,
    group: &str,
    cancel: CancellationToken,
) -> Result<()> {
    let node = proptree_core::path::make_paths(console.root(), &[version]);

    let reload_console = console.clone();
    let (reload_version, reload_group) = (version.to_string(), group.to_string());
    let reload: ReloadFn = Arc::new(move || {
        let console = reload_console.clone();
        let (version, group) = (reload_version.clone(), reload_group.clone());
        tokio::spawn(async move {
            output::info(format!("Reloaded {}/{}", version, group));
            let items = console.display_items(&version, &group).await;
            if let Err(e) = output::items(&items, OutputFormat::Human) {
                output::warning(format!("Failed to print {}: {}", group, e));
            }
        });
    });

    let Some(watch) =
        ChangeWatchLoop::for_node(console.store().client(), &node, group, reload, cancel).await
    else {
        bail!("Version {} does not exist", version);
    };

    output::info(format!("Watching {}/{}", version, group));
    await_loops(vec![(format!("{}/{}", version, group), watch.spawn())]).await
}

async fn await_loops(handles: Vec<(String, JoinHandle<WatchReport>)>) -> Result<()> {
    let (labels, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let results = futures::future::join_all(handles).await;

    for (label, result) in labels.into_iter().zip(results) {
        let report = result.with_context(|| format!("Watcher for {} panicked", label))?;
        output::info(format!(
            "Stopped watching {} ({:?}, {} reloads)",
            label, report.exit, report.reloads
        ));
    }
    Ok(())
}
