//! State Commands

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use statehub_common::{StateObjectKey, StateVersion, WritePrecondition};

use crate::catalog::VersionCatalog;
use crate::client::HttpStateTransport;
use crate::compare::CompareEngine;
use crate::lock::{lock_info, with_lock};
use crate::output::{
    format_size, print_diff, print_info, print_item, print_list, print_status, print_warning,
    OutputFormat, TableDisplay,
};
use crate::transport::StateTransport;

#[derive(Subcommand)]
pub enum StateCommands {
    /// List the versions of a state, newest first
    List {
        /// State address as <project>/<state>
        key: StateObjectKey,
    },

    /// Print the content of a state version
    Show {
        key: StateObjectKey,

        /// Version to print (defaults to current)
        #[arg(long)]
        version: Option<u64>,
    },

    /// Upload a new state version
    Push {
        key: StateObjectKey,

        /// State file, or '-' for stdin
        file: PathBuf,

        /// Only write if the current version is this one (0 for a new state)
        #[arg(long)]
        expected_version: Option<u64>,

        /// Hold the state lock for the duration of the upload
        #[arg(long, conflicts_with = "lock_id")]
        lock: bool,

        /// ID of a lock already held (see `lock acquire`)
        #[arg(long)]
        lock_id: Option<String>,
    },

    /// Delete one version or the whole state
    Rm {
        key: StateObjectKey,

        /// Version to delete
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        version: Option<u64>,

        /// Delete every version
        #[arg(long)]
        all: bool,

        /// ID of a lock already held (see `lock acquire`)
        #[arg(long)]
        lock_id: Option<String>,
    },

    /// Report whether a state has any versions
    Exists { key: StateObjectKey },

    /// Compare two versions of a state
    Diff {
        key: StateObjectKey,

        /// Old side
        left: u64,

        /// New side (defaults to current)
        right: Option<u64>,

        /// Unchanged lines kept around each change; all lines when omitted
        #[arg(long)]
        context: Option<usize>,

        /// Single-column output instead of side by side
        #[arg(long)]
        unified: bool,
    },
}

#[derive(Serialize)]
pub struct VersionDisplay {
    pub version: u64,
    pub current: bool,
    pub created_by: String,
    pub created_at: String,
    pub size_bytes: u64,
    pub digest: String,
}

impl VersionDisplay {
    fn new(v: StateVersion, current: bool) -> Self {
        Self {
            version: v.version,
            current,
            created_by: v.created_by,
            created_at: v.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            size_bytes: v.size_bytes,
            digest: v.digest,
        }
    }
}

impl TableDisplay for VersionDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Version", "", "Created By", "Created", "Size", "Digest"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.version.to_string(),
            if self.current { "current".to_string() } else { String::new() },
            self.created_by.clone(),
            self.created_at.clone(),
            format_size(self.size_bytes),
            self.digest.chars().take(12).collect(),
        ]
    }
}

#[derive(Serialize)]
struct ExistsDisplay {
    key: String,
    exists: bool,
}

impl TableDisplay for ExistsDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["State", "Exists"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.key.clone(), self.exists.to_string()]
    }
}

fn read_input(file: &Path) -> Result<Vec<u8>> {
    if file.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read state from stdin")?;
        Ok(buf)
    } else {
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))
    }
}

pub async fn execute(
    cmd: StateCommands,
    transport: Arc<HttpStateTransport>,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        StateCommands::List { key } => {
            let catalog = VersionCatalog::new(transport);
            let split = catalog.get_current_and_previous(&key).await?;
            let mut rows = Vec::new();
            if let Some(current) = split.current {
                rows.push(VersionDisplay::new(current, true));
            }
            rows.extend(split.previous.into_iter().map(|v| VersionDisplay::new(v, false)));
            print_list(&rows, format);
        }

        StateCommands::Show { key, version } => {
            let content = transport.read_state(&key, version).await?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&content)?;
            if !content.ends_with(b"\n") {
                writeln!(stdout)?;
            }
        }

        StateCommands::Push {
            key,
            file,
            expected_version,
            lock,
            lock_id,
        } => {
            let content = read_input(&file)?;
            let precondition = WritePrecondition {
                expected_version,
                lock_id,
            };

            let written = if lock {
                let who = transport.session().user().unwrap_or_default();
                let info = lock_info("push", &who);
                let precondition = match info.lock_id() {
                    Some(id) => precondition.with_lock_id(id),
                    None => precondition,
                };
                with_lock(transport.as_ref(), &key, &info, || {
                    transport.write_state(&key, content, &precondition)
                })
                .await?
            } else {
                transport.write_state(&key, content, &precondition).await?
            };

            print_status(&format!("Wrote {} version {}", key, written.version), format);
            print_item(&VersionDisplay::new(written, true), format);
        }

        StateCommands::Rm {
            key,
            version,
            all,
            lock_id,
        } => {
            let target = if all { None } else { version };
            transport
                .delete_state_locked(&key, target, lock_id.as_deref())
                .await?;
            let message = match target {
                Some(v) => format!("Deleted {} version {}", key, v),
                None => format!("Deleted all versions of {}", key),
            };
            print_status(&message, format);
        }

        StateCommands::Exists { key } => {
            let catalog = VersionCatalog::new(transport);
            let exists = catalog.exists(&key).await;
            print_item(
                &ExistsDisplay {
                    key: key.to_string(),
                    exists,
                },
                format,
            );
        }

        StateCommands::Diff {
            key,
            left,
            right,
            context,
            unified,
        } => {
            let right = match right {
                Some(v) => v,
                None => {
                    let catalog = VersionCatalog::new(transport.clone());
                    let split = catalog.get_current_and_previous(&key).await?;
                    match split.current {
                        Some(current) => current.version,
                        None => {
                            print_warning(&format!("{} has no versions", key));
                            return Ok(());
                        }
                    }
                }
            };

            let engine = CompareEngine::new(transport);
            match engine.compare_versions(&key, left, right).await? {
                Some(mut diff) => {
                    diff.options.split_view = !unified;
                    diff.options.expand_all = context.is_none();
                    if !format.is_structured() {
                        print_info(&format!("{} version {} -> {}", key, left, right));
                    }
                    print_diff(&diff, context.unwrap_or(0), format);
                }
                None => print_warning("One side is empty; nothing to compare"),
            }
        }
    }

    Ok(())
}
