//! Lock Commands

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use std::sync::Arc;

use statehub_common::{LockMetadata, StateObjectKey};

use super::parse_meta;
use crate::client::HttpStateTransport;
use crate::lock::lock_info;
use crate::output::{print_item, print_status, OutputFormat, TableDisplay};
use crate::transport::StateTransport;

#[derive(Subcommand)]
pub enum LockCommands {
    /// Take the lock on a state
    Acquire {
        key: StateObjectKey,

        /// Operation recorded in the lock info
        #[arg(long, default_value = "manual")]
        operation: String,

        /// Lock ID to use instead of a generated one
        #[arg(long)]
        id: Option<String>,

        /// Extra metadata as key=value (repeatable)
        #[arg(long = "meta")]
        meta: Vec<String>,
    },

    /// Release the lock on a state
    Release {
        key: StateObjectKey,

        /// ID printed when the lock was acquired
        #[arg(long)]
        id: Option<String>,

        /// Holder metadata as key=value, for locks taken without an ID
        #[arg(long = "meta")]
        meta: Vec<String>,
    },
}

#[derive(Serialize)]
struct LockDisplay {
    key: String,
    metadata: LockMetadata,
}

impl TableDisplay for LockDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["State", "ID", "Who", "Operation", "Created"]
    }

    fn row(&self) -> Vec<String> {
        let field = |k: &str| self.metadata.get_str(k).unwrap_or("-").to_string();
        vec![
            self.key.clone(),
            field("ID"),
            self.metadata.who().unwrap_or("-").to_string(),
            field("Operation"),
            field("Created"),
        ]
    }
}

fn with_meta(mut metadata: LockMetadata, pairs: &[String]) -> Result<LockMetadata> {
    for (k, v) in parse_meta(pairs)? {
        metadata = metadata.with(k, v);
    }
    Ok(metadata)
}

pub async fn execute(
    cmd: LockCommands,
    transport: Arc<HttpStateTransport>,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        LockCommands::Acquire {
            key,
            operation,
            id,
            meta,
        } => {
            let who = transport.session().user().unwrap_or_default();
            let mut metadata = lock_info(&operation, &who);
            if let Some(id) = id {
                metadata = metadata.with("ID", id);
            }
            let metadata = with_meta(metadata, &meta)?;

            let handle = transport.acquire_lock(&key, &metadata).await?;
            print_status(&format!("Locked {}", key), format);
            print_item(
                &LockDisplay {
                    key: handle.key.to_string(),
                    metadata: handle.metadata,
                },
                format,
            );
        }

        LockCommands::Release { key, id, meta } => {
            let mut metadata = LockMetadata::new();
            if let Some(id) = id {
                metadata = metadata.with("ID", id);
            }
            let metadata = with_meta(metadata, &meta)?;

            transport.release_lock(&key, &metadata).await?;
            print_status(&format!("Unlocked {}", key), format);
        }
    }

    Ok(())
}
