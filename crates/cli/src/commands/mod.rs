//! CLI Commands

pub mod lock;
pub mod state;

use anyhow::{bail, Result};

/// Parse repeated `key=value` arguments into lock metadata entries
pub(crate) fn parse_meta(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
            _ => bail!("metadata must be key=value, got '{}'", pair),
        })
        .collect()
}
