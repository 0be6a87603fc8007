//! Tracked item list
//!
//! One item id per line. `#` starts a comment anywhere on a line and blank
//! lines are skipped.

use anyhow::{anyhow, Context, Result};
use std::path::Path;

use crate::models::{ItemId, TrackedItemSet};

pub fn load_tracked_items(path: impl AsRef<Path>) -> Result<TrackedItemSet> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read item whitelist: {}", path.display()))?;
    parse_tracked_items(&text).with_context(|| format!("Invalid item whitelist: {}", path.display()))
}

pub fn parse_tracked_items(text: &str) -> Result<TrackedItemSet> {
    let mut ids: Vec<ItemId> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let id: ItemId = line
            .parse()
            .map_err(|_| anyhow!("line {}: `{}` is not an item id", idx + 1, line))?;
        if id == 0 {
            return Err(anyhow!("line {}: item id must be positive", idx + 1));
        }
        ids.push(id);
    }

    Ok(TrackedItemSet::new(ids))
}
