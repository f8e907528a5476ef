//! Inspect command - print the contents of a snapshot file.

use anyhow::{Context, Result};
use std::path::Path;
use toyfactory_cluster::{Snapshot, SnapshotStore};

/// Run the inspect-snapshot command.
pub fn run(file: &Path, json: bool) -> Result<()> {
    tracing::info!(path = %file.display(), "Inspecting snapshot");

    if !file.exists() {
        anyhow::bail!("Snapshot file not found: {}", file.display());
    }

    let snapshot = SnapshotStore::load(file)
        .with_context(|| format!("Failed to load snapshot: {}", file.display()))?;

    if json {
        let out =
            serde_json::to_string_pretty(&snapshot).context("Failed to serialize snapshot")?;
        println!("{}", out);
        return Ok(());
    }

    print!("{}", render(&snapshot));
    Ok(())
}

/// Human-readable rendering of a snapshot.
fn render(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    out.push_str("Snapshot Information\n");
    out.push_str("====================\n");
    out.push_str(&format!("Last Applied:   {}\n", snapshot.last_applied));
    out.push_str(&format!("Next ID:        {}\n", snapshot.next_id));
    out.push_str(&format!("Entities:       {}\n", snapshot.entities.len()));

    if snapshot.entities.is_empty() {
        return out;
    }

    out.push('\n');
    out.push_str(&format!(
        "{:>8}  {:>8}  {:<10}  {:>15}  {:>15}\n",
        "ID", "OWNER", "STATUS", "CREATED_MS", "UPDATED_MS"
    ));
    for entity in &snapshot.entities {
        out.push_str(&format!(
            "{:>8}  {:>8}  {:<10}  {:>15}  {:>15}\n",
            entity.id.as_u64(),
            entity.owner_id.as_u64(),
            entity.status.as_str(),
            entity.created_at_ms,
            entity.updated_at_ms
        ));
    }
    out
}
