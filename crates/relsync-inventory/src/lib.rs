//! Inventory database lookup client.
//!
//! Wraps the `gabi` query CLI: one `select` per lookup, fetching every
//! column needed to reconstruct a relationship for a given inventory id.
//! The store answers either with a literal no-results sentinel or with a
//! JSON array of row objects; only the first row is authoritative.
//!
//! Records are fetched fresh on every reconciliation decision and never
//! cached across events.

pub mod error;

pub use error::{Error, Result};

use std::process::Command;

use serde::Deserialize;
use tracing::{debug, info};

use relsync_types::{InventoryId, InventoryRecord};

/// Literal substring the query CLI prints when a query matches no rows.
/// Matched anywhere in the output; the CLI pads it with whitespace.
const NO_RESULTS_SENTINEL: &str = "your query didn't return any results";

/// Client for the inventory query CLI.
pub struct InventoryClient {
    bin: String,
}

impl InventoryClient {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Fetches the current authoritative record for an inventory id.
    ///
    /// `Ok(None)` means the resource no longer exists in the source of
    /// truth. That is a first-class decision branch, not an error.
    pub fn lookup(&self, inventory_id: &InventoryId) -> Result<Option<InventoryRecord>> {
        debug!(%inventory_id, "querying inventory store");

        let output = Command::new(&self.bin)
            .arg("exec")
            .arg(lookup_query(inventory_id))
            .output()
            .map_err(|source| Error::Spawn {
                bin: self.bin.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() && !stdout.contains(NO_RESULTS_SENTINEL) {
            return Err(Error::QueryFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let record = parse_lookup_output(&stdout)?;
        match &record {
            Some(record) => info!(%inventory_id, ?record, "inventory record resolved"),
            None => info!(%inventory_id, "no inventory record"),
        }
        Ok(record)
    }
}

/// Builds the lookup select. The id originates from an untrusted log
/// line, so embedded single quotes are doubled.
fn lookup_query(inventory_id: &InventoryId) -> String {
    let escaped = inventory_id.as_str().replace('\'', "''");
    format!(
        "select reporter_resource_id, workspace_id, resource_type, reporter_type, reporter \
         from resources where inventory_id='{escaped}'"
    )
}

#[derive(Deserialize)]
struct ResourceRow {
    reporter_resource_id: String,
    workspace_id: String,
    resource_type: String,
    #[serde(default)]
    reporter_type: String,
    /// Nested reporter details, itself a JSON document in a string.
    #[serde(default)]
    reporter: String,
}

#[derive(Deserialize, Default)]
struct ReporterBlob {
    #[serde(default)]
    reporter_type: String,
}

/// Decodes the query CLI's stdout into at most one record.
///
/// A no-results sentinel or an empty row array is a reliable "absent",
/// distinct from a garbled response (which is an error).
fn parse_lookup_output(stdout: &str) -> Result<Option<InventoryRecord>> {
    if stdout.contains(NO_RESULTS_SENTINEL) {
        return Ok(None);
    }

    let rows: Vec<ResourceRow> = serde_json::from_str(stdout.trim())?;
    let Some(row) = rows.into_iter().next() else {
        return Ok(None);
    };

    // Top-level reporter type wins; the nested reporter blob's own
    // reporter_type is the fallback when it is blank.
    let mut reporter_type = row.reporter_type.to_lowercase();
    if reporter_type.is_empty() && !row.reporter.is_empty() {
        let blob: ReporterBlob = serde_json::from_str(&row.reporter)?;
        reporter_type = blob.reporter_type.to_lowercase();
    }

    Ok(Some(InventoryRecord {
        resource_id: row.reporter_resource_id,
        workspace_id: row.workspace_id,
        resource_type: row.resource_type,
        reporter_type,
    }))
}
