//! The driver loop: read, decode, reconcile, execute.
//!
//! Strictly sequential: one line is fully decoded, reconciled, and
//! (outside dry-run) executed before the next is read. Undecodable lines
//! are reported and skipped; the first failed store mutation ends the
//! run, since later events may depend on earlier ones having succeeded.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tracing::warn;

use relsync_engine::Reconciler;
use relsync_graph::GraphClient;
use relsync_inventory::InventoryClient;
use relsync_types::StoreCommand;

use crate::config::Settings;

/// Counts narrated at the end of a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub lines: usize,
    pub skipped: usize,
    pub noops: usize,
    pub creates: usize,
    pub touches: usize,
    pub deletes: usize,
}

impl RunSummary {
    fn count(&mut self, command: &StoreCommand) {
        match command {
            StoreCommand::Create(_) => self.creates += 1,
            StoreCommand::Touch(_) => self.touches += 1,
            StoreCommand::BulkDelete { .. } => self.deletes += 1,
        }
    }
}

pub fn run(input: &Path, settings: &Settings) -> Result<RunSummary> {
    let file = File::open(input)
        .with_context(|| format!("failed to open change log {}", input.display()))?;
    let reader = BufReader::new(file);

    if settings.dry_run {
        println!("{}", "dry-run mode: no mutations will be issued".yellow());
    }

    let graph = GraphClient::new(&settings.zed_bin);
    let inventory = InventoryClient::new(&settings.gabi_bin);
    let engine = Reconciler::new(inventory, &graph);

    let mut summary = RunSummary::default();
    for line in reader.lines() {
        let line =
            line.with_context(|| format!("failed to read change log {}", input.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;

        let event = match relsync_decoder::decode(&line) {
            Ok(event) => event,
            Err(reason) => {
                warn!(%reason, "skipping undecodable line");
                summary.skipped += 1;
                continue;
            }
        };

        let Some(command) = engine.reconcile(&event)? else {
            summary.noops += 1;
            println!("{}: nothing to do", event.inventory_id);
            continue;
        };

        summary.count(&command);
        if settings.dry_run {
            println!("would apply: {command}");
            continue;
        }

        println!("applying: {command}");
        graph
            .apply(&command)
            .with_context(|| format!("store mutation failed for {}", event.inventory_id))?;
    }

    print_summary(&summary, settings.dry_run);
    Ok(summary)
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    let heading = if dry_run {
        "dry run complete"
    } else {
        "run complete"
    };
    println!();
    println!("{} {heading}", "✓".green());
    println!(
        "  {} lines, {} skipped, {} no-ops, {} creates, {} touches, {} bulk-deletes",
        summary.lines,
        summary.skipped,
        summary.noops,
        summary.creates,
        summary.touches,
        summary.deletes
    );
}
