//! Terminal output formatting

use std::time::Duration;

use bson::{Bson, Document};
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, ContentArrangement, Table};
use docpool_connection::{HealthStatus, PoolStats};

use crate::commands::format_latency;

pub struct PingRow {
    pub pool: String,
    pub status: HealthStatus,
    pub latency: Option<Duration>,
    pub error: Option<String>,
}

pub struct StatsRow {
    pub pool: String,
    pub stats: PoolStats,
    /// Connections opened by the prewarm; `None` when it failed
    pub warmed: Option<usize>,
}

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(|h| Cell::new(*h)));
    table
}

pub fn ping_table(rows: &[PingRow]) -> Table {
    let mut table = table(&["Pool", "Status", "Latency (ms)", "Error"]);
    for row in rows {
        table.add_row(vec![
            Cell::new(&row.pool),
            Cell::new(row.status.as_str()),
            Cell::new(row.latency.map(format_latency).unwrap_or_else(|| "-".into())),
            Cell::new(row.error.as_deref().unwrap_or("")),
        ]);
    }
    table
}

pub fn stats_table(rows: &[StatsRow]) -> Table {
    let mut table = table(&[
        "Pool", "Open", "Idle", "In use", "Waiting", "Max", "Created", "Destroyed", "Utilization",
        "Prewarm",
    ]);
    for row in rows {
        let stats = &row.stats;
        table.add_row(vec![
            Cell::new(&row.pool),
            Cell::new(stats.open()),
            Cell::new(stats.idle()),
            Cell::new(stats.in_use()),
            Cell::new(stats.waiting()),
            Cell::new(stats.max_open()),
            Cell::new(stats.created()),
            Cell::new(stats.destroyed()),
            Cell::new(format!("{:.0}%", stats.utilization() * 100.0)),
            Cell::new(match row.warmed {
                Some(opened) => format!("+{}", opened),
                None => "failed".to_string(),
            }),
        ]);
    }
    table
}

/// One document as a single line of relaxed extended JSON
pub fn document_json(document: Document) -> String {
    Bson::Document(document).into_relaxed_extjson().to_string()
}
