use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::metrics::Aggregator;
use crate::types::DeviceSnapshot;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub label: String,
    pub cycle_time: String,
    pub cost: i64,
    pub limit: i64,
    pub sales: i64,
    pub record_count: i64,
    pub warning_threshold: i64,
    pub revenue: i64,
}

/// One row per unit, labelled by position ("Unit 1", "Unit 2", ...).
pub fn rows(snapshot: &DeviceSnapshot, aggregator: &Aggregator) -> Vec<ReportRow> {
    snapshot
        .units()
        .iter()
        .enumerate()
        .map(|(i, unit)| {
            let m = aggregator.unit(unit);
            ReportRow {
                label: format!("Unit {}", i + 1),
                cycle_time: m.cycle_time.unwrap_or_else(|| "N/A".to_string()),
                cost: m.unit_cost,
                limit: m.count_limit,
                sales: m.sale_count,
                record_count: m.record_count,
                warning_threshold: m.warning_threshold,
                revenue: m.revenue,
            }
        })
        .collect()
}

/// `1234567` → `"1.234.567"`.
pub fn format_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

pub fn export_file_name(thing: Option<&str>, date: NaiveDate) -> String {
    format!(
        "machine_state_{}_{}.json",
        thing.unwrap_or("unknown"),
        date.format("%Y-%m-%d")
    )
}

pub fn write_report(dir: &Path, thing: Option<&str>, date: NaiveDate, rows: &[ReportRow]) -> Result<PathBuf> {
    if rows.is_empty() {
        bail!("no unit data to export");
    }
    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(thing, date));
    fs::write(&path, serde_json::to_string_pretty(rows)?)?;
    info!(path = %path.display(), rows = rows.len(), "Report written.");
    Ok(path)
}
