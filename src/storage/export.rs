// src/storage/export.rs
use crate::types::Alert;
use anyhow::{Context, Result};
use csv::{Writer, WriterBuilder};
use std::fs::OpenOptions;
use std::path::Path;

const HEADER: [&str; 11] = [
    "id",
    "timestamp",
    "kind",
    "ticker",
    "type",
    "strike",
    "expiration",
    "old_value",
    "new_value",
    "change_pct",
    "message",
];

fn alert_row(alert: &Alert) -> [String; 11] {
    let key = &alert.contract_key;
    [
        alert.id.to_string(),
        alert.timestamp.to_rfc3339(),
        alert.kind.to_string(),
        key.ticker.clone(),
        key.option_type.to_string(),
        key.strike.to_string(),
        key.expiration.to_string(),
        alert.old_value.to_string(),
        alert.new_value.to_string(),
        alert.change_pct.map(|p| p.round_dp(2).to_string()).unwrap_or_default(),
        alert.message.clone(),
    ]
}

/// Formats alerts as CSV text with a header row, in the order given.
pub fn alerts_to_csv(alerts: &[Alert]) -> Result<String> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;
    for alert in alerts {
        writer.write_record(alert_row(alert))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| e.into_error())
        .context("flushing alert CSV")?;
    Ok(String::from_utf8(bytes)?)
}

/// Appends one alert to `path`, writing the header first if the file is new.
pub fn append_alert_csv(path: &Path, alert: &Alert) -> Result<()> {
    let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening alert log {}", path.display()))?;

    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
    if is_new {
        writer.write_record(HEADER)?;
    }
    writer.write_record(alert_row(alert))?;
    writer.flush()?;
    Ok(())
}
