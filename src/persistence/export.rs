use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use time::macros::format_description;

use crate::graph_utils::result_set::ResultSet;
use super::settings::AppSettings;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// Timestamped file name under the configured export directory.
pub fn default_export_path(settings: &AppSettings, format: ExportFormat) -> PathBuf {
    let now = OffsetDateTime::now_utc();
    let fmt = format_description!("[year][month][day]_[hour][minute][second]");
    let stamp = now.format(&fmt).unwrap_or_else(|_| "now".into());
    let mut base = settings.export_dir();
    base.push(format!("results_{}.{}", stamp, format.extension()));
    base
}

pub fn export_results(rows: &ResultSet, path: &Path, format: ExportFormat) -> std::io::Result<()> {
    match format {
        ExportFormat::Csv => export_results_csv(rows, path),
        ExportFormat::Json => export_results_json(rows, path),
    }
}

// headers are the result columns; null cells export as empty fields
pub fn export_results_csv(rows: &ResultSet, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() { std::fs::create_dir_all(parent)?; }
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(rows.columns())?;
    for row in rows.rows() {
        wtr.write_record(row.cells().iter().map(|c| c.to_string()))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_results_json(rows: &ResultSet, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() { std::fs::create_dir_all(parent)?; }
    let mut f = File::create(path)?;
    serde_json::to_writer_pretty(&mut f, &rows.to_json_records()).map_err(std::io::Error::other)?;
    // ensure newline at end
    f.write_all(b"\n")?;
    Ok(())
}
