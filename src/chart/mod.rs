use crate::model::chart::Chart;
use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::Path;

pub mod reader;
pub mod writer;

pub use reader::parse_chart;
pub use writer::serialize_chart;

pub fn read_chart_file<P: AsRef<Path>>(path: P) -> Result<Chart> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read chart file {}", path.display()))?;

    let chart =
        parse_chart(&text).with_context(|| format!("Invalid chart file {}", path.display()))?;
    Ok(chart)
}

/// Serializes `chart` and writes it to `path`, creating parent directories as needed.
pub fn write_chart_file<P: AsRef<Path>>(path: P, chart: &Chart) -> Result<()> {
    let path = path.as_ref();
    let text = serialize_chart(chart)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    fs::write(path, text)
        .with_context(|| format!("Failed to write chart file {}", path.display()))?;
    info!("Wrote chart to '{}'..!", path.display());

    Ok(())
}
