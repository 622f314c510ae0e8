use crate::error::Error;
use crate::model::Catalog;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// `inventory-YYYYMMDD-HHMMSS.json` in local time.
pub fn default_inventory_filename() -> String {
    chrono::Local::now()
        .format("inventory-%Y%m%d-%H%M%S.json")
        .to_string()
}

pub fn write_inventory(catalog: &Catalog, path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, catalog)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    info!(
        "Wrote inventory of {} files to {}",
        catalog.stats().file_count,
        path.display()
    );
    Ok(())
}

/// Load a catalog file. Stats are re-derived and duplicate paths rejected.
pub fn read_inventory(path: &Path) -> Result<Catalog, Error> {
    let reader = BufReader::new(File::open(path)?);
    let catalog: Catalog = serde_json::from_reader(reader)?;
    Ok(catalog)
}
