use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::model::DocumentResults;
use crate::export::{export_rows, Exporter};

#[derive(Debug, Clone)]
pub struct CsvExporter {
    out_dir: PathBuf,
}

impl CsvExporter {
    pub fn new(out_dir: PathBuf) -> Self {
        Self { out_dir }
    }
}

impl Exporter for CsvExporter {
    fn export(&self, results: &DocumentResults) -> Result<()> {
        fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join("results.csv");
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        for row in export_rows(results) {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}
