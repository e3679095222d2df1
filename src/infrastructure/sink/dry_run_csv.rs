//! Dry-run CSV sink: one row per simulated entry, append-only.

use crate::domain::signal::EnterSignal;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

const HEADERS: [&str; 13] = [
    "timestamp",
    "market_slug",
    "side",
    "strength",
    "phase",
    "model_up",
    "model_down",
    "edge_up",
    "edge_down",
    "bet_size",
    "btc_price",
    "price_to_beat",
    "regime",
];

pub struct DryRunCsv {
    path: PathBuf,
}

impl DryRunCsv {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, signal: &EnterSignal, bet_size: f64) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create CSV directory")?;
        }

        let write_header = !Path::new(&self.path).exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if write_header {
            writer.write_record(HEADERS).context("Failed to write CSV header")?;
        }

        writer
            .write_record([
                chrono::Utc::now().to_rfc3339(),
                signal.slug.clone(),
                signal.side.as_str().to_string(),
                signal.strength.as_str().to_string(),
                signal.phase.clone(),
                format!("{:.4}", signal.model_up),
                format!("{:.4}", signal.model_down()),
                format!("{:.4}", signal.edge_up),
                format!("{:.4}", signal.edge_down),
                format!("{:.2}", bet_size),
                signal
                    .btc_price
                    .map(|p| format!("{:.2}", p))
                    .unwrap_or_default(),
                signal
                    .price_to_beat
                    .map(|p| format!("{:.2}", p))
                    .unwrap_or_default(),
                signal.regime.clone(),
            ])
            .context("Failed to write CSV row")?;
        writer.flush().context("Failed to flush CSV")?;
        Ok(())
    }
}
