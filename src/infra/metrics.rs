// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per validation pass.
//
// Columns:
//   iter     training iteration the validation ran at
//   epoch    epoch that iteration belongs to
//   lr       learning rate in effect
//   l_pix    weighted pixel loss of the last training step
//   psnr_l   mean PSNR on normalised linear values (dB)
//   psnr_mu  mean PSNR after tanh + mu-law tonemap (dB)
//
// Output file: experiments/<name>/metrics.csv
//
// Example:
//   iter,epoch,lr,l_pix,psnr_l,psnr_mu
//   200,13,1.000000e-4,0.041231,24.113000,21.870100
//
// psnr_mu is the number to watch: it is measured in the same
// tonemapped domain the loss is optimised in.

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

/// One row of metrics for a validation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub iter:    usize,
    pub epoch:   usize,
    pub lr:      f64,
    pub l_pix:   f64,
    pub psnr_l:  f64,
    pub psnr_mu: f64,
}

impl ValidationMetrics {
    /// Returns true if PSNR-mu beat the previous best
    pub fn is_improvement(&self, best_psnr_mu: f64) -> bool {
        self.psnr_mu > best_psnr_mu
    }
}

/// Logs validation metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet,
    /// so a resumed run keeps appending to the same log.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "iter,epoch,lr,l_pix,psnr_l,psnr_mu")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one validation row
    pub fn log(&self, m: &ValidationMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;

        writeln!(
            f,
            "{},{},{:e},{:.6},{:.6},{:.6}",
            m.iter, m.epoch, m.lr, m.l_pix, m.psnr_l, m.psnr_mu,
        )?;

        tracing::debug!(
            "Logged iter {} metrics: psnr_l={:.4}, psnr_mu={:.4}",
            m.iter,
            m.psnr_l,
            m.psnr_mu,
        );

        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
