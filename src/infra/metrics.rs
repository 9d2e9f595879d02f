// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to CSV after each epoch, and draws
// the per-batch progress bars.
//
// Fine-tuning:  <output_dir>/metrics.csv
//   epoch,stage,trainable_groups,lr,train_loss,train_acc,val_loss,val_acc
//   1,1,---#,0.000412,0.693100,0.512000,0.688400,0.540000
//   2,2,--##,0.000950,0.611200,0.671000,0.540900,0.742000
//   ...
//
// `trainable_groups` draws one character per layer group, input
// side first: '#' trainable, '-' frozen.
//
// Pretraining:  <output>.csv  (one row per epoch) and
//               <output>.txt  (best and test figures)
//
// How to read the fine-tuning metrics:
//   - val_acc should climb as more groups are unfrozen
//   - val_loss rising while train_loss falls → overfitting
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

/// One row of fine-tuning metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number across all stages (starts at 1)
    pub epoch: usize,

    /// Gradual-unfreezing stage the epoch ran in (starts at 1)
    pub stage: usize,

    pub trainable_groups: String,

    /// Learning rate of the last update in the epoch
    pub lr: f64,

    pub train_loss: f64,
    pub train_acc:  f64,
    pub val_loss:   f64,
    pub val_acc:    f64,
}

impl EpochMetrics {
    /// Returns true if this epoch improved over the previous best val_loss
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        self.val_loss < best_val_loss
    }
}

/// Writes `EpochMetrics` rows to `<dir>/metrics.csv`.
/// A new logger replaces the file of a previous run.
pub struct MetricsLogger {
    csv_path: PathBuf,
    writer:   csv::Writer<File>,
    best_val_loss: f64,
}

impl MetricsLogger {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        let csv_path = dir.join("metrics.csv");
        let writer   = csv::Writer::from_path(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        Ok(Self { csv_path, writer, best_val_loss: f64::INFINITY })
    }

    /// Append one row; the header is written with the first row.
    pub fn log(&mut self, m: &EpochMetrics) -> Result<()> {
        self.writer.serialize(m)?;
        self.writer.flush()?;

        if m.is_improvement(self.best_val_loss) {
            self.best_val_loss = m.val_loss;
            tracing::info!("New best val_loss {:.4} at epoch {}", m.val_loss, m.epoch);
        }
        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );
        Ok(())
    }

    pub fn best_val_loss(&self) -> f64 {
        self.best_val_loss
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Language-model pretraining ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmEpochMetrics {
    pub epoch:      usize,
    pub lr:         f64,
    pub train_loss: f64,
    pub val_loss:   f64,
    pub val_ppl:    f64,
    pub seconds:    f64,
}

/// Writes `LmEpochMetrics` rows to `<output>.csv`.
pub struct LossHistoryLogger {
    writer: csv::Writer<File>,
}

impl LossHistoryLogger {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let writer = csv::Writer::from_path(path)
            .with_context(|| format!("Cannot create '{}'", path.display()))?;
        Ok(Self { writer })
    }

    pub fn log(&mut self, m: &LmEpochMetrics) -> Result<()> {
        self.writer.serialize(m)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Final figures of a pretraining run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PretrainSummary {
    pub best_epoch:    usize,
    pub best_val_loss: f64,
    pub test_loss:     f64,
    pub epochs_run:    usize,
}

impl PretrainSummary {
    pub fn render(&self) -> String {
        format!(
            "best epoch:     {}\n\
             best val loss:  {:.4}\n\
             best val ppl:   {:.2}\n\
             test loss:      {:.4}\n\
             test ppl:       {:.2}\n\
             epochs run:     {}\n",
            self.best_epoch,
            self.best_val_loss,
            perplexity(self.best_val_loss),
            self.test_loss,
            perplexity(self.test_loss),
            self.epochs_run,
        )
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.render())
            .with_context(|| format!("Cannot write summary to '{}'", path.display()))
    }
}

/// exp(loss), the usual language-model figure.
pub fn perplexity(loss: f64) -> f64 {
    loss.exp()
}

/// Per-batch bar used by both training loops.
pub fn progress_bar(len: usize, prefix: impl Into<String>) -> ProgressBar {
    let pb    = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template(
        "  {prefix} {bar:30.green/black} {pos}/{len} [{elapsed}<{eta}] {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_prefix(prefix.into());
    pb
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn row(epoch: usize, val_loss: f64) -> EpochMetrics {
        EpochMetrics {
            epoch,
            stage: epoch,
            trainable_groups: "---#".into(),
            lr: 1e-3,
            train_loss: 0.7,
            train_acc: 0.5,
            val_loss,
            val_acc: 0.6,
        }
    }

    #[test]
    fn test_is_improvement() {
        let m = row(2, 2.3);
        // 2.3 < 3.0 → this is an improvement
        assert!(m.is_improvement(3.0));
        assert!(!m.is_improvement(2.0));
    }

    #[test]
    fn test_logger_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = MetricsLogger::create(dir.path()).unwrap();
        logger.log(&row(1, 0.69)).unwrap();
        logger.log(&row(2, 0.55)).unwrap();
        assert!((logger.best_val_loss() - 0.55).abs() < 1e-12);

        let text  = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "epoch,stage,trainable_groups,lr,train_loss,train_acc,val_loss,val_acc"
        );
        assert!(lines[1].starts_with("1,1,---#,"));
    }

    #[test]
    fn test_summary_mentions_perplexity() {
        let summary = PretrainSummary {
            best_epoch: 3,
            best_val_loss: 1.0,
            test_loss: 0.0,
            epochs_run: 4,
        };
        let text = summary.render();
        assert!(text.contains("best val ppl:   2.72"));
        assert!(text.contains("test ppl:       1.00"));
    }
}
