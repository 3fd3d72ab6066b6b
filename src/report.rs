//! CSV reports: epoch history, per-batch history, confusion matrix.
use std::path::Path;

use anyhow::{Context, Result};

use crate::evaluate::ConfusionMatrix;
use crate::trainer::History;

pub fn write_history_csv(history: &History, path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    w.write_record(["epoch", "train_loss", "train_acc", "test_loss", "test_acc"])?;
    for e in 0..history.epochs() {
        w.write_record([
            (e + 1).to_string(),
            history.train[[0, e]].to_string(),
            history.train[[1, e]].to_string(),
            history.test[[0, e]].to_string(),
            history.test[[1, e]].to_string(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_batch_history_csv(history: &History, path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    w.write_record(["epoch", "batch", "d_real", "d_fake", "g_loss", "g_acc"])?;
    for e in 0..history.epochs() {
        for b in 0..history.batches_per_epoch() {
            w.write_record([
                (e + 1).to_string(),
                (b + 1).to_string(),
                history.d_real[[b, e]].to_string(),
                history.d_fake[[b, e]].to_string(),
                history.batch[[0, b, e]].to_string(),
                history.batch[[1, b, e]].to_string(),
            ])?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Rows are true classes, columns predicted classes, followed by per-class
/// precision / recall and a summary line.
pub fn write_confusion_csv(cm: &ConfusionMatrix, path: &Path) -> Result<()> {
    let k = cm.n_classes();
    let mut w = csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;

    let mut header = vec!["true\\pred".to_string()];
    header.extend((0..k).map(|c| c.to_string()));
    header.extend(["precision".to_string(), "recall".to_string()]);
    w.write_record(&header)?;

    for t in 0..k {
        let mut row = vec![t.to_string()];
        row.extend(cm.counts.row(t).iter().map(u64::to_string));
        row.push(format!("{:.4}", cm.precision(t)));
        row.push(format!("{:.4}", cm.recall(t)));
        w.write_record(&row)?;
    }

    let mut summary = vec!["macro".to_string()];
    summary.extend(std::iter::repeat(String::new()).take(k));
    summary.push(format!("{:.4}", cm.precision_macro()));
    summary.push(format!("{:.4}", cm.recall_macro()));
    w.write_record(&summary)?;
    w.flush()?;
    Ok(())
}
