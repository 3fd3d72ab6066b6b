//! Trial evidence sheet.
//!
//! One sheet covers every subject.  A subject `S` owns the columns whose
//! header starts with `S_`; among them `S_tag` (prompt class), `S_start` and
//! `S_stop` (trial bounds in milliseconds from recording start).  The last
//! of the subject's columns flags usable trials: only rows where it equals 1
//! are kept, in sheet order.
//!
//! `.xlsx` / `.xls` / `.ods` are read with `calamine`, `.csv` with `csv`.
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use calamine::{open_workbook_auto, Reader};

/// One usable trial of one subject.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialMark {
    pub tag: u32,
    pub start_ms: f64,
    pub stop_ms: f64,
}

/// The evidence sheet as header + string cells.
#[derive(Debug, Clone, Default)]
pub struct EvidenceSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl EvidenceSheet {
    /// Load the first worksheet of a spreadsheet, or a CSV file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Self::from_csv(path),
            "xlsx" | "xlsm" | "xls" | "ods" => Self::from_workbook(path),
            other => bail!("{}: unsupported evidence format '{other}'", path.display()),
        }
    }

    fn from_workbook(path: &Path) -> Result<Self> {
        let mut wb = open_workbook_auto(path)
            .with_context(|| format!("open workbook {}", path.display()))?;
        let range = wb
            .worksheet_range_at(0)
            .ok_or_else(|| anyhow!("{}: workbook has no sheets", path.display()))?
            .with_context(|| format!("read first sheet of {}", path.display()))?;

        let mut rows = range.rows().map(|r| r.iter().map(|c| c.to_string()).collect::<Vec<_>>());
        let headers = rows.next().unwrap_or_default();
        Ok(Self { headers, rows: rows.collect() })
    }

    fn from_csv(path: &Path) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("open {}", path.display()))?;
        let headers = rdr.headers()?.iter().map(String::from).collect();
        let rows = rdr
            .records()
            .map(|r| r.map(|rec| rec.iter().map(String::from).collect()))
            .collect::<std::result::Result<Vec<Vec<String>>, _>>()
            .with_context(|| format!("parse {}", path.display()))?;
        Ok(Self { headers, rows })
    }

    /// Column indices owned by `subject`, in sheet order.
    pub fn subject_columns(&self, subject: &str) -> Vec<usize> {
        let prefix = format!("{subject}_");
        self.headers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.trim().starts_with(&prefix))
            .map(|(i, _)| i)
            .collect()
    }

    /// Usable trials of `subject`, in sheet order.
    pub fn trials_for(&self, subject: &str) -> Result<Vec<TrialMark>> {
        let cols = self.subject_columns(subject);
        let Some(&flag_col) = cols.last() else {
            bail!("evidence sheet has no columns for subject {subject}");
        };
        let find = |suffix: &str| -> Result<usize> {
            let name = format!("{subject}_{suffix}");
            cols.iter()
                .copied()
                .find(|&i| self.headers[i].trim() == name)
                .ok_or_else(|| anyhow!("evidence sheet is missing column {name}"))
        };
        let (tag_col, start_col, stop_col) = (find("tag")?, find("start")?, find("stop")?);

        let mut marks = Vec::new();
        for (r, row) in self.rows.iter().enumerate() {
            if cell_number(row, flag_col) != Some(1.0) {
                continue;
            }
            let number = |col: usize, what: &str| {
                cell_number(row, col)
                    .ok_or_else(|| anyhow!("{subject}: row {} has no numeric {what}", r + 2))
            };
            let tag = number(tag_col, "tag")?;
            if tag < 0.0 || tag.fract() != 0.0 {
                bail!("{subject}: row {} has non-integer tag {tag}", r + 2);
            }
            marks.push(TrialMark {
                tag: tag as u32,
                start_ms: number(start_col, "start")?,
                stop_ms: number(stop_col, "stop")?,
            });
        }
        Ok(marks)
    }
}

fn cell_number(row: &[String], col: usize) -> Option<f64> {
    row.get(col).and_then(|s| s.trim().parse::<f64>().ok())
}
