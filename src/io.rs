//! Safetensors I/O for every intermediate array of the pipeline.
//!
//! Trials, assembled datasets, feature splits, normalisation statistics and
//! training histories are all written as plain safetensors files:
//!
//! ```text
//! ┌──────────┬──────────────────────────────┬──────────────────────┐
//! │ u64 LE n │ JSON header (n bytes, padded)│ tensor bytes (LE)    │
//! └──────────┴──────────────────────────────┴──────────────────────┘
//! ```
//!
//! String lists (channel and subject names) are stored as `U8` tensors of
//! newline-separated UTF-8.
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, bail, ensure, Context, Result};
use ndarray::{Array, Array1, Array2, Array3, ArrayD, Dimension, IxDyn};

use crate::dataset::{Dataset, LabeledSet, SubjectRange};
use crate::normalize::{FittedStats, MeanStdStats, MinMaxStats};
use crate::segment::Trial;

// ── Writer ──────────────────────────────────────────────────────────────────

/// Safetensors file builder for F32, I32, U32 and U8 tensors.
///
/// ```rust,no_run
/// use imspeech::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f32("signal", &[1.0f32, 2.0, 3.0], &[1, 3]);
/// w.add_u32("labels", &[0, 4, 10], &[3]);
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
    metadata: BTreeMap<String, String>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F32", shape.to_vec()));
    }

    /// Add an array of any dimensionality (logical row-major order).
    pub fn add_f32_array<D: Dimension>(&mut self, name: &str, arr: &Array<f32, D>) {
        let data: Vec<f32> = arr.iter().copied().collect();
        self.add_f32(name, &data, arr.shape());
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I32", shape.to_vec()));
    }

    pub fn add_u32(&mut self, name: &str, data: &[u32], shape: &[usize]) {
        let bytes = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "U32", shape.to_vec()));
    }

    pub fn add_str_list(&mut self, name: &str, items: &[String]) {
        let bytes = items.join("\n").into_bytes();
        let len = bytes.len();
        self.entries.push((name.to_string(), bytes, "U8", vec![len]));
    }

    /// Free-form `__metadata__` entry.
    pub fn add_metadata(&mut self, key: &str, value: &str) {
        self.metadata.insert(key.to_string(), value.to_string());
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let mut header = serde_json::Map::new();
        if !self.metadata.is_empty() {
            header.insert("__metadata__".into(), serde_json::json!(self.metadata));
        }
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header.insert(name.clone(), serde_json::json!({
                "dtype": dtype,
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let mut hdr = serde_json::to_vec(&header)?;
        let pad = (8 - hdr.len() % 8) % 8;
        hdr.extend(std::iter::repeat(b' ').take(pad));

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let mut f = std::fs::File::create(path)
            .with_context(|| format!("create {}", path.display()))?;
        f.write_all(&(hdr.len() as u64).to_le_bytes())?;
        f.write_all(&hdr)?;
        for (_, data, _, _) in &self.entries {
            f.write_all(data)?;
        }
        Ok(())
    }
}

// ── Reader ──────────────────────────────────────────────────────────────────

/// A safetensors file loaded into memory.
pub struct StFile {
    header: serde_json::Map<String, serde_json::Value>,
    bytes: Vec<u8>,
    data_start: usize,
}

impl StFile {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        ensure!(bytes.len() >= 8, "{}: safetensors file too small", path.display());
        let n = u64::from_le_bytes(bytes[..8].try_into()?) as usize;
        ensure!(bytes.len() >= 8 + n, "{}: truncated safetensors header", path.display());
        let header: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&bytes[8..8 + n])
                .with_context(|| format!("parse safetensors header of {}", path.display()))?;
        Ok(Self { header, bytes, data_start: 8 + n })
    }

    /// Tensor names (metadata excluded).
    pub fn names(&self) -> Vec<&str> {
        self.header.keys().filter(|k| *k != "__metadata__").map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.header.contains_key(name)
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.header.get("__metadata__")?.get(key)?.as_str()
    }

    fn entry(&self, name: &str) -> Result<(&str, Vec<usize>, &[u8])> {
        let e = self.header.get(name).ok_or_else(|| anyhow!("missing tensor '{name}'"))?;
        let dtype = e["dtype"].as_str().ok_or_else(|| anyhow!("'{name}': no dtype"))?;
        let shape = e["shape"]
            .as_array()
            .ok_or_else(|| anyhow!("'{name}': no shape"))?
            .iter()
            .map(|v| v.as_u64().map(|d| d as usize))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| anyhow!("'{name}': malformed shape"))?;
        let offs = e["data_offsets"].as_array().ok_or_else(|| anyhow!("'{name}': no offsets"))?;
        let (s, end) = match (offs.first().and_then(|v| v.as_u64()), offs.get(1).and_then(|v| v.as_u64())) {
            (Some(s), Some(e)) => (s as usize, e as usize),
            _ => bail!("'{name}': malformed data_offsets"),
        };
        let raw = self
            .bytes
            .get(self.data_start + s..self.data_start + end)
            .ok_or_else(|| anyhow!("'{name}': data out of bounds"))?;
        Ok((dtype, shape, raw))
    }

    pub fn f32_array(&self, name: &str) -> Result<ArrayD<f32>> {
        let (dtype, shape, raw) = self.entry(name)?;
        ensure!(dtype == "F32", "'{name}': expected F32, found {dtype}");
        let data: Vec<f32> = raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(ArrayD::from_shape_vec(IxDyn(&shape), data)?)
    }

    pub fn u32_vec(&self, name: &str) -> Result<(Vec<u32>, Vec<usize>)> {
        let (dtype, shape, raw) = self.entry(name)?;
        let data = match dtype {
            "U32" => raw.chunks_exact(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]])).collect(),
            "I32" => raw
                .chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as u32)
                .collect(),
            other => bail!("'{name}': expected U32, found {other}"),
        };
        Ok((data, shape))
    }

    pub fn str_list(&self, name: &str) -> Result<Vec<String>> {
        let (dtype, _, raw) = self.entry(name)?;
        ensure!(dtype == "U8", "'{name}': expected U8, found {dtype}");
        let s = std::str::from_utf8(raw)?;
        Ok(s.split('\n').filter(|s| !s.is_empty()).map(String::from).collect())
    }

    pub fn scalar_f32(&self, name: &str) -> Result<f32> {
        self.f32_array(name)?
            .iter()
            .next()
            .copied()
            .ok_or_else(|| anyhow!("'{name}': empty tensor"))
    }

    pub fn scalar_u32(&self, name: &str) -> Result<u32> {
        self.u32_vec(name)?.0.first().copied().ok_or_else(|| anyhow!("'{name}': empty tensor"))
    }
}

// ── Trials ──────────────────────────────────────────────────────────────────

pub fn save_trial(trial: &Trial, path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    w.add_f32_array("data", &trial.data);
    w.add_str_list("ch_names", &trial.ch_names);
    w.add_f32("sfreq", &[trial.sfreq], &[1]);
    w.add_u32("tag", &[trial.tag], &[1]);
    w.add_u32("index", &[trial.index as u32], &[1]);
    w.add_metadata("subject", &trial.subject);
    w.write(path)
}

pub fn load_trial(path: &Path) -> Result<Trial> {
    let st = StFile::open(path)?;
    let data = st
        .f32_array("data")?
        .into_dimensionality()
        .with_context(|| format!("{}: trial data is not 2-D", path.display()))?;
    Ok(Trial {
        subject: st.metadata("subject").unwrap_or_default().to_string(),
        index: st.scalar_u32("index")? as usize,
        tag: st.scalar_u32("tag")?,
        sfreq: st.scalar_f32("sfreq")?,
        ch_names: st.str_list("ch_names")?,
        data,
    })
}

// ── Assembled dataset ───────────────────────────────────────────────────────

pub fn save_dataset(ds: &Dataset, path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    w.add_f32_array("x", &ds.x);
    w.add_u32("y", &ds.y.to_vec(), &[ds.y.len()]);
    w.add_str_list("ch_names", &ds.ch_names);
    w.add_f32("sfreq", &[ds.sfreq], &[1]);
    let names: Vec<String> = ds.subjects.iter().map(|s| s.name.clone()).collect();
    let bounds: Vec<u32> = ds
        .subjects
        .iter()
        .flat_map(|s| [s.start as u32, s.stop as u32])
        .collect();
    w.add_str_list("subjects", &names);
    w.add_u32("subject_bounds", &bounds, &[names.len(), 2]);
    w.write(path)
}

pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let st = StFile::open(path)?;
    let x: Array3<f32> = st
        .f32_array("x")?
        .into_dimensionality()
        .with_context(|| format!("{}: 'x' is not 3-D", path.display()))?;
    let (y, _) = st.u32_vec("y")?;
    let names = st.str_list("subjects")?;
    let (bounds, _) = st.u32_vec("subject_bounds")?;
    ensure!(bounds.len() == 2 * names.len(), "{}: subject table is inconsistent", path.display());
    let subjects = names
        .into_iter()
        .zip(bounds.chunks_exact(2))
        .map(|(name, b)| SubjectRange { name, start: b[0] as usize, stop: b[1] as usize })
        .collect();
    Ok(Dataset {
        x,
        y: Array1::from(y),
        ch_names: st.str_list("ch_names")?,
        sfreq: st.scalar_f32("sfreq")?,
        subjects,
    })
}

// ── Feature splits ──────────────────────────────────────────────────────────

pub fn save_labeled_set(set: &LabeledSet, path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    w.add_f32_array("x", &set.x);
    w.add_u32("y", &set.y.to_vec(), &[set.y.len()]);
    w.write(path)
}

pub fn load_labeled_set(path: &Path) -> Result<LabeledSet> {
    let st = StFile::open(path)?;
    let x: Array3<f32> = st
        .f32_array("x")?
        .into_dimensionality()
        .with_context(|| format!("{}: 'x' is not 3-D", path.display()))?;
    let (y, _) = st.u32_vec("y")?;
    LabeledSet::new(x, Array1::from(y))
}

pub fn save_stats(stats: &FittedStats, path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    match stats {
        FittedStats::MeanStd(s) => {
            w.add_f32_array("mean", &s.mean);
            w.add_f32_array("std", &s.std);
        }
        FittedStats::MinMax(s) => {
            w.add_f32_array("min", &s.min);
            w.add_f32_array("max", &s.max);
        }
        FittedStats::MinMaxRange(s, (lo, hi)) => {
            w.add_f32_array("min", &s.min);
            w.add_f32_array("max", &s.max);
            w.add_f32("range", &[*lo, *hi], &[2]);
        }
    }
    w.write(path)
}

pub fn load_stats(path: &Path) -> Result<FittedStats> {
    let st = StFile::open(path)?;
    if st.contains("mean") {
        return Ok(FittedStats::MeanStd(MeanStdStats { mean: st.f32_array("mean")?, std: st.f32_array("std")? }));
    }
    let mm = MinMaxStats { min: st.f32_array("min")?, max: st.f32_array("max")? };
    if st.contains("range") {
        let r = st.f32_array("range")?;
        ensure!(r.len() == 2, "{}: 'range' must hold two values", path.display());
        let r: Vec<f32> = r.iter().copied().collect();
        return Ok(FittedStats::MinMaxRange(mm, (r[0], r[1])));
    }
    Ok(FittedStats::MinMax(mm))
}

/// Write named 2-D / 3-D f32 arrays (histories, predictions) to one file.
pub fn save_arrays(arrays: &[(&str, ArrayD<f32>)], path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    for (name, arr) in arrays {
        w.add_f32_array(name, arr);
    }
    w.write(path)
}

/// Convenience for 2-D arrays read back from [`save_arrays`].
pub fn load_array2(path: &Path, name: &str) -> Result<Array2<f32>> {
    Ok(StFile::open(path)?.f32_array(name)?.into_dimensionality()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Array2};

    #[test]
    fn writer_reader_roundtrip_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("t.safetensors");
        let a = Array2::from_shape_fn((2, 3), |(i, j)| (i * 3 + j) as f32);
        let mut w = StWriter::new();
        w.add_f32_array("a", &a);
        w.add_u32("labels", &[1, 2, 3], &[3]);
        w.add_str_list("names", &["Fp1".to_string(), "Fp2".to_string()]);
        w.add_metadata("subject", "MM05");
        w.write(&p).unwrap();

        let st = StFile::open(&p).unwrap();
        assert_eq!(st.f32_array("a").unwrap(), a.into_dyn());
        assert_eq!(st.u32_vec("labels").unwrap().0, vec![1, 2, 3]);
        assert_eq!(st.str_list("names").unwrap(), vec!["Fp1", "Fp2"]);
        assert_eq!(st.metadata("subject"), Some("MM05"));
        assert!(!st.names().contains(&"__metadata__"));
    }

    #[test]
    fn header_is_eight_byte_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("pad.safetensors");
        let mut w = StWriter::new();
        w.add_f32("x", &[1.0], &[1]);
        w.write(&p).unwrap();
        let bytes = std::fs::read(&p).unwrap();
        let n = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;
        assert_eq!(n % 8, 0);
    }

    #[test]
    fn wrong_dtype_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("d.safetensors");
        let mut w = StWriter::new();
        w.add_u32("y", &[1], &[1]);
        w.write(&p).unwrap();
        assert!(StFile::open(&p).unwrap().f32_array("y").is_err());
    }

    #[test]
    fn labeled_set_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("train.safetensors");
        let set = LabeledSet::new(
            Array3::from_shape_fn((2, 3, 3), |(n, i, j)| (n + i + j) as f32),
            arr1(&[5, 6]),
        )
        .unwrap();
        save_labeled_set(&set, &p).unwrap();
        let back = load_labeled_set(&p).unwrap();
        assert_eq!(back.x, set.x);
        assert_eq!(back.y, set.y);
    }
}
