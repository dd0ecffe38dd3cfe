//! Safetensors I/O for labeled epoch sets.
//!
//! One file holds one (subject, experiment) pair:
//!
//! | tensor   | dtype      | shape       |
//! |----------|------------|-------------|
//! | `epochs` | F64 or F32 | `[N, C, T]` |
//! | `labels` | I32        | `[N]`       |
//!
//! The reader only needs raw little-endian bytes → ndarray, so the header is
//! parsed directly with `serde_json`.
use anyhow::{bail, ensure, Context, Result};
use ndarray::Array3;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

// ── Low-level safetensors parser ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TensorEntry {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: [usize; 2],
}

fn parse_header(bytes: &[u8]) -> Result<(HashMap<String, TensorEntry>, usize)> {
    ensure!(bytes.len() >= 8, "safetensors file too small ({} bytes)", bytes.len());
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[..8]);
    let n = u64::from_le_bytes(len) as usize;
    let end = 8usize.checked_add(n).filter(|&e| e <= bytes.len()).context("header length exceeds file size")?;

    let raw: HashMap<String, serde_json::Value> =
        serde_json::from_slice(&bytes[8..end]).context("failed to parse safetensors header")?;
    let mut header = HashMap::new();
    for (name, value) in raw {
        if name == "__metadata__" {
            continue;
        }
        let entry: TensorEntry =
            serde_json::from_value(value).with_context(|| format!("malformed header entry '{name}'"))?;
        header.insert(name, entry);
    }
    Ok((header, end))
}

fn tensor_bytes<'a>(bytes: &'a [u8], data_start: usize, entry: &TensorEntry, elem: usize) -> Result<&'a [u8]> {
    let [s, e] = entry.data_offsets;
    let (Some(start), Some(end)) = (data_start.checked_add(s), data_start.checked_add(e)) else {
        bail!("tensor offsets {s}..{e} overflow");
    };
    ensure!(start <= end && end <= bytes.len(), "tensor offsets {s}..{e} out of range");
    let raw = &bytes[start..end];
    let Some(need) = entry.shape.iter().try_fold(elem, |acc, &d| acc.checked_mul(d)) else {
        bail!("shape {:?} overflows", entry.shape);
    };
    ensure!(
        raw.len() == need,
        "tensor holds {} bytes, shape {:?} needs {}",
        raw.len(),
        entry.shape,
        need
    );
    Ok(raw)
}

fn read_float_tensor(bytes: &[u8], data_start: usize, entry: &TensorEntry) -> Result<Vec<f64>> {
    match entry.dtype.as_str() {
        "F64" => Ok(tensor_bytes(bytes, data_start, entry, 8)?
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect()),
        "F32" => Ok(tensor_bytes(bytes, data_start, entry, 4)?
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect()),
        other => bail!("unsupported float dtype {other}"),
    }
}

fn read_i32_tensor(bytes: &[u8], data_start: usize, entry: &TensorEntry) -> Result<Vec<i32>> {
    ensure!(entry.dtype == "I32", "expected I32 labels, found {}", entry.dtype);
    Ok(tensor_bytes(bytes, data_start, entry, 4)?
        .chunks_exact(4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

// ── Epoch sets ───────────────────────────────────────────────────────────────

/// Epochs `[N, C, T]` and their labels as stored on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSet {
    pub epochs: Array3<f64>,
    pub labels: Vec<i32>,
}

impl EpochSet {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let (header, data_start) = parse_header(&bytes)?;

        let epochs_entry = header.get("epochs").context("missing 'epochs' tensor")?;
        let shape = match epochs_entry.shape.as_slice() {
            &[n, c, t] => (n, c, t),
            other => bail!("'epochs' must be 3-D, got shape {other:?}"),
        };
        let data = read_float_tensor(&bytes, data_start, epochs_entry)?;
        let epochs = Array3::from_shape_vec(shape, data)?;

        let labels_entry = header.get("labels").context("missing 'labels' tensor")?;
        let labels = read_i32_tensor(&bytes, data_start, labels_entry)?;
        ensure!(
            labels.len() == shape.0,
            "{} labels for {} epochs in {}",
            labels.len(),
            shape.0,
            path.display()
        );

        Ok(EpochSet { epochs, labels })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        ensure!(self.labels.len() == self.epochs.dim().0, "label count does not match epoch count");
        let (n, c, t) = self.epochs.dim();
        let mut w = StWriter::new();
        w.add_f64("epochs", &self.epochs.iter().copied().collect::<Vec<_>>(), &[n, c, t]);
        w.add_i32("labels", &self.labels, &[n]);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        w.write(path)
    }
}

// ── Generic safetensors builder ───────────────────────────────────────────────

/// Safetensors writer for F32, F64 and I32 tensors.
///
/// ```rust,no_run
/// use cspbci::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("epochs", &[1.0f64, 2.0, 3.0, 4.0], &[1, 2, 2]);
/// w.add_i32("labels", &[1], &[1]);
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores written as F32 load back widened to f64.
    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F32", shape.to_vec()));
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I32", shape.to_vec()));
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let mut header_map = serde_json::Map::new();
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(
                name.clone(),
                serde_json::json!({
                    "dtype": dtype,
                    "shape": shape,
                    "data_offsets": [offset, offset + data.len()],
                }),
            );
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let padded: Vec<u8> = hdr_bytes.into_iter().chain(std::iter::repeat(b' ').take(pad)).collect();
        let mut f = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        f.write_all(&(padded.len() as u64).to_le_bytes())?;
        f.write_all(&padded)?;
        for (_, data, _, _) in &self.entries {
            f.write_all(data)?;
        }
        Ok(())
    }
}
