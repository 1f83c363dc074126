//! CSV tables of detections: `filename,label,scores,x,y,z,l,w,h,r`.

use crate::detections::{Detection, RawBatch};
use crate::error::FusionError;
use crate::geometry::OrientedBox;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const COLUMNS: [&str; 10] = ["filename", "label", "scores", "x", "y", "z", "l", "w", "h", "r"];

/// One detection (input) or one fused box (output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRow {
    /// Scene identifier, usually the point-cloud file the boxes belong to.
    pub filename: String,
    #[serde(deserialize_with = "integral_label")]
    pub label: i64,
    pub scores: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub l: f64,
    pub w: f64,
    pub h: f64,
    pub r: f64,
}

// Dataframe exports often write integer labels as `1.0`.
fn integral_label<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let v = f64::deserialize(d)?;
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    if v.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(&v) {
        Ok(v as i64)
    } else {
        Err(serde::de::Error::custom(format!(
            "label must be an integer, got {}",
            v
        )))
    }
}

impl DetectionRow {
    pub fn bbox(&self) -> [f64; 7] {
        [self.x, self.y, self.z, self.l, self.w, self.h, self.r]
    }

    /// Checks the numeric invariants a row must hold before fusion.
    pub fn check(&self) -> Result<(), String> {
        if !self.scores.is_finite() || !(0.0..=1.0).contains(&self.scores) {
            return Err(format!("score {} outside [0, 1]", self.scores));
        }
        if let Some(i) = self.bbox().iter().position(|v| !v.is_finite()) {
            return Err(format!("non-finite value in column '{}'", COLUMNS[3 + i]));
        }
        Ok(())
    }
}

impl From<&Detection> for DetectionRow {
    fn from(d: &Detection) -> Self {
        let [x, y, z, l, w, h, r] = d.bbox.to_array();
        Self {
            filename: d.scene_id.clone(),
            label: d.class_label,
            scores: d.confidence,
            x,
            y,
            z,
            l,
            w,
            h,
            r,
        }
    }
}

impl From<&DetectionRow> for Detection {
    fn from(row: &DetectionRow) -> Self {
        Detection::new(
            row.filename.clone(),
            row.label,
            row.scores,
            OrientedBox::from_array(row.bbox()),
        )
    }
}

/// A row that could not be used, attributed to its scene where possible.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct RejectedRow {
    pub scene_id: String,
    pub line: u64,
    pub reason: String,
}

/// All rows one model produced, across scenes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionTable {
    pub source: Option<PathBuf>,
    pub rows: Vec<DetectionRow>,
    pub rejected: Vec<RejectedRow>,
}

impl DetectionTable {
    pub fn from_rows(rows: Vec<DetectionRow>) -> Self {
        Self {
            source: None,
            rows,
            rejected: Vec::new(),
        }
    }

    /// Label used in messages: the file name if the table came from disk.
    pub fn name(&self) -> String {
        self.source
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.rejected.is_empty()
    }

    /// Distinct scene ids, including those seen only on rejected rows.
    pub fn scene_ids(&self) -> BTreeSet<&str> {
        self.rows
            .iter()
            .map(|r| r.filename.as_str())
            .chain(self.rejected.iter().map(|r| r.scene_id.as_str()))
            .collect()
    }

    pub fn rows_for<'a>(
        &'a self,
        scene_id: &'a str,
    ) -> impl Iterator<Item = &'a DetectionRow> + 'a {
        self.rows.iter().filter(move |r| r.filename == scene_id)
    }

    pub fn rejected_for<'a>(
        &'a self,
        scene_id: &'a str,
    ) -> impl Iterator<Item = &'a RejectedRow> + 'a {
        self.rejected.iter().filter(move |r| r.scene_id == scene_id)
    }

    /// The parallel arrays of one scene, in row order.
    pub fn batch_for(&self, scene_id: &str) -> RawBatch {
        let mut batch = RawBatch::default();
        for row in self.rows_for(scene_id) {
            batch.push(row.bbox(), row.scores, row.label);
        }
        batch
    }

    pub fn read_path(path: impl AsRef<Path>) -> Result<Self, FusionError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| FusionError::io(path, e))?;
        let mut table = Self::read(file, path)?;
        table.source = Some(path.to_path_buf());
        Ok(table)
    }

    /// Reads a table. Rows that fail to parse, are not valid UTF-8, or
    /// violate row invariants are kept aside in `rejected` instead of failing
    /// the whole file; only a missing column or an unreadable stream is
    /// fatal.
    pub fn read<R: Read>(input: R, origin: &Path) -> Result<Self, FusionError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(input);
        let headers = reader
            .byte_headers()
            .map_err(|e| FusionError::csv(origin, e))?
            .clone();
        for column in COLUMNS {
            if !headers.iter().any(|h| h == column.as_bytes()) {
                return Err(FusionError::MissingColumn {
                    path: origin.to_path_buf(),
                    column,
                });
            }
        }
        let scene_col = headers.iter().position(|h| h == &b"filename"[..]).unwrap_or(0);

        let mut table = Self::default();
        for record in reader.byte_records() {
            let record = record.map_err(|e| FusionError::csv(origin, e))?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let scene_id = String::from_utf8_lossy(record.get(scene_col).unwrap_or_default())
                .into_owned();
            let parsed = record
                .deserialize::<DetectionRow>(Some(&headers))
                .map_err(|e| e.to_string())
                .and_then(|row| row.check().map(|_| row));
            match parsed {
                Ok(row) => table.rows.push(row),
                Err(reason) => {
                    tracing::debug!(line, %scene_id, %reason, "rejected row");
                    table.rejected.push(RejectedRow {
                        scene_id,
                        line,
                        reason,
                    });
                }
            }
        }
        Ok(table)
    }
}

/// Writes rows with the standard header.
pub fn write_rows<W: Write>(output: W, rows: &[DetectionRow]) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(output);
    writer.write_record(COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_rows_path(path: impl AsRef<Path>, rows: &[DetectionRow]) -> Result<(), FusionError> {
    let path = path.as_ref();
    let file = std::fs::File::create(path).map_err(|e| FusionError::io(path, e))?;
    write_rows(file, rows).map_err(|e| FusionError::csv(path, e))
}
