//! Point arrays in the frame the fused boxes are expressed in.
//!
//! Points are `(x, y, z, intensity)`. Sensor points are brought into this
//! frame by a 180 degree turn about z (x and y negated). Clouds without an
//! intensity channel get zeros. On disk the layout is the KITTI `.bin`
//! format: consecutive little-endian `f32` quadruples. `boxfuse convert`
//! turns ASCII sensor dumps into that format.

use std::io::{self, BufRead, Read, Write};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<[f64; 4]>,
}

fn rotate_half_turn(x: f64, y: f64) -> (f64, f64) {
    (-x, -y)
}

impl PointCloud {
    /// Converts sensor `(x, y, z)` points, appending zero intensity.
    pub fn from_xyz(points: &[[f64; 3]]) -> Self {
        Self {
            points: points
                .iter()
                .map(|&[x, y, z]| {
                    let (x, y) = rotate_half_turn(x, y);
                    [x, y, z, 0.0]
                })
                .collect(),
        }
    }

    /// Converts sensor `(x, y, z, intensity)` points.
    pub fn from_xyzi(points: &[[f64; 4]]) -> Self {
        Self {
            points: points
                .iter()
                .map(|&[x, y, z, i]| {
                    let (x, y) = rotate_half_turn(x, y);
                    [x, y, z, i]
                })
                .collect(),
        }
    }

    /// Reads sensor points from text, one point per line as `x y z` or
    /// `x y z intensity` (spaces or commas). Blank lines and `#` comments
    /// are skipped. Every point must have the same number of columns.
    pub fn read_text<R: BufRead>(input: R) -> io::Result<Self> {
        let mut xyz = Vec::new();
        let mut xyzi = Vec::new();
        for (n, line) in input.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let values = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::parse::<f64>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| invalid(format!("line {}: {}", n + 1, e)))?;
            match (values.as_slice(), xyz.is_empty(), xyzi.is_empty()) {
                (&[x, y, z], _, true) => xyz.push([x, y, z]),
                (&[x, y, z, i], true, _) => xyzi.push([x, y, z, i]),
                _ => {
                    return Err(invalid(format!(
                        "line {}: expected the same 3 or 4 columns on every line, got {}",
                        n + 1,
                        values.len()
                    )));
                }
            }
        }
        if xyzi.is_empty() {
            Ok(Self::from_xyz(&xyz))
        } else {
            Ok(Self::from_xyzi(&xyzi))
        }
    }

    pub fn points(&self) -> &[[f64; 4]] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn write_bin<W: Write>(&self, mut out: W) -> io::Result<()> {
        for p in &self.points {
            for v in p {
                out.write_all(&(*v as f32).to_le_bytes())?;
            }
        }
        out.flush()
    }

    /// Reads points already in this frame; no rotation is applied.
    pub fn read_bin<R: Read>(mut input: R) -> io::Result<Self> {
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        if bytes.len() % 16 != 0 {
            return Err(invalid(format!(
                "{} bytes is not a whole number of points",
                bytes.len()
            )));
        }
        let points = bytes
            .chunks_exact(16)
            .map(|chunk| {
                let mut p = [0.0; 4];
                for (slot, raw) in p.iter_mut().zip(chunk.chunks_exact(4)) {
                    *slot = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64;
                }
                p
            })
            .collect();
        Ok(Self { points })
    }
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
