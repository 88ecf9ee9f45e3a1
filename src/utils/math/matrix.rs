use serde::{Deserialize, Serialize};

use crate::error::{Result, TopicError};
use crate::utils::math::vector;

/// Dense row-major f64 matrix
/// θ (documents x topics) と φ (topics x vocabulary) の両方に使う
/// 読み込み時は `from_vec` を通して形状を検査する
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRowMatrix")]
pub struct RowMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

#[derive(Deserialize)]
struct RawRowMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl TryFrom<RawRowMatrix> for RowMatrix {
    type Error = TopicError;

    fn try_from(raw: RawRowMatrix) -> Result<Self> {
        Self::from_vec(raw.rows, raw.cols, raw.data)
    }
}

impl RowMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build from a flat row-major buffer
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(TopicError::invalid_input(format!(
                "matrix buffer has {} values, expected {} x {}",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from nested rows; every row must have the same length
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let cols = rows.first().map_or(0, |r| r.len());
        let n_rows = rows.len();
        let mut data = Vec::with_capacity(n_rows * cols);
        for (idx, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(TopicError::invalid_input(format!(
                    "row {} has {} columns, expected {}",
                    idx,
                    row.len(),
                    cols
                )));
            }
            data.extend(row);
        }
        Ok(Self {
            rows: n_rows,
            cols,
            data,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn row(&self, idx: usize) -> &[f64] {
        &self.data[idx * self.cols..(idx + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, idx: usize) -> &mut [f64] {
        &mut self.data[idx * self.cols..(idx + 1) * self.cols]
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.rows).map(move |idx| self.row(idx))
    }

    /// Normalize each row to sum to one
    /// Rows with zero mass become uniform.
    pub fn normalize_rows(&mut self) {
        let cols = self.cols;
        for idx in 0..self.rows {
            let row = self.row_mut(idx);
            if !vector::normalize_in_place(row) && cols > 0 {
                row.fill(1.0 / cols as f64);
            }
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}
