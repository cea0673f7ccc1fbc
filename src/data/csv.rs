//! CSV image loader
//!
//! The EMNIST CSV export has one image per row: the class label in the
//! first column followed by the 784 pixel intensities, without a header.
//! Header rows are detected and skipped; the label column can also be the
//! last one for hand-made files.

use crate::core::{Result, SVMError, Sample, SparseVector};
use crate::data::ImageDataset;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Position of the label within a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelColumn {
    First,
    Last,
}

impl Default for LabelColumn {
    fn default() -> Self {
        Self::First
    }
}

/// Options for [`CsvImageReader`]
#[derive(Debug, Clone, Copy)]
pub struct CsvImageReader {
    label_column: LabelColumn,
    /// Required features per row; inferred from the widest row when `None`
    expected_dim: Option<usize>,
}

impl Default for CsvImageReader {
    fn default() -> Self {
        Self {
            label_column: LabelColumn::First,
            expected_dim: Some(crate::data::IMAGE_PIXELS),
        }
    }
}

impl CsvImageReader {
    pub fn new(label_column: LabelColumn, expected_dim: Option<usize>) -> Self {
        Self {
            label_column,
            expected_dim,
        }
    }

    /// Load a dataset from a CSV file
    pub fn read_file<P: AsRef<Path>>(&self, path: P) -> Result<ImageDataset> {
        let file = File::open(path).map_err(SVMError::IoError)?;
        self.read(BufReader::new(file))
    }

    /// Load a dataset from any buffered reader
    pub fn read<R: BufRead>(&self, reader: R) -> Result<ImageDataset> {
        let mut samples = Vec::new();
        let mut widest = 0;
        let mut first_data_line = true;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(SVMError::IoError)?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if first_data_line {
                first_data_line = false;
                if is_header_line(line) {
                    continue;
                }
            }

            let (sample, width) = self.parse_line(line).map_err(|e| {
                SVMError::ParseError(format!("Error parsing line {}: {}", line_num + 1, e))
            })?;

            if let Some(dim) = self.expected_dim {
                if width != dim {
                    return Err(SVMError::ParseError(format!(
                        "Line {} has {} pixel columns, expected {}",
                        line_num + 1,
                        width,
                        dim
                    )));
                }
            }

            widest = widest.max(width);
            samples.push(sample);
        }

        if samples.is_empty() {
            return Err(SVMError::EmptyDataset);
        }

        ImageDataset::new(samples, self.expected_dim.unwrap_or(widest))
    }

    /// Parse one row into a sample and its number of feature columns
    fn parse_line(&self, line: &str) -> Result<(Sample, usize)> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();

        if fields.len() < 2 {
            return Err(SVMError::ParseError(format!(
                "Line has too few fields: {line}"
            )));
        }

        let (label_str, pixels) = match self.label_column {
            LabelColumn::First => (fields[0], &fields[1..]),
            LabelColumn::Last => (fields[fields.len() - 1], &fields[..fields.len() - 1]),
        };

        let label = label_str
            .parse::<f64>()
            .map_err(|_| SVMError::ParseError(format!("Invalid label: {label_str}")))?;
        if label < 0.0 || label.fract() != 0.0 {
            return Err(SVMError::ParseError(format!(
                "Label must be a class index, got {label_str}"
            )));
        }

        let mut indices = Vec::new();
        let mut values = Vec::new();
        for (idx, field) in pixels.iter().enumerate() {
            let value = field.parse::<f64>().map_err(|_| {
                SVMError::ParseError(format!("Invalid pixel value at column {}: {}", idx + 1, field))
            })?;
            // Blank pixels are not stored
            if value != 0.0 {
                indices.push(idx);
                values.push(value);
            }
        }

        Ok((
            Sample::new(SparseVector { indices, values }, label),
            pixels.len(),
        ))
    }
}

/// A line is a header when most columns are not numbers
fn is_header_line(line: &str) -> bool {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 2 {
        return false;
    }

    let non_numeric = fields
        .iter()
        .filter(|field| field.trim().parse::<f64>().is_err())
        .count();

    non_numeric > fields.len() / 2
}
