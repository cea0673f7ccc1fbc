//! IDX binary reader
//!
//! The original MNIST/EMNIST distribution format: a 4-byte magic number
//! (two zero bytes, element type, dimension count), one big-endian u32 per
//! dimension, then the raw row-major data.

use crate::core::{Result, SVMError, Sample, SparseVector};
use crate::data::ImageDataset;
use log::debug;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Element type code for unsigned bytes
const TYPE_U8: u8 = 0x08;

/// Decoded IDX header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdxHeader {
    pub element_type: u8,
    pub dims: Vec<usize>,
}

impl IdxHeader {
    /// Number of elements described by the header
    ///
    /// Fails when the dimensions overflow `usize`.
    pub fn element_count(&self) -> Result<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| {
                SVMError::FormatError(format!("IDX dimensions {:?} are too large", self.dims))
            })
    }
}

fn read_u32_be<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|e| SVMError::FormatError(format!("truncated IDX header: {e}")))?;
    Ok(u32::from_be_bytes(buf))
}

/// Read and validate an IDX header
pub fn read_header<R: Read>(reader: &mut R) -> Result<IdxHeader> {
    let magic = read_u32_be(reader)?.to_be_bytes();
    if magic[0] != 0 || magic[1] != 0 {
        return Err(SVMError::FormatError(format!(
            "bad IDX magic {:02x}{:02x}{:02x}{:02x}",
            magic[0], magic[1], magic[2], magic[3]
        )));
    }

    let element_type = magic[2];
    let n_dims = magic[3] as usize;
    if n_dims == 0 {
        return Err(SVMError::FormatError("IDX file has no dimensions".to_string()));
    }

    let dims = (0..n_dims)
        .map(|_| read_u32_be(reader).map(|d| d as usize))
        .collect::<Result<Vec<_>>>()?;

    Ok(IdxHeader { element_type, dims })
}

fn read_u8_payload<R: Read>(reader: &mut R, header: &IdxHeader) -> Result<Vec<u8>> {
    if header.element_type != TYPE_U8 {
        return Err(SVMError::FormatError(format!(
            "expected unsigned byte data (0x08), found type 0x{:02x}",
            header.element_type
        )));
    }
    let count = header.element_count()?;
    let limit = u64::try_from(count)
        .map_err(|_| SVMError::FormatError(format!("IDX payload of {count} bytes")))?;

    // Grow with the bytes actually present, not with the header's claim
    let mut data = Vec::new();
    reader.by_ref().take(limit).read_to_end(&mut data)?;
    if data.len() != count {
        return Err(SVMError::FormatError(format!(
            "truncated IDX payload: header declares {count} bytes, found {}",
            data.len()
        )));
    }
    Ok(data)
}

/// Read an `idx3-ubyte` image file into sparse pixel vectors
///
/// Returns the images and the (rows, cols) of each image.
pub fn read_images<R: Read>(reader: &mut R) -> Result<(Vec<SparseVector>, (usize, usize))> {
    let header = read_header(reader)?;
    if header.dims.len() != 3 {
        return Err(SVMError::FormatError(format!(
            "image file must have 3 dimensions, found {}",
            header.dims.len()
        )));
    }
    let (rows, cols) = (header.dims[1], header.dims[2]);
    if rows == 0 || cols == 0 {
        return Err(SVMError::FormatError(format!(
            "IDX images of {rows}x{cols} pixels"
        )));
    }
    let pixels = read_u8_payload(reader, &header)?;

    let images = pixels
        .chunks_exact(rows * cols)
        .map(|chunk| {
            let dense: Vec<f64> = chunk.iter().map(|&p| f64::from(p)).collect();
            SparseVector::from_dense(&dense)
        })
        .collect();

    Ok((images, (rows, cols)))
}

/// Read an `idx1-ubyte` label file
pub fn read_labels<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let header = read_header(reader)?;
    if header.dims.len() != 1 {
        return Err(SVMError::FormatError(format!(
            "label file must have 1 dimension, found {}",
            header.dims.len()
        )));
    }
    read_u8_payload(reader, &header)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    if path.extension().map_or(false, |ext| ext == "gz") {
        return Err(SVMError::FormatError(format!(
            "{} is gzip-compressed; decompress it before loading",
            path.display()
        )));
    }
    Ok(BufReader::new(File::open(path)?))
}

/// Load matching image and label files into a dataset
pub fn load_idx_pair<P: AsRef<Path>, Q: AsRef<Path>>(
    images_path: P,
    labels_path: Q,
) -> Result<ImageDataset> {
    let (images, (rows, cols)) = read_images(&mut open(images_path.as_ref())?)?;
    let labels = read_labels(&mut open(labels_path.as_ref())?)?;

    if images.len() != labels.len() {
        return Err(SVMError::DimensionMismatch {
            expected: images.len(),
            actual: labels.len(),
        });
    }
    if images.is_empty() {
        return Err(SVMError::EmptyDataset);
    }

    debug!(
        "Loaded {} IDX images of {}x{} from {}",
        images.len(),
        rows,
        cols,
        images_path.as_ref().display()
    );

    let samples = images
        .into_iter()
        .zip(labels)
        .map(|(features, label)| Sample::with_class(features, label as usize))
        .collect();

    ImageDataset::new(samples, rows * cols)
}
