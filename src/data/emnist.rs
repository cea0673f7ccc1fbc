//! EMNIST split catalogue
//!
//! Each split uses its own label space. The class → character tables below
//! follow the mapping files published with the dataset.

use crate::core::{Dataset, Result, SVMError, SparseVector};
use crate::data::ImageDataset;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Image side length in pixels
pub const IMAGE_SIDE: usize = 28;

/// Pixels per image
pub const IMAGE_PIXELS: usize = IMAGE_SIDE * IMAGE_SIDE;

/// Label of the merged "not a digit" class
pub const NON_DIGIT_CLASS: usize = 10;

/// Classes of the merged detection problem: ten digits plus non-digit
pub const DETECTION_CLASSES: usize = 11;

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
/// Lowercase letters kept as separate classes in the balanced/bymerge splits
const DISTINCT_LOWER: &str = "abdefghnqrt";

/// Published EMNIST splits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmnistSplit {
    Balanced,
    ByClass,
    ByMerge,
    Digits,
    Letters,
    Mnist,
}

impl Default for EmnistSplit {
    fn default() -> Self {
        Self::Balanced
    }
}

impl EmnistSplit {
    pub const ALL: [EmnistSplit; 6] = [
        EmnistSplit::Balanced,
        EmnistSplit::ByClass,
        EmnistSplit::ByMerge,
        EmnistSplit::Digits,
        EmnistSplit::Letters,
        EmnistSplit::Mnist,
    ];

    /// Name used in the published file names (`emnist-<name>-train...`)
    pub fn name(&self) -> &'static str {
        match self {
            EmnistSplit::Balanced => "balanced",
            EmnistSplit::ByClass => "byclass",
            EmnistSplit::ByMerge => "bymerge",
            EmnistSplit::Digits => "digits",
            EmnistSplit::Letters => "letters",
            EmnistSplit::Mnist => "mnist",
        }
    }

    /// Number of label values; `letters` labels run 1..=26
    pub fn n_classes(&self) -> usize {
        match self {
            EmnistSplit::Balanced | EmnistSplit::ByMerge => 47,
            EmnistSplit::ByClass => 62,
            EmnistSplit::Digits | EmnistSplit::Mnist => 10,
            EmnistSplit::Letters => 26,
        }
    }

    /// Character drawn for `class`, if the class exists in this split
    pub fn char_for(&self, class: usize) -> Option<char> {
        match self {
            EmnistSplit::Digits | EmnistSplit::Mnist => digit_char(class),
            EmnistSplit::Letters => class
                .checked_sub(1)
                .and_then(|i| LOWER.chars().nth(i)),
            EmnistSplit::ByClass => digit_char(class)
                .or_else(|| class.checked_sub(10).and_then(|i| UPPER.chars().nth(i)))
                .or_else(|| class.checked_sub(36).and_then(|i| LOWER.chars().nth(i))),
            EmnistSplit::Balanced | EmnistSplit::ByMerge => digit_char(class)
                .or_else(|| class.checked_sub(10).and_then(|i| UPPER.chars().nth(i)))
                .or_else(|| {
                    class
                        .checked_sub(36)
                        .and_then(|i| DISTINCT_LOWER.chars().nth(i))
                }),
        }
    }

    /// Class that draws `ch`, if the split has one
    pub fn class_for(&self, ch: char) -> Option<usize> {
        let range = match self {
            EmnistSplit::Letters => 1..=26,
            _ => 0..=self.n_classes() - 1,
        };
        range.into_iter().find(|&c| self.char_for(c) == Some(ch))
    }

    /// Whether `class` is a digit in this split
    pub fn is_digit(&self, class: usize) -> bool {
        self.char_for(class).map_or(false, |c| c.is_ascii_digit())
    }

    /// Resolve characters to classes, failing on any the split lacks
    pub fn classes_for(&self, chars: &[char]) -> Result<Vec<usize>> {
        chars
            .iter()
            .map(|&ch| {
                self.class_for(ch).ok_or_else(|| {
                    SVMError::InvalidParameter(format!(
                        "character '{ch}' has no class in the {} split",
                        self.name()
                    ))
                })
            })
            .collect()
    }

    /// Letters easily mistaken for digits in handwriting
    ///
    /// Only characters that exist as classes in this split are returned.
    pub fn ambiguous_letters(&self) -> Vec<char> {
        const CANDIDATES: [char; 16] = [
            'O', 'o', 'I', 'i', 'L', 'l', 'Z', 'z', 'S', 's', 'B', 'b', 'G', 'g', 'Q', 'q',
        ];
        CANDIDATES
            .iter()
            .copied()
            .filter(|&ch| self.class_for(ch).is_some())
            .collect()
    }
}

fn digit_char(class: usize) -> Option<char> {
    if class < 10 {
        char::from_digit(class as u32, 10)
    } else {
        None
    }
}

/// Display name of a class in the merged detection problem
pub fn detection_class_name(class: usize) -> String {
    match class {
        0..=9 => class.to_string(),
        NON_DIGIT_CLASS => "non-digit".to_string(),
        other => format!("class {other}"),
    }
}

/// Swap rows and columns of a square image stored row-major
///
/// EMNIST images are distributed transposed relative to MNIST; applying
/// this once makes the characters upright.
pub fn transpose_image(features: &SparseVector, side: usize) -> SparseVector {
    let (indices, values) = features
        .indices
        .iter()
        .zip(features.values.iter())
        .map(|(&idx, &v)| ((idx % side) * side + idx / side, v))
        .unzip();
    SparseVector::new(indices, values)
}

/// Transpose every image in the dataset
pub fn fix_orientation(dataset: &ImageDataset) -> Result<ImageDataset> {
    let side = (dataset.dim() as f64).sqrt().round() as usize;
    if side * side != dataset.dim() {
        return Err(SVMError::InvalidDataset(format!(
            "cannot transpose images of {} pixels: not a square",
            dataset.dim()
        )));
    }

    let samples = dataset
        .samples()
        .iter()
        .map(|s| crate::core::Sample::new(transpose_image(&s.features, side), s.label))
        .collect();
    Ok(dataset.with_samples(samples))
}

impl fmt::Display for EmnistSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EmnistSplit {
    type Err = SVMError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        EmnistSplit::ALL
            .iter()
            .copied()
            .find(|split| split.name() == lower)
            .ok_or_else(|| SVMError::ParseError(format!("Unknown EMNIST split: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_mapping() {
        let split = EmnistSplit::Balanced;
        assert_eq!(split.char_for(0), Some('0'));
        assert_eq!(split.char_for(9), Some('9'));
        assert_eq!(split.char_for(10), Some('A'));
        assert_eq!(split.char_for(35), Some('Z'));
        assert_eq!(split.char_for(36), Some('a'));
        assert_eq!(split.char_for(38), Some('d'));
        assert_eq!(split.char_for(46), Some('t'));
        assert_eq!(split.char_for(47), None);
    }

    #[test]
    fn test_byclass_and_letters_mapping() {
        assert_eq!(EmnistSplit::ByClass.char_for(61), Some('z'));
        assert_eq!(EmnistSplit::Letters.char_for(0), None);
        assert_eq!(EmnistSplit::Letters.char_for(1), Some('a'));
        assert_eq!(EmnistSplit::Letters.class_for('z'), Some(26));
    }

    #[test]
    fn test_is_digit() {
        assert!(EmnistSplit::Balanced.is_digit(7));
        assert!(!EmnistSplit::Balanced.is_digit(10));
        assert!(!EmnistSplit::Letters.is_digit(5));
    }

    #[test]
    fn test_ambiguous_letters_balanced() {
        let letters = EmnistSplit::Balanced.ambiguous_letters();
        // Balanced has no lowercase o, i, l, z, s
        assert_eq!(
            letters,
            vec!['O', 'I', 'L', 'Z', 'S', 'B', 'b', 'G', 'g', 'Q', 'q']
        );
        let classes = EmnistSplit::Balanced.classes_for(&letters).unwrap();
        assert_eq!(classes[0], 24); // 'O'
        assert!(classes.iter().all(|&c| c >= 10));
    }

    #[test]
    fn test_classes_for_unknown_char() {
        assert!(EmnistSplit::Digits.classes_for(&['A']).is_err());
    }

    #[test]
    fn test_split_parse_and_serde() {
        assert_eq!("ByMerge".parse::<EmnistSplit>().unwrap(), EmnistSplit::ByMerge);
        assert!("kanji".parse::<EmnistSplit>().is_err());
        assert_eq!(
            serde_json::to_string(&EmnistSplit::Balanced).unwrap(),
            "\"balanced\""
        );
    }

    #[test]
    fn test_transpose_image() {
        // 2x3 is not square, so use a 3x3 image with pixels at (0, 1) and (2, 0)
        let image = SparseVector::new(vec![1, 6], vec![5.0, 9.0]);
        let t = transpose_image(&image, 3);
        assert_eq!(t.indices, vec![2, 3]);
        assert_eq!(t.values, vec![9.0, 5.0]);
        assert_eq!(transpose_image(&t, 3), image);
    }

    #[test]
    fn test_fix_orientation_requires_square_images() {
        use crate::core::Sample;
        let samples = vec![Sample::with_class(SparseVector::new(vec![1], vec![1.0]), 0)];
        let square = ImageDataset::new(samples.clone(), 4).unwrap();
        let fixed = fix_orientation(&square).unwrap();
        assert_eq!(fixed.samples()[0].features.indices, vec![2]);

        let odd = ImageDataset::new(samples, 3).unwrap();
        assert!(fix_orientation(&odd).is_err());
    }

    #[test]
    fn test_detection_class_name() {
        assert_eq!(detection_class_name(3), "3");
        assert_eq!(detection_class_name(NON_DIGIT_CLASS), "non-digit");
    }
}
