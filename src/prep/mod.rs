//! Dataset preparation: class filtering, stratified subsampling and the
//! digit / non-digit relabeling

use crate::core::{Dataset, Result, SVMError};
use crate::data::{EmnistSplit, ImageDataset, NON_DIGIT_CLASS};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Drop every sample whose class is in `excluded`
pub fn filter_classes(dataset: &ImageDataset, excluded: &[usize]) -> ImageDataset {
    let excluded: BTreeSet<usize> = excluded.iter().copied().collect();
    let kept = dataset.filter_by_class(|c| !excluded.contains(&c));
    debug!(
        "Filtered {} classes: {} -> {} samples",
        excluded.len(),
        dataset.len(),
        kept.len()
    );
    kept
}

/// Resolve letters to classes of `split` and drop them
pub fn filter_letters(
    dataset: &ImageDataset,
    split: EmnistSplit,
    letters: &[char],
) -> Result<ImageDataset> {
    let excluded = split.classes_for(letters)?;
    Ok(filter_classes(dataset, &excluded))
}

/// How many samples to draw from each side of the detection problem
///
/// Every digit class gets `per_digit` samples. The non-digit budget is
/// spread evenly over the letter classes present, so that after merging
/// the non-digit class is about as large as one digit class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsampleQuota {
    pub per_digit: usize,
    pub non_digit_total: usize,
}

impl SubsampleQuota {
    pub fn new(per_digit: usize, non_digit_total: usize) -> Self {
        Self {
            per_digit,
            non_digit_total,
        }
    }

    /// Requested count for each class in `classes`
    ///
    /// Letter classes split `non_digit_total`; the remainder goes to the
    /// lowest class indices.
    pub fn per_class(&self, split: EmnistSplit, classes: &[usize]) -> BTreeMap<usize, usize> {
        let letters: Vec<usize> = classes
            .iter()
            .copied()
            .filter(|&c| !split.is_digit(c))
            .collect();

        let (base, extra) = if letters.is_empty() {
            (0, 0)
        } else {
            (
                self.non_digit_total / letters.len(),
                self.non_digit_total % letters.len(),
            )
        };

        let mut quotas: BTreeMap<usize, usize> = classes
            .iter()
            .filter(|&&c| split.is_digit(c))
            .map(|&c| (c, self.per_digit))
            .collect();
        for (rank, class) in letters.into_iter().enumerate() {
            quotas.insert(class, base + usize::from(rank < extra));
        }
        quotas
    }
}

/// Draw up to `quota[class]` samples per class without replacement
///
/// Classes missing from `quota` are dropped. A class with fewer samples
/// than requested contributes all of them. The result keeps the original
/// row order, and the same `rng` state always yields the same rows.
pub fn stratified_subsample(
    dataset: &ImageDataset,
    quota: &BTreeMap<usize, usize>,
    rng: &mut StdRng,
) -> ImageDataset {
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, class) in dataset.classes_per_sample().into_iter().enumerate() {
        by_class.entry(class).or_default().push(i);
    }

    let mut chosen = Vec::new();
    for (class, rows) in &by_class {
        let wanted = quota.get(class).copied().unwrap_or(0);
        let take = wanted.min(rows.len());
        if take < wanted {
            warn!(
                "Class {} has only {} samples, {} requested",
                class,
                rows.len(),
                wanted
            );
        }
        chosen.extend(
            index::sample(rng, rows.len(), take)
                .into_iter()
                .map(|pos| rows[pos]),
        );
    }
    chosen.sort_unstable();

    dataset.subset(&chosen)
}

/// Subsample with a [`SubsampleQuota`] resolved against the classes present
pub fn subsample_detection(
    dataset: &ImageDataset,
    split: EmnistSplit,
    quota: SubsampleQuota,
    rng: &mut StdRng,
) -> ImageDataset {
    let per_class = quota.per_class(split, &dataset.classes());
    stratified_subsample(dataset, &per_class, rng)
}

/// Relabel to the detection problem
///
/// Digits keep their value 0..=9, every other class becomes
/// [`NON_DIGIT_CLASS`]. Classes that do not exist in `split` are an error.
pub fn merge_non_digits(dataset: ImageDataset, split: EmnistSplit) -> Result<ImageDataset> {
    if let Some(unknown) = dataset
        .classes()
        .into_iter()
        .find(|&c| split.char_for(c).is_none())
    {
        return Err(SVMError::InvalidLabel(unknown as f64));
    }

    Ok(dataset.map_classes(|class| {
        if split.is_digit(class) {
            split
                .char_for(class)
                .and_then(|ch| ch.to_digit(10))
                .map_or(NON_DIGIT_CLASS, |d| d as usize)
        } else {
            NON_DIGIT_CLASS
        }
    }))
}
