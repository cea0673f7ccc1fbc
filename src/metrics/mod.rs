//! Classification metrics
//!
//! [`ConfusionMatrix`] covers the multiclass problem. Collapsing it into
//! two groups yields the binary [`EvaluationMetrics`], which is how the
//! digit / non-digit detection rate is reported.

use crate::core::{Result, SVMError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confusion matrix with rows = true class, columns = predicted class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    classes: Vec<usize>,
    counts: Vec<Vec<usize>>,
}

/// Per-class precision, recall and F1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// Number of samples whose true class is `class`
    pub support: usize,
}

impl ConfusionMatrix {
    /// Empty matrix over `classes` (sorted, deduplicated)
    pub fn new(classes: &[usize]) -> Self {
        let mut classes = classes.to_vec();
        classes.sort_unstable();
        classes.dedup();
        let n = classes.len();
        Self {
            classes,
            counts: vec![vec![0; n]; n],
        }
    }

    /// Build from paired true / predicted classes
    ///
    /// The class set is the union of both sequences.
    pub fn from_predictions(y_true: &[usize], y_pred: &[usize]) -> Result<Self> {
        let classes: Vec<usize> = y_true.iter().chain(y_pred.iter()).copied().collect();
        Self::with_classes(&classes, y_true, y_pred)
    }

    /// Build over a fixed class set; unknown classes are an error
    pub fn with_classes(classes: &[usize], y_true: &[usize], y_pred: &[usize]) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(SVMError::DimensionMismatch {
                expected: y_true.len(),
                actual: y_pred.len(),
            });
        }
        let mut matrix = Self::new(classes);
        for (&t, &p) in y_true.iter().zip(y_pred) {
            matrix.record(t, p)?;
        }
        Ok(matrix)
    }

    /// Count one prediction
    pub fn record(&mut self, true_class: usize, predicted: usize) -> Result<()> {
        let row = self.position(true_class)?;
        let col = self.position(predicted)?;
        self.counts[row][col] += 1;
        Ok(())
    }

    fn position(&self, class: usize) -> Result<usize> {
        self.classes
            .binary_search(&class)
            .map_err(|_| SVMError::InvalidLabel(class as f64))
    }

    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    /// Raw counts, indexed like [`classes`](Self::classes)
    pub fn counts(&self) -> &[Vec<usize>] {
        &self.counts
    }

    /// Samples of `true_class` predicted as `predicted`
    pub fn count(&self, true_class: usize, predicted: usize) -> usize {
        match (self.position(true_class), self.position(predicted)) {
            (Ok(r), Ok(c)) => self.counts[r][c],
            _ => 0,
        }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Sum of the diagonal
    pub fn correct(&self) -> usize {
        (0..self.classes.len()).map(|i| self.counts[i][i]).sum()
    }

    /// Fraction of correct predictions; 0 for an empty matrix
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Metrics for one class
    pub fn class_metrics(&self, class: usize) -> Option<ClassMetrics> {
        let i = self.position(class).ok()?;
        let tp = self.counts[i][i];
        let support: usize = self.counts[i].iter().sum();
        let predicted: usize = self.counts.iter().map(|row| row[i]).sum();

        let precision = ratio(tp, predicted);
        let recall = ratio(tp, support);
        Some(ClassMetrics {
            class,
            precision,
            recall,
            f1_score: f1(precision, recall),
            support,
        })
    }

    /// Metrics for every class, in class order
    pub fn per_class(&self) -> Vec<ClassMetrics> {
        self.classes
            .iter()
            .filter_map(|&c| self.class_metrics(c))
            .collect()
    }

    /// Unweighted mean of per-class precision, recall and F1
    pub fn macro_average(&self) -> (f64, f64, f64) {
        let per_class = self.per_class();
        if per_class.is_empty() {
            return (0.0, 0.0, 0.0);
        }
        let n = per_class.len() as f64;
        let sum = per_class.iter().fold((0.0, 0.0, 0.0), |acc, m| {
            (acc.0 + m.precision, acc.1 + m.recall, acc.2 + m.f1_score)
        });
        (sum.0 / n, sum.1 / n, sum.2 / n)
    }

    /// Collapse into a two-group problem; `is_positive` picks the positive group
    pub fn to_binary<F: Fn(usize) -> bool>(&self, is_positive: F) -> EvaluationMetrics {
        let mut metrics = EvaluationMetrics::default();
        for (r, &t) in self.classes.iter().enumerate() {
            for (c, &p) in self.classes.iter().enumerate() {
                let n = self.counts[r][c];
                match (is_positive(p), is_positive(t)) {
                    (true, true) => metrics.true_positives += n,
                    (false, false) => metrics.true_negatives += n,
                    (true, false) => metrics.false_positives += n,
                    (false, true) => metrics.false_negatives += n,
                }
            }
        }
        metrics
    }

    /// Render as a text table, naming classes with `name`
    pub fn render<F: Fn(usize) -> String>(&self, name: F) -> String {
        let names: Vec<String> = self.classes.iter().map(|&c| name(c)).collect();
        let width = names
            .iter()
            .map(String::len)
            .chain(self.counts.iter().flatten().map(|n| n.to_string().len()))
            .max()
            .unwrap_or(1)
            .max(4);

        let label_width = width.max(9);
        let mut out = format!("{:>label_width$}", "true\\pred");
        for n in &names {
            out.push_str(&format!(" {n:>width$}"));
        }
        out.push('\n');

        for (row, n) in self.counts.iter().zip(&names) {
            out.push_str(&format!("{n:>label_width$}"));
            for count in row {
                out.push_str(&format!(" {count:>width$}"));
            }
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(|c| c.to_string()))
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * (precision * recall) / (precision + recall)
    }
}

/// Detailed binary evaluation metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub true_positives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl EvaluationMetrics {
    pub fn new(tp: usize, tn: usize, fp: usize, fn_: usize) -> Self {
        Self {
            true_positives: tp,
            true_negatives: tn,
            false_positives: fp,
            false_negatives: fn_,
        }
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    /// Calculate accuracy: (TP + TN) / (TP + TN + FP + FN)
    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    /// Calculate precision: TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// Calculate recall (sensitivity): TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1_score(&self) -> f64 {
        f1(self.precision(), self.recall())
    }

    /// Calculate specificity: TN / (TN + FP)
    pub fn specificity(&self) -> f64 {
        ratio(self.true_negatives, self.true_negatives + self.false_positives)
    }
}
