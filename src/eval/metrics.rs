//! Classification metrics over thresholded or arg-maxed predictions
//!
//! All scores are fractions in `[0, 1]`; callers scale to percentages. A class
//! with no true positives, false positives or false negatives scores zero.

use ndarray::{Array2, ArrayView1};

use crate::core::config::AccuracyAverage;

#[derive(Debug, Default, Clone, Copy)]
struct Confusion {
    tp: usize,
    fp: usize,
    fn_: usize,
}

impl Confusion {
    fn f1(&self) -> f32 {
        let denom = 2 * self.tp + self.fp + self.fn_;
        if denom == 0 {
            0.0
        } else {
            2.0 * self.tp as f32 / denom as f32
        }
    }
}

fn per_class_confusion(pred: &[usize], target: &[usize], num_classes: usize) -> Vec<Confusion> {
    let mut counts = vec![Confusion::default(); num_classes];
    for (&p, &t) in pred.iter().zip(target.iter()) {
        if p == t {
            if let Some(c) = counts.get_mut(p) {
                c.tp += 1;
            }
        } else {
            if let Some(c) = counts.get_mut(p) {
                c.fp += 1;
            }
            if let Some(c) = counts.get_mut(t) {
                c.fn_ += 1;
            }
        }
    }
    counts
}

/// 1.0 where `value > cutoff`, else 0.0
pub fn threshold(values: &Array2<f32>, cutoff: f32) -> Array2<f32> {
    values.mapv(|v| if v > cutoff { 1.0 } else { 0.0 })
}

/// Column index of each row's maximum. Ties resolve to the first column.
pub fn argmax_rows(values: &Array2<f32>) -> Vec<usize> {
    values
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| {
                    if v > max {
                        (i, v)
                    } else {
                        (best, max)
                    }
                })
                .0
        })
        .collect()
}

/// F1 of the positive class for 0/1 predictions
pub fn binary_f1(pred: ArrayView1<'_, f32>, target: ArrayView1<'_, f32>) -> f32 {
    let mut c = Confusion::default();
    for (&p, &t) in pred.iter().zip(target.iter()) {
        match (p >= 0.5, t >= 0.5) {
            (true, true) => c.tp += 1,
            (true, false) => c.fp += 1,
            (false, true) => c.fn_ += 1,
            (false, false) => {}
        }
    }
    c.f1()
}

/// One F1 score per class, unaveraged
pub fn multiclass_f1(pred: &[usize], target: &[usize], num_classes: usize) -> Vec<f32> {
    per_class_confusion(pred, target, num_classes)
        .iter()
        .map(Confusion::f1)
        .collect()
}

/// Micro: share of matching rows. Macro: mean recall over every class that
/// appears in either `pred` or `target`.
pub fn multiclass_accuracy(
    pred: &[usize],
    target: &[usize],
    num_classes: usize,
    average: AccuracyAverage,
) -> f32 {
    if target.is_empty() {
        return 0.0;
    }
    match average {
        AccuracyAverage::Micro => {
            let correct = pred.iter().zip(target.iter()).filter(|(p, t)| p == t).count();
            correct as f32 / target.len() as f32
        }
        AccuracyAverage::Macro => {
            let counts = per_class_confusion(pred, target, num_classes);
            let present: Vec<f32> = counts
                .iter()
                .filter(|c| c.tp + c.fp + c.fn_ > 0)
                .map(|c| {
                    let support = c.tp + c.fn_;
                    if support == 0 {
                        0.0
                    } else {
                        c.tp as f32 / support as f32
                    }
                })
                .collect();
            if present.is_empty() {
                0.0
            } else {
                present.iter().sum::<f32>() / present.len() as f32
            }
        }
    }
}

/// Number of NaN or infinite entries
pub fn non_finite_count(values: &Array2<f32>) -> usize {
    values.iter().filter(|v| !v.is_finite()).count()
}

/// Binary F1 for every column of a multi-label 0/1 matrix
pub fn column_f1(pred: &Array2<f32>, target: &Array2<f32>) -> Vec<f32> {
    pred.columns()
        .into_iter()
        .zip(target.columns())
        .map(|(p, t)| binary_f1(p, t))
        .collect()
}
