//! Elastic Weight Consolidation for preventing catastrophic forgetting
//!
//! After a task is learned, [`estimate`] records where every parameter ended up
//! (the anchor) and how much the task loss depends on it (the diagonal Fisher
//! information, approximated by averaged squared gradients). While training the
//! next task, [`penalty`] pulls important parameters back toward their anchors.

use ndarray::{Array2, ArrayD, Zip};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::config::PenaltyReduction;
use crate::engine::model::check_rows;
use crate::engine::{Gradients, Model, ParameterSet, Topology};
use crate::error::{EwcError, Result};

#[derive(Debug, Clone)]
struct SnapshotEntry {
    name: String,
    anchor: ArrayD<f32>,
    importance: ArrayD<f32>,
}

/// Anchor values and importance weights for one completed task.
///
/// Immutable once built. A later task produces a new snapshot that replaces
/// this one; snapshots are never merged.
#[derive(Debug, Clone)]
pub struct ImportanceSnapshot {
    entries: Vec<SnapshotEntry>,
    sample_count: usize,
}

/// Summary of a snapshot's importance weights
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStats {
    pub param_count: usize,
    pub sample_count: usize,
    pub importance_mean: f32,
    pub importance_max: f32,
    pub importance_min: f32,
}

impl ImportanceSnapshot {
    /// Build a snapshot from explicit `(name, anchor, importance)` triples.
    pub fn from_parts(parts: Vec<(String, ArrayD<f32>, ArrayD<f32>)>, sample_count: usize) -> Result<Self> {
        let mut entries = Vec::with_capacity(parts.len());
        for (name, anchor, importance) in parts {
            if anchor.shape() != importance.shape() {
                return Err(EwcError::config(format!(
                    "{}: anchor {:?} and importance {:?} differ in shape",
                    name,
                    anchor.shape(),
                    importance.shape()
                )));
            }
            if importance.iter().any(|&f| !(f >= 0.0) || !f.is_finite()) {
                return Err(EwcError::config(format!(
                    "{}: importance weights must be finite and non-negative",
                    name
                )));
            }
            entries.push(SnapshotEntry { name, anchor, importance });
        }
        Ok(Self { entries, sample_count })
    }

    pub fn anchor(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.entry(name).map(|e| &e.anchor)
    }

    pub fn importance(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.entry(name).map(|e| &e.importance)
    }

    fn entry(&self, name: &str) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Reference rows used to estimate the importance weights
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn element_count(&self) -> usize {
        self.entries.iter().map(|e| e.anchor.len()).sum()
    }

    pub fn stats(&self) -> SnapshotStats {
        let count = self.element_count();
        let sum: f32 = self.entries.iter().map(|e| e.importance.sum()).sum();
        let fold = |init: f32, f: fn(f32, f32) -> f32| {
            self.entries
                .iter()
                .flat_map(|e| e.importance.iter().copied())
                .fold(init, f)
        };
        SnapshotStats {
            param_count: count,
            sample_count: self.sample_count,
            importance_mean: if count == 0 { 0.0 } else { sum / count as f32 },
            importance_max: if count == 0 { 0.0 } else { fold(f32::MIN, f32::max) },
            importance_min: if count == 0 { 0.0 } else { fold(f32::MAX, f32::min) },
        }
    }

    /// Pairs every live parameter with its snapshot entry, failing on any
    /// missing tensor or shape mismatch.
    fn aligned<'a>(
        &'a self,
        params: &'a ParameterSet,
    ) -> Result<Vec<(&'a ArrayD<f32>, &'a SnapshotEntry)>> {
        if params.len() != self.entries.len() {
            return Err(EwcError::config(format!(
                "snapshot holds {} tensors, model has {}",
                self.entries.len(),
                params.len()
            )));
        }
        params
            .iter()
            .map(|p| {
                let entry = self.entry(&p.name).ok_or_else(|| {
                    EwcError::config(format!("snapshot has no entry for {}", p.name))
                })?;
                if entry.anchor.shape() != p.value.shape() {
                    return Err(EwcError::config(format!(
                        "{}: parameter {:?} vs snapshot {:?}",
                        p.name,
                        p.value.shape(),
                        entry.anchor.shape()
                    )));
                }
                Ok((&p.value, entry))
            })
            .collect()
    }
}

/// Estimate per-parameter importance on a reference set and anchor the
/// current parameter values.
///
/// The reference set is cut into contiguous mini-batches of
/// `fisher_batch_size` rows. For each batch the gradient of the mean loss is
/// squared and weighted by the batch's share of rows, so a batch size of one
/// yields the per-sample average of squared gradients. The model's parameters,
/// gradient buffers and optimizer state are left untouched.
pub fn estimate<T: Topology>(
    model: &Model<T>,
    inputs: &Array2<f32>,
    targets: &Array2<f32>,
    fisher_batch_size: usize,
) -> Result<ImportanceSnapshot> {
    check_rows(inputs, targets)?;
    let total = inputs.nrows();
    if total == 0 {
        return Err(EwcError::config("importance is undefined for an empty reference set"));
    }
    if fisher_batch_size == 0 {
        return Err(EwcError::config("fisher batch size must be at least 1"));
    }

    let params = model.parameters();
    let mut fisher = Gradients::zeros_like(params);
    let mut start = 0;
    while start < total {
        let end = (start + fisher_batch_size).min(total);
        let x = inputs.slice(ndarray::s![start..end, ..]).to_owned();
        let y = targets.slice(ndarray::s![start..end, ..]).to_owned();
        let (loss, grads) = model.loss_and_gradients(&x, &y)?;
        EwcError::check_finite(loss, format!("importance estimation rows {}..{}", start, end))?;
        fisher.scaled_add((end - start) as f32 / total as f32, &grads.squared())?;
        start = end;
    }

    let parts = params
        .iter()
        .map(|p| {
            let importance = fisher
                .get(&p.name)
                .cloned()
                .ok_or_else(|| EwcError::config(format!("no gradient for {}", p.name)))?;
            Ok((p.name.clone(), p.value.clone(), importance))
        })
        .collect::<Result<Vec<_>>>()?;
    let snapshot = ImportanceSnapshot::from_parts(parts, total)?;

    let stats = snapshot.stats();
    if stats.importance_max == 0.0 {
        warn!("All importance weights are zero; the penalty will have no effect");
    }
    info!(
        "Importance estimated over {} samples: mean={:.3e}, max={:.3e}",
        total, stats.importance_mean, stats.importance_max
    );
    Ok(snapshot)
}

/// Quadratic pull of `params` toward the snapshot anchors:
/// `sum(F * (theta - theta_anchor)^2)`, divided by the element count for
/// [`PenaltyReduction::Mean`].
pub fn penalty(
    params: &ParameterSet,
    snapshot: &ImportanceSnapshot,
    reduction: PenaltyReduction,
) -> Result<f32> {
    let aligned = snapshot.aligned(params)?;
    let mut total = 0.0f32;
    for (value, entry) in &aligned {
        Zip::from(*value)
            .and(&entry.anchor)
            .and(&entry.importance)
            .for_each(|&v, &a, &f| total += f * (v - a).powi(2));
    }
    let result = match reduction {
        PenaltyReduction::Sum => total,
        PenaltyReduction::Mean => total / snapshot.element_count().max(1) as f32,
    };
    debug!("EWC penalty {:.6e}", result);
    Ok(result)
}

/// Gradient of [`penalty`] with respect to every parameter:
/// `2 * F * (theta - theta_anchor)`, with the same reduction.
pub fn penalty_gradient(
    params: &ParameterSet,
    snapshot: &ImportanceSnapshot,
    reduction: PenaltyReduction,
) -> Result<Gradients> {
    let aligned = snapshot.aligned(params)?;
    let scale = match reduction {
        PenaltyReduction::Sum => 2.0,
        PenaltyReduction::Mean => 2.0 / snapshot.element_count().max(1) as f32,
    };
    let parts = aligned
        .into_iter()
        .map(|(value, entry)| {
            let mut grad = value - &entry.anchor;
            grad.zip_mut_with(&entry.importance, |d, &f| *d *= scale * f);
            (entry.name.clone(), grad)
        })
        .collect();
    Ok(Gradients::from_parts(parts))
}
