use std::collections::BTreeSet;

use crate::context::BeliefTable;
use crate::dataset::Example;
use crate::error::{Error, Result};
use crate::model::Model;

/// Parameter indices that received a gradient contribution
pub type TouchedSet = BTreeSet<usize>;

/// Numeric anomaly of a single sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degeneracy {
    /// The gold-constrained distribution has no mass
    ZeroGoldMass,
    /// The constrained log-partition exceeds the free one
    GoldExceedsFree,
    /// A log-partition is NaN or infinite
    NonFinite,
}

/// Contribution of one sequence to the negative log-likelihood
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceGradient {
    /// `log_z(free) - log_z(gold)`
    pub loss: f64,
    /// True parameter indices written into the gradient buffer
    pub touched: TouchedSet,
    pub degeneracy: Option<Degeneracy>,
}

/// Tolerance on `log_z(gold) - log_z(free)` before flagging a sequence
const LOG_Z_TOLERANCE: f64 = 1e-9;

/// Add the gradient of one sequence into `grad`.
///
/// For every active feature and tag the free node marginal is added and the
/// gold-constrained one subtracted; transitions are handled the same way from
/// the edge marginals. `grad` is only added to, so repeated calls accumulate
/// and the caller resets it between minibatches.
///
/// Feature ids outside the model and belief tables whose shape does not match
/// the example are rejected before anything is written. Batch drivers sum
/// into scratch buffers so a failed batch leaves the caller's buffer intact.
pub fn sequence_gradient(
    grad: &mut [f64],
    model: &Model,
    example: &Example,
    free: &BeliefTable,
    gold: &BeliefTable,
) -> Result<SequenceGradient> {
    check_shapes(grad, model, example, free, gold)?;

    let n_tag = model.num_tags();
    let mut touched = TouchedSet::new();

    for (t, item) in example.features.iter().enumerate() {
        for &fid in item {
            for tag in 0..n_tag {
                let idx = model.node_index(fid as usize, tag);
                grad[idx] += free.node[[t, tag]] - gold.node[[t, tag]];
                touched.insert(idx);
            }
        }
    }

    for t in 1..example.len() {
        for tag in 0..n_tag {
            for prev in 0..n_tag {
                let idx = model.tag_tag_index(prev, tag);
                grad[idx] += free.edge[[t, prev, tag]] - gold.edge[[t, prev, tag]];
                touched.insert(idx);
            }
        }
    }

    Ok(SequenceGradient {
        loss: free.log_z - gold.log_z,
        touched,
        degeneracy: degeneracy(free.log_z, gold.log_z),
    })
}

fn degeneracy(free_log_z: f64, gold_log_z: f64) -> Option<Degeneracy> {
    if gold_log_z == f64::NEG_INFINITY {
        Some(Degeneracy::ZeroGoldMass)
    } else if !free_log_z.is_finite() || !gold_log_z.is_finite() {
        Some(Degeneracy::NonFinite)
    } else if gold_log_z - free_log_z > LOG_Z_TOLERANCE {
        Some(Degeneracy::GoldExceedsFree)
    } else {
        None
    }
}

fn check_shapes(
    grad: &[f64],
    model: &Model,
    example: &Example,
    free: &BeliefTable,
    gold: &BeliefTable,
) -> Result<()> {
    if grad.len() != model.num_params() {
        return Err(Error::index(format!(
            "gradient buffer has {} entries, model has {} weights",
            grad.len(),
            model.num_params()
        )));
    }

    let n_tag = model.num_tags();
    let len = example.len();
    for (name, table) in [("free", free), ("gold", gold)] {
        if table.node.dim() != (len, n_tag) || table.edge.dim() != (len, n_tag, n_tag) {
            return Err(Error::index(format!(
                "{} belief table has shape {:?}/{:?}, expected ({}, {})",
                name,
                table.node.dim(),
                table.edge.dim(),
                len,
                n_tag
            )));
        }
    }

    for (t, item) in example.features.iter().enumerate() {
        if let Some(&fid) = item.iter().find(|&&fid| fid as usize >= model.num_features()) {
            return Err(Error::index(format!(
                "feature id {} at position {} out of range (n_feature = {})",
                fid,
                t,
                model.num_features()
            )));
        }
    }
    Ok(())
}
