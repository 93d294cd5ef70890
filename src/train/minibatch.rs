use std::borrow::Borrow;

use rayon::prelude::*;

use super::gradient::{sequence_gradient, Degeneracy, TouchedSet};
use crate::context::Inference;
use crate::dataset::Example;
use crate::error::{Error, Result};
use crate::model::Model;

/// Accumulated loss and touched parameters of one minibatch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGradient {
    /// Sum of the per-sequence losses
    pub loss: f64,
    /// Union of the per-sequence touched sets
    pub touched: TouchedSet,
    /// Number of sequences flagged as degenerate
    pub degenerate: usize,
}

impl BatchGradient {
    fn merge(mut self, other: BatchGradient) -> BatchGradient {
        self.loss += other.loss;
        self.touched.extend(other.touched);
        self.degenerate += other.degenerate;
        self
    }
}

/// Add the gradient of every example in `batch` into `grad`.
///
/// Each example gets a free and a gold-constrained belief table from
/// `inference`. `grad` is never reset here. Degenerate sequences are counted
/// and their loss is kept as computed; a contract violation such as an out of
/// range feature id aborts the batch and leaves `grad` unchanged.
pub fn accumulate<E, I>(
    grad: &mut [f64],
    model: &Model,
    batch: &[E],
    inference: &I,
) -> Result<BatchGradient>
where
    E: Borrow<Example>,
    I: Inference + ?Sized,
{
    check_buffer(grad, model)?;

    let mut partial = vec![0.0; model.num_params()];
    let mut out = BatchGradient::default();
    for (i, example) in batch.iter().enumerate() {
        let one = accumulate_one(&mut partial, model, i, example.borrow(), inference)?;
        out = out.merge(one);
    }
    commit(grad, &partial, &out.touched);
    Ok(out)
}

/// Parallel [`accumulate`].
///
/// Every rayon worker sums into its own partial buffer; the partial buffers
/// are reduced pairwise over their touched entries and the result is added to
/// `grad` once. Loss and touched set equal the sequential ones, the gradient
/// equals it up to floating point summation order.
pub fn accumulate_parallel<E, I>(
    grad: &mut [f64],
    model: &Model,
    batch: &[E],
    inference: &I,
) -> Result<BatchGradient>
where
    E: Borrow<Example> + Sync,
    I: Inference + ?Sized,
{
    check_buffer(grad, model)?;

    let size = model.num_params();
    let (partial, out) = batch
        .par_iter()
        .enumerate()
        .try_fold(
            || (vec![0.0; size], BatchGradient::default()),
            |(mut partial, out), (i, example)| -> Result<_> {
                let one = accumulate_one(&mut partial, model, i, example.borrow(), inference)?;
                Ok((partial, out.merge(one)))
            },
        )
        .try_reduce(
            || (vec![0.0; size], BatchGradient::default()),
            |(mut left, lout), (right, rout)| {
                for &idx in &rout.touched {
                    left[idx] += right[idx];
                }
                Ok((left, lout.merge(rout)))
            },
        )?;

    commit(grad, &partial, &out.touched);
    Ok(out)
}

fn check_buffer(grad: &[f64], model: &Model) -> Result<()> {
    if grad.len() != model.num_params() {
        return Err(Error::index(format!(
            "gradient buffer has {} entries, model has {} weights",
            grad.len(),
            model.num_params()
        )));
    }
    Ok(())
}

/// Add a finished batch into the caller's buffer
fn commit(grad: &mut [f64], partial: &[f64], touched: &TouchedSet) {
    for &idx in touched {
        grad[idx] += partial[idx];
    }
}

fn accumulate_one<I: Inference + ?Sized>(
    grad: &mut [f64],
    model: &Model,
    index: usize,
    example: &Example,
    inference: &I,
) -> Result<BatchGradient> {
    let (free, gold) = inference.belief_pair(model, example)?;
    let seq = sequence_gradient(grad, model, example, &free, &gold)?;
    let mut degenerate = 0;
    if let Some(kind) = seq.degeneracy {
        report(index, kind, seq.loss);
        degenerate = 1;
    }
    Ok(BatchGradient {
        loss: seq.loss,
        touched: seq.touched,
        degenerate,
    })
}

fn report(index: usize, kind: Degeneracy, loss: f64) {
    log::warn!(
        "degenerate sequence #{} in batch ({:?}), loss {}",
        index,
        kind,
        loss
    );
}
