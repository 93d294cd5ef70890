use ndarray::Array2;

use crate::context::{Flag, Lattice};
use crate::dataset::Item;
use crate::error::Result;
use crate::model::Model;

/// The tagger predicts tag sequences for feature id sequences using a model
#[derive(Debug, Clone)]
pub struct Tagger<'a> {
    model: &'a Model,
    /// Cached transition scores `[prev][tag]`
    trans: Array2<f64>,
}

impl<'a> Tagger<'a> {
    pub fn new(model: &'a Model) -> Self {
        let mut lattice = Lattice::new(Flag::empty(), model.num_tags(), 0);
        lattice.transition_score(model);
        Self {
            model,
            trans: lattice.trans,
        }
    }

    /// Predict the tag sequence for the item sequence.
    pub fn tag(&self, xseq: &[Item]) -> Result<Vec<u32>> {
        Ok(self.viterbi(xseq)?.0)
    }

    /// Best tag sequence and its unnormalized log score
    pub fn viterbi(&self, xseq: &[Item]) -> Result<(Vec<u32>, f64)> {
        if xseq.is_empty() {
            return Ok((Vec::new(), 0.0));
        }
        let mut lattice = Lattice::new(Flag::VITERBI, self.model.num_tags(), xseq.len());
        lattice.trans.assign(&self.trans);
        lattice.state_score(self.model, xseq)?;
        Ok(lattice.viterbi())
    }
}
