use bitflags::bitflags;
use ndarray::{Array2, Array3, ArrayView1};

use crate::dataset::{Example, Item};
use crate::error::{Error, Result};
use crate::model::Model;

bitflags! {
    /// Functionality flags for a lattice
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct Flag: u32 {
        /// Keep backward edges for Viterbi decoding
        const VITERBI = 0x01;
        /// Keep alpha/beta scores for marginals
        const MARGINALS = 0x02;
    }
}

/// Which label paths a belief table sums over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mask {
    /// Every label path
    Free,
    /// Only paths agreeing with every observed gold tag
    Gold,
}

/// Marginals and log-partition of one sequence
///
/// `node[[t, l]]` is the marginal of tag `l` at position `t`,
/// `edge[[t, i, j]]` the marginal of the transition `i -> j` into position
/// `t` (row `0` is always zero) and `log_z` the log of the total mass of the
/// label paths the table was computed over.
#[derive(Debug, Clone, PartialEq)]
pub struct BeliefTable {
    pub node: Array2<f64>,
    pub edge: Array3<f64>,
    pub log_z: f64,
}

impl BeliefTable {
    /// Zeroed table for a sequence of `len` items
    pub fn new(len: usize, n_tag: usize) -> Self {
        Self {
            node: Array2::zeros((len, n_tag)),
            edge: Array3::zeros((len, n_tag, n_tag)),
            log_z: 0.0,
        }
    }

    /// Sequence length
    pub fn len(&self) -> usize {
        self.node.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_tags(&self) -> usize {
        self.node.ncols()
    }
}

/// Computes belief tables for an example under a model
///
/// Both tables of an example must be on the same scale so that their
/// difference is a valid gradient.
pub trait Inference: Sync {
    fn beliefs(&self, model: &Model, example: &Example, mask: Mask) -> Result<BeliefTable>;

    /// Free and gold-constrained tables of one example
    fn belief_pair(&self, model: &Model, example: &Example) -> Result<(BeliefTable, BeliefTable)> {
        let free = self.beliefs(model, example, Mask::Free)?;
        let gold = self.beliefs(model, example, Mask::Gold)?;
        Ok((free, gold))
    }
}

/// Log-domain forward-backward over a linear chain
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardBackward;

impl Inference for ForwardBackward {
    fn beliefs(&self, model: &Model, example: &Example, mask: Mask) -> Result<BeliefTable> {
        let mut lattice = Lattice::new(Flag::MARGINALS, model.num_tags(), example.len());
        lattice.transition_score(model);
        lattice.state_score(model, &example.features)?;
        if mask == Mask::Gold {
            lattice.mask(example)?;
        }
        Ok(lattice.marginals())
    }

    fn belief_pair(&self, model: &Model, example: &Example) -> Result<(BeliefTable, BeliefTable)> {
        let mut lattice = Lattice::new(Flag::MARGINALS, model.num_tags(), example.len());
        lattice.transition_score(model);
        lattice.state_score(model, &example.features)?;
        let free = lattice.marginals();
        lattice.mask(example)?;
        let gold = lattice.marginals();
        Ok((free, gold))
    }
}

/// Log-sum-exp trick for numerical stability.
///
/// Returns NEG_INFINITY for empty input or input where all values are NEG_INFINITY.
fn logsumexp<I>(values: I) -> f64
where
    I: Iterator<Item = f64> + Clone,
{
    let max_val = values.clone().fold(f64::NEG_INFINITY, f64::max);
    if max_val.is_infinite() {
        return max_val;
    }
    let sum: f64 = values.map(|v| (v - max_val).exp()).sum();
    max_val + sum.ln()
}

/// Scores and work space for one sequence
#[derive(Debug, Clone)]
pub(crate) struct Lattice {
    flag: Flag,
    num_labels: usize,
    num_items: usize,
    /// State scores `[T][L]`
    pub(crate) state: Array2<f64>,
    /// Transition scores `[L][L]`, `[i][j]` for `i -> j`
    pub(crate) trans: Array2<f64>,
    /// Log-domain forward scores `[T][L]`
    alpha: Array2<f64>,
    /// Log-domain backward scores `[T][L]`
    beta: Array2<f64>,
    /// Best predecessor of `(t, j)`, only with `Flag::VITERBI`
    backward_edge: Array2<u32>,
}

impl Lattice {
    pub(crate) fn new(flag: Flag, num_labels: usize, num_items: usize) -> Self {
        let (alpha, beta) = if flag.contains(Flag::MARGINALS) {
            (
                Array2::zeros((num_items, num_labels)),
                Array2::zeros((num_items, num_labels)),
            )
        } else {
            (Array2::zeros((0, 0)), Array2::zeros((0, 0)))
        };
        let backward_edge = if flag.contains(Flag::VITERBI) {
            Array2::zeros((num_items, num_labels))
        } else {
            Array2::zeros((0, 0))
        };
        Self {
            flag,
            num_labels,
            num_items,
            state: Array2::zeros((num_items, num_labels)),
            trans: Array2::zeros((num_labels, num_labels)),
            alpha,
            beta,
            backward_edge,
        }
    }

    pub(crate) fn transition_score(&mut self, model: &Model) {
        for i in 0..self.num_labels {
            for j in 0..self.num_labels {
                self.trans[[i, j]] = model.transition(i, j);
            }
        }
    }

    pub(crate) fn state_score(&mut self, model: &Model, items: &[Item]) -> Result<()> {
        for (t, item) in items.iter().enumerate() {
            for l in 0..self.num_labels {
                self.state[[t, l]] = model.state_score(item, l)?;
            }
        }
        Ok(())
    }

    /// Rule out every tag that disagrees with an observed gold tag
    fn mask(&mut self, example: &Example) -> Result<()> {
        for t in 0..self.num_items {
            if let Some(gold) = example.gold(t) {
                let gold = gold as usize;
                if gold >= self.num_labels {
                    return Err(Error::index(format!(
                        "gold tag {} at position {} out of range (n_tag = {})",
                        gold, t, self.num_labels
                    )));
                }
                for l in 0..self.num_labels {
                    if l != gold {
                        self.state[[t, l]] = f64::NEG_INFINITY;
                    }
                }
            }
        }
        Ok(())
    }

    fn forward(&mut self) -> f64 {
        let (l, t) = (self.num_labels, self.num_items);
        if t == 0 {
            // A single empty path
            return 0.0;
        }

        for j in 0..l {
            self.alpha[[0, j]] = self.state[[0, j]];
        }
        for time in 1..t {
            for j in 0..l {
                let prev = self.alpha.row(time - 1);
                let trans = self.trans.column(j);
                let score = logsumexp(prev.iter().zip(trans.iter()).map(|(&a, &w)| a + w));
                self.alpha[[time, j]] = score + self.state[[time, j]];
            }
        }
        logsumexp(self.alpha.row(t - 1).iter().copied())
    }

    fn backward(&mut self) {
        let (l, t) = (self.num_labels, self.num_items);
        if t == 0 {
            return;
        }

        self.beta.row_mut(t - 1).fill(0.0);
        for time in (0..t - 1).rev() {
            for i in 0..l {
                let next: ArrayView1<f64> = self.beta.row(time + 1);
                let state = self.state.row(time + 1);
                let trans = self.trans.row(i);
                let score = logsumexp(
                    trans
                        .iter()
                        .zip(state.iter())
                        .zip(next.iter())
                        .map(|((&w, &s), &b)| w + s + b),
                );
                self.beta[[time, i]] = score;
            }
        }
    }

    /// Run forward-backward over the current scores and collect marginals
    fn marginals(&mut self) -> BeliefTable {
        debug_assert!(self.flag.contains(Flag::MARGINALS));
        let (l, t) = (self.num_labels, self.num_items);
        let log_z = self.forward();
        self.backward();

        let mut table = BeliefTable::new(t, l);
        table.log_z = log_z;
        // Zero mass: no admissible path, leave every marginal at zero
        if log_z == f64::NEG_INFINITY {
            return table;
        }

        for time in 0..t {
            for j in 0..l {
                table.node[[time, j]] = (self.alpha[[time, j]] + self.beta[[time, j]] - log_z).exp();
            }
        }
        for time in 1..t {
            for i in 0..l {
                for j in 0..l {
                    let score = self.alpha[[time - 1, i]]
                        + self.trans[[i, j]]
                        + self.state[[time, j]]
                        + self.beta[[time, j]]
                        - log_z;
                    table.edge[[time, i, j]] = score.exp();
                }
            }
        }
        table
    }

    /// Best label path and its score, ties resolved to the lowest label id
    pub(crate) fn viterbi(&mut self) -> (Vec<u32>, f64) {
        debug_assert!(self.flag.contains(Flag::VITERBI));
        let (l, t) = (self.num_labels, self.num_items);
        if t == 0 {
            return (Vec::new(), 0.0);
        }

        let mut score = self.state.row(0).to_owned();
        let mut next_score = vec![f64::NEG_INFINITY; l];
        for time in 1..t {
            for j in 0..l {
                let mut max_score = f64::NEG_INFINITY;
                let mut argmax_score = 0;
                for i in 0..l {
                    // Transit from (t-1, i) to (t, j)
                    let s = score[i] + self.trans[[i, j]];
                    if max_score < s {
                        max_score = s;
                        argmax_score = i;
                    }
                }
                self.backward_edge[[time, j]] = argmax_score as u32;
                next_score[j] = max_score + self.state[[time, j]];
            }
            for (s, &n) in score.iter_mut().zip(next_score.iter()) {
                *s = n;
            }
        }

        let mut labels = vec![0u32; t];
        let mut max_score = f64::NEG_INFINITY;
        for (i, &s) in score.iter().enumerate() {
            if max_score < s {
                max_score = s;
                labels[t - 1] = i as u32;
            }
        }
        // Tag labels by tracing the backward links
        for time in (0..t - 1).rev() {
            let next_label = labels[time + 1] as usize;
            labels[time] = self.backward_edge[[time + 1, next_label]];
        }
        (labels, max_score)
    }
}
