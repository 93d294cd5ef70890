use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};

/// Weight initialization for a fresh model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Init {
    /// All weights start at zero
    #[default]
    Zero,
    /// Weights drawn uniformly from `[-1, 1)`
    Random {
        /// Seed for reproducible draws, entropy when `None`
        seed: Option<u64>,
    },
}

/// Dense parameter vector of a linear-chain CRF
///
/// The vector holds `n_tag * (n_feature + n_tag)` weights split into two
/// contiguous regions:
///
/// * state weights, `n_feature * n_tag` entries addressed by
///   `(feature, tag) -> feature * n_tag + tag`
/// * transition weights, `n_tag * n_tag` entries after the state region
///   addressed by `(prev_tag, tag) -> offset + tag * n_tag + prev_tag`
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Number of distinct tags
    n_tag: usize,
    /// Number of distinct node features
    n_feature: usize,
    /// Parameters, state region first
    weights: Vec<f64>,
}

impl Model {
    /// Create a fresh model for `n_feature` node features and `n_tag` tags
    pub fn new(n_feature: usize, n_tag: usize, init: Init) -> Result<Self> {
        let size = Self::param_count(n_feature, n_tag)?;
        let weights = match init {
            Init::Zero => vec![0.0; size],
            Init::Random { seed } => {
                let mut rng = match seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                (0..size).map(|_| rng.gen_range(-1.0..1.0)).collect()
            }
        };
        Ok(Self {
            n_tag,
            n_feature,
            weights,
        })
    }

    /// Wrap an existing parameter vector, deriving the feature count from its length
    pub fn from_weights(n_tag: usize, weights: Vec<f64>) -> Result<Self> {
        if n_tag == 0 {
            return Err(Error::config("n_tag must be positive"));
        }
        let size = weights.len();
        if size % n_tag != 0 || size / n_tag < n_tag {
            return Err(Error::config(format!(
                "{} weights do not form a model with {} tags",
                size, n_tag
            )));
        }
        Ok(Self {
            n_tag,
            n_feature: size / n_tag - n_tag,
            weights,
        })
    }

    /// Create a model with the same shape as `self`
    ///
    /// With `copy_weights` the weights are deep-copied, otherwise the new
    /// model is zeroed, e.g. to serve as an averaging accumulator.
    pub fn new_like(&self, copy_weights: bool) -> Self {
        let weights = if copy_weights {
            self.weights.clone()
        } else {
            vec![0.0; self.weights.len()]
        };
        Self {
            n_tag: self.n_tag,
            n_feature: self.n_feature,
            weights,
        }
    }

    fn param_count(n_feature: usize, n_tag: usize) -> Result<usize> {
        if n_tag == 0 {
            return Err(Error::config("n_tag must be positive"));
        }
        n_feature
            .checked_add(n_tag)
            .and_then(|n| n.checked_mul(n_tag))
            .ok_or_else(|| {
                Error::config(format!(
                    "model with {} features and {} tags is too large",
                    n_feature, n_tag
                ))
            })
    }

    /// Number of distinct tags
    pub fn num_tags(&self) -> usize {
        self.n_tag
    }

    /// Number of distinct node features
    pub fn num_features(&self) -> usize {
        self.n_feature
    }

    /// Total number of parameters, `n_tag * (n_feature + n_tag)`
    pub fn num_params(&self) -> usize {
        self.weights.len()
    }

    /// Offset of the transition region
    pub fn transition_offset(&self) -> usize {
        self.n_feature * self.n_tag
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut [f64] {
        &mut self.weights
    }

    /// Parameter index of the state weight for `(feature_id, tag_id)`
    ///
    /// Ids must already be in range; see [`checked_node_index`](Self::checked_node_index).
    #[inline]
    pub fn node_index(&self, feature_id: usize, tag_id: usize) -> usize {
        debug_assert!(feature_id < self.n_feature && tag_id < self.n_tag);
        feature_id * self.n_tag + tag_id
    }

    /// Parameter index of the transition weight `prev_tag_id -> tag_id`
    #[inline]
    pub fn tag_tag_index(&self, prev_tag_id: usize, tag_id: usize) -> usize {
        debug_assert!(prev_tag_id < self.n_tag && tag_id < self.n_tag);
        self.transition_offset() + tag_id * self.n_tag + prev_tag_id
    }

    /// Range-checked [`node_index`](Self::node_index)
    pub fn checked_node_index(&self, feature_id: usize, tag_id: usize) -> Result<usize> {
        if feature_id >= self.n_feature {
            return Err(Error::index(format!(
                "feature id {} out of range (n_feature = {})",
                feature_id, self.n_feature
            )));
        }
        self.check_tag(tag_id)?;
        Ok(self.node_index(feature_id, tag_id))
    }

    /// Range-checked [`tag_tag_index`](Self::tag_tag_index)
    pub fn checked_tag_tag_index(&self, prev_tag_id: usize, tag_id: usize) -> Result<usize> {
        self.check_tag(prev_tag_id)?;
        self.check_tag(tag_id)?;
        Ok(self.tag_tag_index(prev_tag_id, tag_id))
    }

    pub(crate) fn check_tag(&self, tag_id: usize) -> Result<()> {
        if tag_id >= self.n_tag {
            return Err(Error::index(format!(
                "tag id {} out of range (n_tag = {})",
                tag_id, self.n_tag
            )));
        }
        Ok(())
    }

    /// Total state score of `tag_id` for a set of active features
    pub(crate) fn state_score(&self, features: &[u32], tag_id: usize) -> Result<f64> {
        let mut score = 0.0;
        for &fid in features {
            score += self.weights[self.checked_node_index(fid as usize, tag_id)?];
        }
        Ok(score)
    }

    /// Transition weight `prev_tag_id -> tag_id`
    #[inline]
    pub(crate) fn transition(&self, prev_tag_id: usize, tag_id: usize) -> f64 {
        self.weights[self.tag_tag_index(prev_tag_id, tag_id)]
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_model_shape() {
        let model = Model::new(3, 2, Init::Zero).unwrap();
        assert_eq!(model.num_tags(), 2);
        assert_eq!(model.num_features(), 3);
        assert_eq!(model.num_params(), 2 * (3 + 2));
        assert_eq!(model.transition_offset(), 6);
        assert!(model.weights().iter().all(|&w| w == 0.0));
    }

    #[test]
    fn test_index_regions_disjoint() {
        for &(n_feature, n_tag) in &[(0, 1), (1, 2), (7, 3), (100, 5)] {
            let model = Model::new(n_feature, n_tag, Init::Zero).unwrap();
            let mut seen = HashSet::new();
            for f in 0..n_feature {
                for t in 0..n_tag {
                    let idx = model.node_index(f, t);
                    assert!(idx < model.transition_offset());
                    assert!(seen.insert(idx));
                }
            }
            for p in 0..n_tag {
                for t in 0..n_tag {
                    let idx = model.tag_tag_index(p, t);
                    assert!(idx >= model.transition_offset());
                    assert!(idx < model.num_params());
                    assert!(seen.insert(idx));
                }
            }
            // Every parameter is addressed exactly once
            assert_eq!(seen.len(), model.num_params());
        }
    }

    #[test]
    fn test_transition_layout() {
        let model = Model::new(4, 3, Init::Zero).unwrap();
        // Column-major over (prev, tag): prev varies fastest
        assert_eq!(model.tag_tag_index(0, 0), 12);
        assert_eq!(model.tag_tag_index(1, 0), 13);
        assert_eq!(model.tag_tag_index(0, 1), 15);
    }

    #[test]
    fn test_zero_tags_rejected() {
        let err = Model::new(10, 0, Init::Zero).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = Model::from_weights(0, vec![1.0]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_weights_shape() {
        let model = Model::from_weights(2, vec![0.5; 10]).unwrap();
        assert_eq!(model.num_features(), 3);
        assert!(Model::from_weights(2, vec![0.0; 7]).is_err());
        assert!(Model::from_weights(3, vec![0.0; 6]).is_err());
    }

    #[test]
    fn test_random_init_seeded() {
        let a = Model::new(20, 4, Init::Random { seed: Some(42) }).unwrap();
        let b = Model::new(20, 4, Init::Random { seed: Some(42) }).unwrap();
        assert_eq!(a, b);
        assert!(a.weights().iter().all(|&w| (-1.0..1.0).contains(&w)));
        assert!(a.weights().iter().any(|&w| w != 0.0));
    }

    #[test]
    fn test_new_like() {
        let model = Model::new(5, 2, Init::Random { seed: Some(7) }).unwrap();
        let copy = model.new_like(true);
        assert_eq!(copy, model);
        let zeroed = model.new_like(false);
        assert_eq!(zeroed.num_features(), 5);
        assert_eq!(zeroed.num_tags(), 2);
        assert!(zeroed.weights().iter().all(|&w| w == 0.0));
    }

    #[test]
    fn test_checked_index_errors() {
        let model = Model::new(2, 2, Init::Zero).unwrap();
        assert!(matches!(
            model.checked_node_index(2, 0),
            Err(Error::Index(_))
        ));
        assert!(matches!(
            model.checked_node_index(0, 2),
            Err(Error::Index(_))
        ));
        assert!(matches!(
            model.checked_tag_tag_index(2, 0),
            Err(Error::Index(_))
        ));
        assert_eq!(model.checked_node_index(1, 1).unwrap(), 3);
    }
}
