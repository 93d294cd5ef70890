use crate::dictionary::Dictionary;
use crate::error::{Error, Result};

/// Active node feature ids at one position
pub type Item = Vec<u32>;

/// A sequence of items with optional gold tags
///
/// A position whose label is `None` is unobserved: the gold-constrained
/// distribution leaves it free, which allows partially labeled sequences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Example {
    /// Active feature ids per position
    pub features: Vec<Item>,
    /// Gold tag per position
    pub labels: Vec<Option<u32>>,
}

impl Example {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            features: Vec::with_capacity(cap),
            labels: Vec::with_capacity(cap),
        }
    }

    /// Build a fully labeled example
    pub fn labeled(features: Vec<Item>, labels: Vec<u32>) -> Result<Self> {
        if features.len() != labels.len() {
            return Err(Error::config(
                "features and labels must have the same length",
            ));
        }
        Ok(Self {
            features,
            labels: labels.into_iter().map(Some).collect(),
        })
    }

    /// Build an example without any gold tags
    pub fn unlabeled(features: Vec<Item>) -> Self {
        let labels = vec![None; features.len()];
        Self { features, labels }
    }

    pub fn push(&mut self, item: Item, label: Option<u32>) {
        self.features.push(item);
        self.labels.push(label);
    }

    /// Sequence length
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Gold tag at position `t`, if observed
    pub fn gold(&self, t: usize) -> Option<u32> {
        self.labels.get(t).copied().flatten()
    }
}

/// Labeled examples together with the feature and tag dictionaries used to
/// turn extracted feature strings into dense ids
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    examples: Vec<Example>,
    features: Dictionary,
    tags: Dictionary,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a labeled sequence of already extracted feature strings
    pub fn append<I, F, L>(&mut self, xseq: &[I], yseq: &[L]) -> Result<()>
    where
        I: AsRef<[F]>,
        F: AsRef<str>,
        L: AsRef<str>,
    {
        if xseq.len() != yseq.len() {
            return Err(Error::config(
                "xseq and yseq must have the same length",
            ));
        }

        let mut example = Example::with_capacity(xseq.len());
        for (item, label) in xseq.iter().zip(yseq.iter()) {
            let item = item
                .as_ref()
                .iter()
                .map(|name| self.features.get_or_insert(name.as_ref()))
                .collect();
            let tag = self.tags.get_or_insert(label.as_ref());
            example.push(item, Some(tag));
        }
        self.examples.push(example);
        Ok(())
    }

    /// Map a feature string sequence to ids, dropping features never seen
    /// during [`append`](Self::append)
    pub fn encode<I, F>(&self, xseq: &[I]) -> Vec<Item>
    where
        I: AsRef<[F]>,
        F: AsRef<str>,
    {
        xseq.iter()
            .map(|item| {
                item.as_ref()
                    .iter()
                    .filter_map(|name| self.features.get(name.as_ref()))
                    .collect()
            })
            .collect()
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    pub fn num_tags(&self) -> usize {
        self.tags.len()
    }

    /// Tag name for a tag id
    pub fn tag_name(&self, id: u32) -> Option<&str> {
        self.tags.name(id)
    }

    pub fn clear(&mut self) {
        self.examples.clear();
        self.features.clear();
        self.tags.clear();
    }
}
