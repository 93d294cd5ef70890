//! Linear-chain Conditional Random Fields for sequence labeling
//!
//! The crate covers the numeric core of a CRF tagger: the dense weight
//! vector and its feature indexing, log-domain forward-backward beliefs,
//! gradient assembly from free and gold-constrained beliefs, minibatch
//! accumulation, SGD training and a plain-text model format.
//!
//! # Examples
//!
//! ## Training
//!
//! ```no_run
//! use crfseg::train::Trainer;
//! use crfseg::{Dataset, Init, Model, ModelStore};
//!
//! let mut data = Dataset::new();
//! data.append(&[vec!["c=北", "r=京"], vec!["c=京", "l=北"]], &["B", "E"])?;
//! data.append(&[vec!["c=我"]], &["S"])?;
//!
//! let mut model = Model::new(data.num_features(), data.num_tags(), Init::Zero)?;
//! let trainer = Trainer::new().with_batch_size(8)?.with_max_iterations(10)?;
//! trainer.train(&mut model, data.examples())?;
//! ModelStore::save(&model, "model.txt")?;
//! # Ok::<(), crfseg::Error>(())
//! ```
//!
//! ## Tagging
//!
//! ```no_run
//! use crfseg::{LoadMode, ModelStore, Tagger};
//!
//! let model = ModelStore::load("model.txt", LoadMode::Strict)?;
//! let tagger = Tagger::new(&model);
//! let tags = tagger.tag(&[vec![0, 1], vec![2]])?;
//! # Ok::<(), crfseg::Error>(())
//! ```

mod context;
mod dataset;
mod dictionary;
mod error;
mod model;
mod store;
mod tagger;

/// Training module containing gradient assembly, minibatch accumulation and SGD
pub mod train;

pub use self::context::{BeliefTable, ForwardBackward, Inference, Mask};
pub use self::dataset::{Dataset, Example, Item};
pub use self::dictionary::Dictionary;
pub use self::error::{Error, Result};
pub use self::model::{Init, Model};
pub use self::store::{LoadMode, ModelStore};
pub use self::tagger::Tagger;
