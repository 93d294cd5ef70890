//! Training module for CRF models
//!
//! Per-sequence gradient assembly from belief tables, minibatch
//! accumulation and a minibatch SGD trainer with sparse updates.

mod gradient;
mod minibatch;
mod trainer;

pub use self::gradient::{sequence_gradient, Degeneracy, SequenceGradient, TouchedSet};
pub use self::minibatch::{accumulate, accumulate_parallel, BatchGradient};
pub use self::trainer::{RegScope, SgdParams, TrainReport, Trainer};
