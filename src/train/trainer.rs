use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::minibatch::{accumulate, accumulate_parallel, BatchGradient};
use crate::context::{ForwardBackward, Inference};
use crate::dataset::Example;
use crate::error::{Error, Result};
use crate::model::Model;

/// Which parameters the L2 term is applied to after a minibatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RegScope {
    /// Only parameters touched by the minibatch
    #[default]
    Touched,
    /// Every parameter
    All,
}

/// Minibatch SGD parameters.
#[derive(Debug, Clone)]
pub struct SgdParams {
    rate0: f64,
    decay: f64,
    reg: f64,
    batch_size: usize,
    max_iterations: usize,
    shuffle_seed: Option<u64>,
    parallel: bool,
    reg_scope: RegScope,
}

impl Default for SgdParams {
    fn default() -> Self {
        Self {
            rate0: 0.05,
            decay: 0.9,
            reg: 1.0,
            batch_size: 1,
            max_iterations: 20,
            shuffle_seed: None,
            parallel: false,
            reg_scope: RegScope::Touched,
        }
    }
}

impl SgdParams {
    pub fn rate0(&self) -> f64 {
        self.rate0
    }

    pub fn set_rate0(&mut self, rate0: f64) -> Result<()> {
        if !(rate0 > 0.0) {
            return Err(Error::config("rate0 must be positive"));
        }
        self.rate0 = rate0;
        Ok(())
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }

    pub fn set_decay(&mut self, decay: f64) -> Result<()> {
        if !(decay > 0.0 && decay <= 1.0) {
            return Err(Error::config("decay must be in (0, 1]"));
        }
        self.decay = decay;
        Ok(())
    }

    /// Standard deviation of the Gaussian prior, `0` disables regularization
    pub fn reg(&self) -> f64 {
        self.reg
    }

    pub fn set_reg(&mut self, reg: f64) -> Result<()> {
        if !(reg >= 0.0) {
            return Err(Error::config("reg must be non-negative"));
        }
        self.reg = reg;
        Ok(())
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn set_batch_size(&mut self, batch_size: usize) -> Result<()> {
        if batch_size == 0 {
            return Err(Error::config("batch_size must be positive"));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) -> Result<()> {
        if max_iterations < 1 {
            return Err(Error::config("max_iterations must be at least 1"));
        }
        self.max_iterations = max_iterations;
        Ok(())
    }

    pub fn shuffle_seed(&self) -> Option<u64> {
        self.shuffle_seed
    }

    pub fn set_shuffle_seed(&mut self, seed: Option<u64>) {
        self.shuffle_seed = seed;
    }

    pub fn parallel(&self) -> bool {
        self.parallel
    }

    pub fn set_parallel(&mut self, parallel: bool) {
        self.parallel = parallel;
    }

    pub fn reg_scope(&self) -> RegScope {
        self.reg_scope
    }

    pub fn set_reg_scope(&mut self, scope: RegScope) {
        self.reg_scope = scope;
    }

    /// Set a parameter by name
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "rate0" => self.set_rate0(parse(name, value)?),
            "decay" => self.set_decay(parse(name, value)?),
            "reg" => self.set_reg(parse(name, value)?),
            "batch_size" => self.set_batch_size(parse(name, value)?),
            "max_iterations" => self.set_max_iterations(parse(name, value)?),
            "shuffle_seed" => {
                let seed = if value == "none" {
                    None
                } else {
                    Some(parse(name, value)?)
                };
                self.set_shuffle_seed(seed);
                Ok(())
            }
            "parallel" => {
                self.set_parallel(parse(name, value)?);
                Ok(())
            }
            "reg_scope" => {
                let scope = match value {
                    "touched" => RegScope::Touched,
                    "all" => RegScope::All,
                    _ => {
                        return Err(Error::config(format!(
                            "invalid value for reg_scope: {}",
                            value
                        )))
                    }
                };
                self.set_reg_scope(scope);
                Ok(())
            }
            _ => Err(Error::config(format!("unknown parameter: {}", name))),
        }
    }

    /// Get a parameter by name
    pub fn get(&self, name: &str) -> Result<String> {
        let value = match name {
            "rate0" => self.rate0.to_string(),
            "decay" => self.decay.to_string(),
            "reg" => self.reg.to_string(),
            "batch_size" => self.batch_size.to_string(),
            "max_iterations" => self.max_iterations.to_string(),
            "shuffle_seed" => match self.shuffle_seed {
                Some(seed) => seed.to_string(),
                None => "none".to_string(),
            },
            "parallel" => self.parallel.to_string(),
            "reg_scope" => match self.reg_scope {
                RegScope::Touched => "touched".to_string(),
                RegScope::All => "all".to_string(),
            },
            _ => return Err(Error::config(format!("unknown parameter: {}", name))),
        };
        Ok(value)
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::config(format!("invalid value for {}: {}", name, value)))
}

/// Summary of a training run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainReport {
    /// Objective (loss plus L2 term) after each epoch
    pub epoch_losses: Vec<f64>,
    /// Degenerate sequences seen over the whole run
    pub degenerate: usize,
}

/// Minibatch SGD trainer with sparse updates
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    params: SgdParams,
}

impl Trainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: SgdParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SgdParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut SgdParams {
        &mut self.params
    }

    /// Set initial learning rate (builder pattern)
    pub fn with_rate0(mut self, rate0: f64) -> Result<Self> {
        self.params.set_rate0(rate0)?;
        Ok(self)
    }

    /// Set per-epoch learning rate decay (builder pattern)
    pub fn with_decay(mut self, decay: f64) -> Result<Self> {
        self.params.set_decay(decay)?;
        Ok(self)
    }

    /// Set L2 prior deviation (builder pattern)
    pub fn with_reg(mut self, reg: f64) -> Result<Self> {
        self.params.set_reg(reg)?;
        Ok(self)
    }

    /// Set minibatch size (builder pattern)
    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        self.params.set_batch_size(batch_size)?;
        Ok(self)
    }

    /// Set maximum iterations (builder pattern)
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Result<Self> {
        self.params.set_max_iterations(max_iterations)?;
        Ok(self)
    }

    /// Train `model` in place with forward-backward beliefs
    pub fn train(&self, model: &mut Model, examples: &[Example]) -> Result<TrainReport> {
        self.train_with(model, examples, &ForwardBackward)
    }

    /// Train `model` in place with beliefs from `inference`
    pub fn train_with<I: Inference + ?Sized>(
        &self,
        model: &mut Model,
        examples: &[Example],
        inference: &I,
    ) -> Result<TrainReport> {
        if examples.is_empty() {
            return Err(Error::config("no training data"));
        }

        let params = &self.params;
        let mut rng = match params.shuffle_seed() {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut indices: Vec<usize> = (0..examples.len()).collect();
        let mut grad = vec![0.0; model.num_params()];
        let mut report = TrainReport::default();

        log::info!(
            "training with minibatch SGD ({} examples, {} weights, batch_size={}, rate0={}, reg={})",
            examples.len(),
            model.num_params(),
            params.batch_size(),
            params.rate0(),
            params.reg()
        );

        for epoch in 0..params.max_iterations() {
            indices.shuffle(&mut rng);
            let rate = params.rate0() * params.decay().powi(epoch as i32);
            let mut loss = 0.0;
            let mut touched_total = 0;

            for chunk in indices.chunks(params.batch_size()) {
                let batch: Vec<&Example> = chunk.iter().map(|&i| &examples[i]).collect();

                let out = if params.parallel() {
                    accumulate_parallel(&mut grad, model, &batch, inference)?
                } else {
                    accumulate(&mut grad, model, &batch, inference)?
                };
                self.update(model, &mut grad, &out, rate);

                log::debug!(
                    "batch loss {:.6}, {} weights touched",
                    out.loss,
                    out.touched.len()
                );
                loss += out.loss;
                touched_total += out.touched.len();
                report.degenerate += out.degenerate;
            }

            if params.reg() > 0.0 {
                let norm2: f64 = model.weights().iter().map(|w| w * w).sum();
                loss += norm2 / (2.0 * params.reg() * params.reg());
            }
            if !loss.is_finite() {
                log::warn!("epoch {}: objective is not finite", epoch + 1);
            }
            log::info!(
                "epoch {}: objective = {:.6}, rate = {:.6}, touched = {}",
                epoch + 1,
                loss,
                rate,
                touched_total
            );
            report.epoch_losses.push(loss);
        }

        if report.degenerate > 0 {
            log::warn!("{} degenerate sequences during training", report.degenerate);
        }
        Ok(report)
    }

    /// Apply one SGD step and clear the entries of `grad` it consumed
    fn update(&self, model: &mut Model, grad: &mut [f64], out: &BatchGradient, rate: f64) {
        let reg = self.params.reg();
        let inv_var = if reg > 0.0 { 1.0 / (reg * reg) } else { 0.0 };
        let weights = model.weights_mut();

        if self.params.reg_scope() == RegScope::All && inv_var > 0.0 {
            for (w, g) in weights.iter_mut().zip(grad.iter_mut()) {
                *g += *w * inv_var;
                *w -= rate * *g;
                *g = 0.0;
            }
            return;
        }

        for &i in &out.touched {
            grad[i] += weights[i] * inv_var;
            weights[i] -= rate * grad[i];
            grad[i] = 0.0;
        }
    }
}
