//! Prior distributions over outcomes.
//!
//! A prior supplies the log-probability each outcome starts from before any
//! predicate weight is added. Priors are shared between the trainer and the
//! trained model, so implementations must be `Send + Sync`.

use std::collections::HashMap;
use std::fmt;

use crate::dataset::IndexedEventTable;
use crate::dictionary::Dictionary;
use crate::error::{Error, Result};

/// A baseline log-probability per outcome for a context
pub trait Prior: fmt::Debug + Send + Sync {
    /// Fill `log_prior` (one slot per outcome) for the given context.
    ///
    /// `context` holds predicate indices and `values` their parallel values,
    /// if any.
    fn log_prior(&self, log_prior: &mut [f64], context: &[u32], values: Option<&[f64]>);
}

/// The uniform prior: every outcome starts at zero
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformPrior;

impl Prior for UniformPrior {
    fn log_prior(&self, log_prior: &mut [f64], _context: &[u32], _values: Option<&[f64]>) {
        log_prior.fill(0.0);
    }
}

/// A context-independent, non-uniform prior over outcomes
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomePrior {
    log_probs: Vec<f64>,
}

impl OutcomePrior {
    /// Build a prior from a probability per outcome label.
    ///
    /// Every label of `outcomes` needs a positive probability; the
    /// probabilities are renormalized to sum to one.
    pub fn new<S: AsRef<str>>(outcomes: &Dictionary, probs: &[(S, f64)]) -> Result<Self> {
        let by_label: HashMap<&str, f64> = probs.iter().map(|(s, p)| (s.as_ref(), *p)).collect();
        let mut weights = Vec::with_capacity(outcomes.len());
        for (label, _) in outcomes.iter() {
            match by_label.get(label) {
                Some(&p) if p > 0.0 && p.is_finite() => weights.push(p),
                Some(_) => {
                    return Err(Error::InvalidParameter {
                        name: "prior",
                        reason: "probabilities must be positive and finite",
                    })
                }
                None => {
                    return Err(Error::InvalidParameter {
                        name: "prior",
                        reason: "must cover every outcome",
                    })
                }
            }
        }
        Ok(Self::from_weights(&weights))
    }

    /// The empirical outcome distribution of an indexed table
    pub fn from_table(table: &IndexedEventTable) -> Self {
        let mut weights = vec![0.0; table.outcomes().len()];
        for event in table.events() {
            weights[event.outcome as usize] += f64::from(event.count);
        }
        Self::from_weights(&weights)
    }

    fn from_weights(weights: &[f64]) -> Self {
        let total: f64 = weights.iter().sum();
        let log_probs = weights.iter().map(|w| (w / total).ln()).collect();
        Self { log_probs }
    }

    /// Log-probability per outcome index
    pub fn log_probs(&self) -> &[f64] {
        &self.log_probs
    }
}

impl Prior for OutcomePrior {
    fn log_prior(&self, log_prior: &mut [f64], _context: &[u32], _values: Option<&[f64]>) {
        for (slot, &lp) in log_prior.iter_mut().zip(&self.log_probs) {
            *slot = lp;
        }
    }
}
