use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use crate::parameters::Parameters;
use crate::predicate::Predicate;
use crate::prior::{Prior, UniformPrior};

/// A trained maximum entropy model
///
/// The model is immutable once built and can be shared between threads,
/// e.g. behind an [`Arc`]. Evaluation never mutates it.
#[derive(Clone)]
pub struct MaxentModel {
    outcomes: Dictionary,
    predicates: Dictionary,
    params: Parameters,
    prior: Arc<dyn Prior>,
}

impl fmt::Debug for MaxentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaxentModel")
            .field("num_outcomes", &self.outcomes.len())
            .field("num_predicates", &self.predicates.len())
            .field("num_parameters", &self.params.num_parameters())
            .field("correction_constant", &self.params.correction_constant())
            .field("correction_weight", &self.params.correction_weight())
            .field("prior", &self.prior)
            .finish()
    }
}

impl MaxentModel {
    /// Build a model from label tables and parameters, using the uniform prior
    pub fn new(outcomes: Dictionary, predicates: Dictionary, params: Parameters) -> Result<Self> {
        if outcomes.is_empty() {
            return Err(Error::invalid_model("a model needs at least one outcome"));
        }
        if predicates.len() != params.num_predicates() {
            return Err(Error::invalid_model(format!(
                "{} predicate labels for {} parameter rows",
                predicates.len(),
                params.num_predicates()
            )));
        }
        Ok(Self {
            outcomes,
            predicates,
            params,
            prior: Arc::new(UniformPrior),
        })
    }

    /// Replace the prior used during evaluation
    pub fn with_prior(mut self, prior: Arc<dyn Prior>) -> Self {
        self.prior = prior;
        self
    }

    /// Number of outcomes
    pub fn num_outcomes(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of predicates
    pub fn num_predicates(&self) -> usize {
        self.predicates.len()
    }

    /// Convert an outcome index to its label
    pub fn outcome_label(&self, index: usize) -> Option<&str> {
        self.outcomes.get_name(index as u32)
    }

    /// Convert an outcome label to its index
    pub fn outcome_index(&self, label: &str) -> Option<usize> {
        self.outcomes.get_id(label).map(|id| id as usize)
    }

    /// Convert a predicate index to its label
    pub fn predicate_label(&self, index: usize) -> Option<&str> {
        self.predicates.get_name(index as u32)
    }

    /// Convert a predicate label to its index
    pub fn predicate_index(&self, label: &str) -> Option<usize> {
        self.predicates.get_id(label).map(|id| id as usize)
    }

    /// Outcome label table
    pub fn outcomes(&self) -> &Dictionary {
        &self.outcomes
    }

    /// Predicate label table
    pub fn predicates(&self) -> &Dictionary {
        &self.predicates
    }

    /// Trained parameters
    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// Prior used during evaluation
    pub fn prior(&self) -> &Arc<dyn Prior> {
        &self.prior
    }

    /// Correction constant
    pub fn correction_constant(&self) -> f64 {
        self.params.correction_constant()
    }

    /// Correction feature weight
    pub fn correction_weight(&self) -> f64 {
        self.params.correction_weight()
    }

    /// Outcome distribution for a context of binary predicates.
    ///
    /// Predicates unknown to the model are ignored.
    pub fn eval<S: AsRef<str>>(&self, context: &[S]) -> Vec<f64> {
        let indices: Vec<u32> = context
            .iter()
            .filter_map(|name| self.predicates.get_id(name.as_ref()))
            .collect();
        let mut probs = vec![0.0; self.num_outcomes()];
        self.eval_indexed(&indices, None, &mut probs);
        probs
    }

    /// Outcome distribution for a context of valued predicates
    pub fn eval_weighted(&self, context: &[Predicate]) -> Vec<f64> {
        let mut indices = Vec::with_capacity(context.len());
        let mut values = Vec::with_capacity(context.len());
        for pred in context {
            if let Some(id) = self.predicates.get_id(&pred.name) {
                indices.push(id);
                values.push(pred.value);
            }
        }
        let mut probs = vec![0.0; self.num_outcomes()];
        self.eval_indexed(&indices, Some(&values), &mut probs);
        probs
    }

    /// Outcome distribution for a context given as predicate indices.
    ///
    /// `probs` must have one slot per outcome; it is overwritten. Indices
    /// outside the predicate table are skipped.
    ///
    /// # Panics
    ///
    /// Panics if `probs.len()` differs from [`num_outcomes`](Self::num_outcomes).
    pub fn eval_indexed(&self, context: &[u32], values: Option<&[f64]>, probs: &mut [f64]) {
        assert_eq!(
            probs.len(),
            self.num_outcomes(),
            "probability buffer must have one slot per outcome"
        );
        let mut contributions = vec![0u32; self.num_outcomes()];
        eval_kernel(
            &self.params,
            self.prior.as_ref(),
            context,
            values,
            probs,
            &mut contributions,
        );
    }

    /// Index of the most probable outcome; ties go to the lowest index
    pub fn best_outcome(&self, probs: &[f64]) -> usize {
        best_outcome(probs)
    }

    /// Label of the most probable outcome
    pub fn best_outcome_label(&self, probs: &[f64]) -> Option<&str> {
        self.outcome_label(best_outcome(probs))
    }

    /// Render a distribution as `label[p]` pairs
    pub fn all_outcomes(&self, probs: &[f64]) -> String {
        let mut out = String::new();
        for (i, (label, _)) in self.outcomes.iter().enumerate() {
            if i > 0 {
                out.push_str("  ");
            }
            let p = probs.get(i).copied().unwrap_or(0.0);
            out.push_str(&format!("{}[{:.4}]", label, p));
        }
        out
    }

    /// Print the model in human-readable format
    pub fn dump<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "MODEL = {{")?;
        writeln!(w, "  type: GIS")?;
        writeln!(w, "  num_outcomes: {}", self.num_outcomes())?;
        writeln!(w, "  num_predicates: {}", self.num_predicates())?;
        writeln!(w, "  num_parameters: {}", self.params.num_parameters())?;
        writeln!(
            w,
            "  correction_constant: {}",
            self.params.correction_constant()
        )?;
        writeln!(
            w,
            "  correction_weight: {:.6}",
            self.params.correction_weight()
        )?;
        writeln!(w, "}}\n")?;
        writeln!(w, "OUTCOMES = {{")?;
        for (label, i) in self.outcomes.iter() {
            writeln!(w, "  {:>5}: {}", i, label)?;
        }
        writeln!(w, "}}\n")?;
        writeln!(w, "PREDICATES = {{")?;
        for (label, i) in self.predicates.iter() {
            writeln!(w, "  {:>5}: {}", i, label)?;
        }
        writeln!(w, "}}\n")?;
        writeln!(w, "PARAMETERS = {{")?;
        for (label, pid) in self.predicates.iter() {
            for (oid, weight) in self.params.predicate(pid as usize).iter() {
                let outcome = self.outcomes.get_name(oid).unwrap_or("?");
                writeln!(w, "  {} --> {}: {:.6}", label, outcome, weight)?;
            }
        }
        writeln!(w, "}}\n")?;
        Ok(())
    }
}

/// Index of the largest probability; ties go to the lowest index
pub fn best_outcome(probs: &[f64]) -> usize {
    let mut best = 0;
    for (i, &p) in probs.iter().enumerate().skip(1) {
        if p > probs[best] {
            best = i;
        }
    }
    best
}

/// The evaluation kernel shared by training and serving.
///
/// Weights are stored in GIS units, i.e. scaled by the correction constant
/// `C`, so every feature contribution is divided by `C`. On return
/// `contributions[o]` holds how many context predicates had a weight for
/// outcome `o`.
pub(crate) fn eval_kernel(
    params: &Parameters,
    prior: &dyn Prior,
    context: &[u32],
    values: Option<&[f64]>,
    probs: &mut [f64],
    contributions: &mut [u32],
) {
    prior.log_prior(probs, context, values);
    contributions.fill(0);

    let num_predicates = params.num_predicates();
    let inverse = 1.0 / params.correction_constant();
    for (i, &pid) in context.iter().enumerate() {
        let pid = pid as usize;
        if pid >= num_predicates {
            continue;
        }
        let value = match values {
            Some(values) => values.get(i).copied().unwrap_or(1.0),
            None => 1.0,
        };
        let pred = params.predicate(pid);
        for (&oid, &weight) in pred.outcomes.iter().zip(pred.weights) {
            let oid = oid as usize;
            contributions[oid] += 1;
            probs[oid] += weight * value * inverse;
        }
    }

    let correction_weight = params.correction_weight();
    if correction_weight != 0.0 {
        let c = params.correction_constant();
        for (acc, &n) in probs.iter_mut().zip(contributions.iter()) {
            *acc += correction_weight * (c - f64::from(n)) * inverse;
        }
    }

    normalize(probs);
}

/// Exponentiate log-scores in place and normalize them to a distribution
fn normalize(scores: &mut [f64]) {
    if scores.is_empty() {
        return;
    }
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY || scores.iter().any(|s| s.is_nan()) {
        let uniform = 1.0 / scores.len() as f64;
        scores.fill(uniform);
        return;
    }
    if max == f64::INFINITY {
        // Overflowed scores share all of the mass
        let winners = scores.iter().filter(|&&s| s == f64::INFINITY).count() as f64;
        for s in scores.iter_mut() {
            *s = if *s == f64::INFINITY { 1.0 / winners } else { 0.0 };
        }
        return;
    }
    let mut sum = 0.0;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        sum += *s;
    }
    for s in scores.iter_mut() {
        *s /= sum;
    }
}
