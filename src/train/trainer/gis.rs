use bitflags::bitflags;
use tracing::{debug, info, warn};

use super::{Progress, Termination, TrainingReport};
use crate::dataset::IndexedEventTable;
use crate::error::{Error, Result};
use crate::model::{best_outcome, eval_kernel};
use crate::parameters::Parameters;
use crate::prior::Prior;
use crate::train::indexer::{EmptyContextPolicy, DEFAULT_CUTOFF};

/// Observed expectation used for the correction feature when every event
/// already carries the full feature mass.
const NEAR_ZERO: f64 = 0.01;

bitflags! {
    /// Smoothing strategies, independently combinable
    #[derive(Default)]
    pub struct Smoothing: u32 {
        /// Pretend every unseen (predicate, outcome) pair was observed a
        /// fraction of a time
        const SIMPLE = 0x01;
        /// Gaussian-smoothed parameter updates
        const GAUSSIAN = 0x02;
        /// Train a correction (slack) feature
        const SLACK = 0x04;
    }
}

/// GIS training parameters.
#[derive(Debug, Clone)]
pub struct GisParams {
    max_iterations: usize,
    cutoff: u32,
    ll_threshold: f64,
    smoothing: Smoothing,
    smoothing_observation: f64,
    sigma: f64,
    empty_context: EmptyContextPolicy,
}

impl Default for GisParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            cutoff: DEFAULT_CUTOFF,
            ll_threshold: 1e-4,
            smoothing: Smoothing::empty(),
            smoothing_observation: 0.1,
            sigma: 2.0,
            empty_context: EmptyContextPolicy::Drop,
        }
    }
}

fn parse_value<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| Error::InvalidParameterValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

impl GisParams {
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) -> Result<()> {
        if max_iterations < 1 {
            return Err(Error::InvalidParameter {
                name: "max_iterations",
                reason: "must be at least 1",
            });
        }
        self.max_iterations = max_iterations;
        Ok(())
    }

    /// Minimum number of occurrences for a predicate to be kept
    pub fn cutoff(&self) -> u32 {
        self.cutoff
    }

    pub fn set_cutoff(&mut self, cutoff: u32) {
        self.cutoff = cutoff;
    }

    /// Log-likelihood improvement below which training has converged
    pub fn ll_threshold(&self) -> f64 {
        self.ll_threshold
    }

    pub fn set_ll_threshold(&mut self, ll_threshold: f64) -> Result<()> {
        if !(ll_threshold >= 0.0) {
            return Err(Error::InvalidParameter {
                name: "ll_threshold",
                reason: "must be non-negative",
            });
        }
        self.ll_threshold = ll_threshold;
        Ok(())
    }

    pub fn smoothing(&self) -> Smoothing {
        self.smoothing
    }

    pub fn set_smoothing(&mut self, smoothing: Smoothing) {
        self.smoothing = smoothing;
    }

    pub fn use_simple_smoothing(&self) -> bool {
        self.smoothing.contains(Smoothing::SIMPLE)
    }

    pub fn set_use_simple_smoothing(&mut self, enabled: bool) {
        self.smoothing.set(Smoothing::SIMPLE, enabled);
    }

    pub fn use_gaussian_smoothing(&self) -> bool {
        self.smoothing.contains(Smoothing::GAUSSIAN)
    }

    pub fn set_use_gaussian_smoothing(&mut self, enabled: bool) {
        self.smoothing.set(Smoothing::GAUSSIAN, enabled);
    }

    pub fn use_slack_parameter(&self) -> bool {
        self.smoothing.contains(Smoothing::SLACK)
    }

    pub fn set_use_slack_parameter(&mut self, enabled: bool) {
        self.smoothing.set(Smoothing::SLACK, enabled);
    }

    /// Pseudo-count given to unseen pairs under simple smoothing
    pub fn smoothing_observation(&self) -> f64 {
        self.smoothing_observation
    }

    pub fn set_smoothing_observation(&mut self, observation: f64) -> Result<()> {
        if !(observation > 0.0 && observation.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "smoothing_observation",
                reason: "must be positive",
            });
        }
        self.smoothing_observation = observation;
        Ok(())
    }

    /// Strength of Gaussian smoothing
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn set_sigma(&mut self, sigma: f64) -> Result<()> {
        if !(sigma > 0.0 && sigma.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "sigma",
                reason: "must be positive",
            });
        }
        self.sigma = sigma;
        Ok(())
    }

    pub fn empty_context_policy(&self) -> EmptyContextPolicy {
        self.empty_context
    }

    pub fn set_empty_context_policy(&mut self, policy: EmptyContextPolicy) {
        self.empty_context = policy;
    }

    /// Set a parameter by name from its string form
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "max_iterations" => self.set_max_iterations(parse_value(name, value)?),
            "cutoff" => {
                self.set_cutoff(parse_value(name, value)?);
                Ok(())
            }
            "ll_threshold" => self.set_ll_threshold(parse_value(name, value)?),
            "simple_smoothing" => {
                self.set_use_simple_smoothing(parse_value(name, value)?);
                Ok(())
            }
            "smoothing_observation" => self.set_smoothing_observation(parse_value(name, value)?),
            "gaussian_smoothing" => {
                self.set_use_gaussian_smoothing(parse_value(name, value)?);
                Ok(())
            }
            "sigma" => self.set_sigma(parse_value(name, value)?),
            "slack_parameter" => {
                self.set_use_slack_parameter(parse_value(name, value)?);
                Ok(())
            }
            "empty_context" => {
                let policy = EmptyContextPolicy::parse(value).ok_or_else(|| {
                    Error::InvalidParameterValue {
                        name: name.to_string(),
                        value: value.to_string(),
                    }
                })?;
                self.set_empty_context_policy(policy);
                Ok(())
            }
            _ => Err(Error::UnknownParameter(name.to_string())),
        }
    }

    /// Get a parameter by name in its string form
    pub fn get(&self, name: &str) -> Result<String> {
        let value = match name {
            "max_iterations" => self.max_iterations.to_string(),
            "cutoff" => self.cutoff.to_string(),
            "ll_threshold" => self.ll_threshold.to_string(),
            "simple_smoothing" => self.use_simple_smoothing().to_string(),
            "smoothing_observation" => self.smoothing_observation.to_string(),
            "gaussian_smoothing" => self.use_gaussian_smoothing().to_string(),
            "sigma" => self.sigma.to_string(),
            "slack_parameter" => self.use_slack_parameter().to_string(),
            "empty_context" => self.empty_context.as_str().to_string(),
            _ => return Err(Error::UnknownParameter(name.to_string())),
        };
        Ok(value)
    }
}

/// Statistics of one pass over the event table
struct PassStats {
    log_likelihood: f64,
    accuracy: f64,
}

/// All mutable state of one training run.
///
/// The table and every per-parameter array live here and are released
/// together when the run ends.
pub(crate) struct TrainingState<'a> {
    table: IndexedEventTable,
    prior: &'a dyn Prior,
    smoothing: Smoothing,
    sigma: f64,
    params: Parameters,
    /// Weights and correction weight before the last update
    previous: (Vec<f64>, f64),
    /// ln of the observed expectation of every parameter
    observed_ln: Vec<f64>,
    /// Raw observed expectation of every parameter
    observed: Vec<f64>,
    model_expected: Vec<f64>,
    correction_observed_ln: f64,
    correction_model: f64,
    probs: Vec<f64>,
    contributions: Vec<u32>,
}

impl<'a> TrainingState<'a> {
    /// Compute active outcome sets, observed expectations and the
    /// correction constant.
    pub(crate) fn initialize(
        table: IndexedEventTable,
        params: &GisParams,
        prior: &'a dyn Prior,
    ) -> Result<Self> {
        let num_outcomes = table.outcomes().len();
        let num_predicates = table.predicates().len();
        if table.is_empty() || num_outcomes == 0 {
            return Err(Error::NoTrainingData);
        }

        // Correction constant: the largest feature mass of any event
        let mut correction_constant: f64 = 1.0;
        for event in table.events() {
            correction_constant = correction_constant.max(event.value_sum().ceil());
        }

        // Observed (predicate, outcome) mass, merged after a stable sort
        let mut pairs: Vec<(u32, u32, f64)> = Vec::new();
        let mut correction_observed = 0.0;
        for event in table.events() {
            let count = f64::from(event.count);
            for (j, &pid) in event.predicates.iter().enumerate() {
                pairs.push((pid, event.outcome, event.value(j) * count));
            }
            correction_observed += (correction_constant - event.value_sum()) * count;
        }
        pairs.sort_by_key(|&(pid, oid, _)| (pid, oid));
        pairs.dedup_by(|later, earlier| {
            if (later.0, later.1) == (earlier.0, earlier.1) {
                earlier.2 += later.2;
                true
            } else {
                false
            }
        });

        let simple = params.smoothing.contains(Smoothing::SIMPLE);
        let mut active = vec![Vec::new(); num_predicates];
        let mut observed = Vec::with_capacity(pairs.len());
        let mut seen = pairs.iter().peekable();
        for (pid, outcomes) in active.iter_mut().enumerate() {
            let mut counts = Vec::new();
            while let Some(&&(p, oid, mass)) = seen.peek() {
                if p as usize != pid {
                    break;
                }
                counts.push((oid, mass));
                seen.next();
            }
            if simple {
                let mut next = counts.iter().peekable();
                for oid in 0..num_outcomes as u32 {
                    outcomes.push(oid);
                    match next.peek() {
                        Some(&&(o, mass)) if o == oid && mass > 0.0 => {
                            observed.push(mass);
                            next.next();
                        }
                        Some(&&(o, _)) if o == oid => {
                            observed.push(params.smoothing_observation);
                            next.next();
                        }
                        _ => observed.push(params.smoothing_observation),
                    }
                }
            } else {
                for (oid, mass) in counts {
                    if mass > 0.0 {
                        outcomes.push(oid);
                        observed.push(mass);
                    }
                }
            }
        }

        let params_set = Parameters::zeroed(&active, correction_constant);
        let num_params = params_set.num_parameters();
        let correction_observed_ln = if correction_observed > 0.0 {
            correction_observed.ln()
        } else {
            NEAR_ZERO.ln()
        };

        info!(
            "GIS: {} rows ({} events), {} predicates, {} outcomes, {} parameters, correction constant {}",
            table.len(),
            table.total_count(),
            num_predicates,
            num_outcomes,
            num_params,
            correction_constant
        );

        Ok(Self {
            prior,
            smoothing: params.smoothing,
            sigma: params.sigma,
            previous: (vec![0.0; num_params], 0.0),
            observed_ln: observed.iter().map(|o| o.ln()).collect(),
            observed,
            model_expected: vec![0.0; num_params],
            correction_observed_ln,
            correction_model: 0.0,
            probs: vec![0.0; num_outcomes],
            contributions: vec![0; num_outcomes],
            params: params_set,
            table,
        })
    }

    /// Evaluate every event with the current parameters, accumulating
    /// model expectations, log-likelihood and training accuracy.
    fn compute_expectations(&mut self) -> PassStats {
        self.model_expected.fill(0.0);
        self.correction_model = 0.0;
        let slack = self.smoothing.contains(Smoothing::SLACK);
        let correction_constant = self.params.correction_constant();

        let mut log_likelihood = 0.0;
        let mut correct = 0.0;
        let mut total = 0.0;
        for event in &self.table.events {
            eval_kernel(
                &self.params,
                self.prior,
                &event.predicates,
                event.values.as_deref(),
                &mut self.probs,
                &mut self.contributions,
            );
            let count = f64::from(event.count);

            for (j, &pid) in event.predicates.iter().enumerate() {
                let value = event.value(j) * count;
                let range = self.params.range(pid as usize);
                let outcomes = &self.params.flat_outcomes()[range.clone()];
                for (expected, &oid) in self.model_expected[range].iter_mut().zip(outcomes) {
                    *expected += self.probs[oid as usize] * value;
                }
            }

            if slack {
                for (&p, &n) in self.probs.iter().zip(&self.contributions) {
                    self.correction_model += count * p * (correction_constant - f64::from(n));
                }
            }

            log_likelihood += self.probs[event.outcome as usize].ln() * count;
            if best_outcome(&self.probs) == event.outcome as usize {
                correct += count;
            }
            total += count;
        }

        PassStats {
            log_likelihood,
            accuracy: correct / total,
        }
    }

    /// Apply one GIS update from the expectations of the last pass
    fn update(&mut self) {
        self.previous.0.copy_from_slice(self.params.flat_weights());
        self.previous.1 = self.params.correction_weight();

        let gaussian = self.smoothing.contains(Smoothing::GAUSSIAN);
        let correction_constant = self.params.correction_constant();
        let sigma = self.sigma;
        let weights = self.params.flat_weights_mut();
        for (k, weight) in weights.iter_mut().enumerate() {
            let expected = self.model_expected[k];
            if gaussian {
                let step = gaussian_update(
                    *weight,
                    expected,
                    self.observed[k],
                    correction_constant,
                    sigma,
                );
                if step.is_finite() {
                    *weight += step;
                }
            } else if expected > 0.0 {
                *weight += self.observed_ln[k] - expected.ln();
            } else {
                debug!("model expectation of parameter {} is zero, skipping", k);
            }
        }

        if self.smoothing.contains(Smoothing::SLACK) && self.correction_model > 0.0 {
            let weight = self.params.correction_weight()
                + (self.correction_observed_ln - self.correction_model.ln());
            self.params.set_correction_weight(weight);
        }
    }

    /// Roll back the last update
    fn restore_previous(&mut self) {
        let (weights, correction) = &self.previous;
        self.params.flat_weights_mut().copy_from_slice(weights);
        self.params.set_correction_weight(*correction);
    }

    /// Finish the run, keeping only what the model needs
    pub(crate) fn into_parts(self) -> (IndexedEventTable, Parameters) {
        (self.table, self.params)
    }
}

/// Solve `model·exp(C·x) + (w + x)/σ − observed = 0` for `x` by Newton's method.
fn gaussian_update(weight: f64, model: f64, observed: f64, c: f64, sigma: f64) -> f64 {
    let mut x0 = 0.0;
    for _ in 0..50 {
        let tmp = model * (c * x0).exp();
        let f = tmp + (weight + x0) / sigma - observed;
        let fp = tmp * c + 1.0 / sigma;
        if fp == 0.0 {
            break;
        }
        let x = x0 - f / fp;
        if (x - x0).abs() < 1e-6 {
            x0 = x;
            break;
        }
        x0 = x;
    }
    x0
}

/// Run GIS iterations until a terminal state is reached
pub(crate) fn run<F>(
    state: &mut TrainingState<'_>,
    params: &GisParams,
    mut progress: F,
) -> TrainingReport
where
    F: FnMut(&Progress) -> bool,
{
    let mut report = TrainingReport::default();
    let mut termination = Termination::MaxIterationsReached;
    let mut prev_ll: Option<f64> = None;

    for iteration in 1..=params.max_iterations {
        let stats = state.compute_expectations();
        let ll = stats.log_likelihood;
        debug!(
            "iteration {}: log-likelihood = {:.6}, accuracy = {:.5}",
            iteration, ll, stats.accuracy
        );
        report.iterations = iteration;
        report.log_likelihoods.push(ll);
        report.accuracies.push(stats.accuracy);

        if let Some(prev) = prev_ll {
            if ll < prev || ll.is_nan() {
                warn!(
                    "model diverging: log-likelihood decreased from {:.6} to {:.6} at iteration {}, keeping previous parameters",
                    prev, ll, iteration
                );
                state.restore_previous();
                termination = Termination::Diverged;
                break;
            }
            if ll - prev < params.ll_threshold {
                termination = Termination::Converged;
                break;
            }
        }

        let stop = progress(&Progress {
            iteration,
            log_likelihood: ll,
            accuracy: stats.accuracy,
        });
        if stop {
            termination = Termination::Cancelled;
            break;
        }

        prev_ll = Some(ll);
        state.update();
    }

    report.termination = termination;
    info!(
        "GIS training finished: {:?} after {} iterations",
        termination, report.iterations
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prior::UniformPrior;

    #[test]
    fn test_gis_params_defaults() {
        let params = GisParams::default();
        assert_eq!(params.max_iterations(), 100);
        assert_eq!(params.cutoff(), 5);
        assert_eq!(params.sigma(), 2.0);
        assert_eq!(params.smoothing_observation(), 0.1);
        assert_eq!(params.ll_threshold(), 1e-4);
        assert!(params.smoothing().is_empty());
    }

    #[test]
    fn test_smoothing_flags_are_independent() {
        let mut params = GisParams::default();
        params.set_use_simple_smoothing(true);
        params.set_use_slack_parameter(true);
        assert_eq!(params.smoothing(), Smoothing::SIMPLE | Smoothing::SLACK);
        params.set_use_simple_smoothing(false);
        assert_eq!(params.smoothing(), Smoothing::SLACK);
        assert!(!params.use_gaussian_smoothing());
    }

    #[test]
    fn test_set_get_by_name() {
        let mut params = GisParams::default();
        params.set("sigma", "0.5").unwrap();
        params.set("gaussian_smoothing", "true").unwrap();
        params.set("empty_context", "keep").unwrap();
        assert_eq!(params.get("sigma").unwrap(), "0.5");
        assert_eq!(params.get("gaussian_smoothing").unwrap(), "true");
        assert_eq!(params.get("empty_context").unwrap(), "keep");
        assert!(params.set("empty_context", "maybe").is_err());
        assert!(params.get("c2").is_err());
    }

    fn news_table() -> IndexedEventTable {
        use crate::predicate::Event;
        use crate::train::indexer::index;

        let events = vec![
            Event::new("politics", ["the", "united", "nations"]),
            Event::new("politics", ["the", "united", "states", "and"]),
            Event::new("sports", ["manchester", "united"]),
            Event::new("sports", ["manchester", "and", "barca"]),
        ];
        index(events, 1).unwrap()
    }

    #[test]
    fn test_initialize_observed_expectations() {
        let params = GisParams::default();
        let state = TrainingState::initialize(news_table(), &params, &UniformPrior).unwrap();
        assert_eq!(state.params.correction_constant(), 4.0);
        // One parameter per observed (predicate, outcome) pair
        assert_eq!(state.params.num_parameters(), 9);
        assert_eq!(state.observed.iter().sum::<f64>(), 12.0);
        // 1 + 0 + 2 + 1
        assert_eq!(state.correction_observed_ln, 4f64.ln());
    }

    #[test]
    fn test_update_and_restore() {
        let mut params = GisParams::default();
        params.set_use_slack_parameter(true);
        let mut state = TrainingState::initialize(news_table(), &params, &UniformPrior).unwrap();
        let before = state.compute_expectations();
        assert!((before.log_likelihood - 4.0 * 0.5f64.ln()).abs() < 1e-12);

        state.update();
        assert!(state.params.flat_weights().iter().any(|&w| w != 0.0));
        let after = state.compute_expectations();
        assert!(after.log_likelihood > before.log_likelihood);

        state.restore_previous();
        assert!(state.params.flat_weights().iter().all(|&w| w == 0.0));
        assert_eq!(state.params.correction_weight(), 0.0);
    }

    #[test]
    fn test_run_stops_on_cancel() {
        let params = GisParams::default();
        let mut state = TrainingState::initialize(news_table(), &params, &UniformPrior).unwrap();
        let report = run(&mut state, &params, |_| true);
        assert_eq!(report.termination, Termination::Cancelled);
        assert_eq!(report.iterations, 1);
        // Cancelled before the first update
        assert!(state.params.flat_weights().iter().all(|&w| w == 0.0));
    }

    #[test]
    fn test_gaussian_update_solves_equation() {
        let (w, model, observed, c, sigma) = (0.3, 2.0, 3.0, 2.0, 2.0);
        let x = gaussian_update(w, model, observed, c, sigma);
        let f = model * (c * x).exp() + (w + x) / sigma - observed;
        assert!(f.abs() < 1e-6, "residual {}", f);
        assert!(x > 0.0);
    }

    #[test]
    fn test_gaussian_update_zero_derivative() {
        // With no model mass and infinite sigma the derivative vanishes
        assert_eq!(gaussian_update(0.0, 0.0, 1.0, 1.0, f64::INFINITY), 0.0);
    }
}
