use std::sync::Arc;

use tracing::info;

use super::indexer::{EmptyContextPolicy, EventIndexer};
use crate::dataset::IndexedEventTable;
use crate::error::{Error, Result};
use crate::model::MaxentModel;
use crate::predicate::{Event, Predicate};
use crate::prior::{Prior, UniformPrior};

mod gis;

pub use self::gis::{GisParams, Smoothing};
use self::gis::TrainingState;

/// Why a training run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Termination {
    /// The log-likelihood improvement fell below the threshold
    Converged,
    /// The iteration budget was used up
    #[default]
    MaxIterationsReached,
    /// The log-likelihood decreased; the parameters of the previous
    /// iteration were kept
    Diverged,
    /// The progress callback asked to stop
    Cancelled,
}

/// Per-iteration statistics handed to a progress callback
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    /// 1-based iteration number
    pub iteration: usize,
    /// Log-likelihood of the training data before this iteration's update
    pub log_likelihood: f64,
    /// Fraction of training events whose true outcome is the best outcome
    pub accuracy: f64,
}

/// Summary of a training run
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub termination: Termination,
    /// Number of passes over the training data
    pub iterations: usize,
    /// Log-likelihood at each pass
    pub log_likelihoods: Vec<f64>,
    /// Training accuracy at each pass
    pub accuracies: Vec<f64>,
}

impl TrainingReport {
    /// Log-likelihood measured in the last pass
    pub fn final_log_likelihood(&self) -> Option<f64> {
        self.log_likelihoods.last().copied()
    }
}

/// Maximum entropy trainer using Generalized Iterative Scaling
#[derive(Debug)]
pub struct Trainer {
    /// Training events
    events: Vec<Event>,
    /// Training parameters
    params: GisParams,
    /// Prior shared with the trained model
    prior: Arc<dyn Prior>,
}

impl Default for Trainer {
    fn default() -> Self {
        Self::new()
    }
}

impl Trainer {
    /// Create a new trainer
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            params: GisParams::default(),
            prior: Arc::new(UniformPrior),
        }
    }

    /// Get training parameters
    pub fn params(&self) -> &GisParams {
        &self.params
    }

    /// Get training parameters for mutation
    pub fn params_mut(&mut self) -> &mut GisParams {
        &mut self.params
    }

    /// Set a training parameter by name
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        self.params.set(name, value)
    }

    /// Get a training parameter by name
    pub fn get(&self, name: &str) -> Result<String> {
        self.params.get(name)
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Result<Self> {
        self.params.set_max_iterations(max_iterations)?;
        Ok(self)
    }

    pub fn with_cutoff(mut self, cutoff: u32) -> Self {
        self.params.set_cutoff(cutoff);
        self
    }

    pub fn with_smoothing(mut self, smoothing: Smoothing) -> Self {
        self.params.set_smoothing(smoothing);
        self
    }

    pub fn with_sigma(mut self, sigma: f64) -> Result<Self> {
        self.params.set_sigma(sigma)?;
        Ok(self)
    }

    pub fn with_empty_context_policy(mut self, policy: EmptyContextPolicy) -> Self {
        self.params.set_empty_context_policy(policy);
        self
    }

    /// Use a prior other than the uniform one
    pub fn with_prior(mut self, prior: Arc<dyn Prior>) -> Self {
        self.prior = prior;
        self
    }

    /// The prior the trained model will evaluate with
    pub fn prior(&self) -> &Arc<dyn Prior> {
        &self.prior
    }

    /// Append a training event
    pub fn append<O, I, P>(&mut self, outcome: O, context: I)
    where
        O: Into<String>,
        I: IntoIterator<Item = P>,
        P: Into<Predicate>,
    {
        self.events.push(Event::new(outcome, context));
    }

    /// Append a batch of training events
    pub fn append_all<I: IntoIterator<Item = Event>>(&mut self, events: I) {
        self.events.extend(events);
    }

    /// Number of appended events
    pub fn num_events(&self) -> usize {
        self.events.len()
    }

    /// Remove all appended events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Indexer configured from the training parameters
    pub fn indexer(&self) -> EventIndexer {
        EventIndexer::new(self.params.cutoff())
            .with_empty_context_policy(self.params.empty_context_policy())
    }

    /// Index the appended events and train a model
    pub fn train(&self) -> Result<MaxentModel> {
        self.train_with_report().map(|(model, _)| model)
    }

    /// Index the appended events and train a model, also returning a
    /// summary of the run
    pub fn train_with_report(&self) -> Result<(MaxentModel, TrainingReport)> {
        if self.events.is_empty() {
            return Err(Error::NoTrainingData);
        }
        let table = self.indexer().index(self.events.iter().cloned())?;
        self.train_indexed(table)
    }

    /// Train a model from an already indexed event table
    pub fn train_indexed(&self, table: IndexedEventTable) -> Result<(MaxentModel, TrainingReport)> {
        self.train_indexed_with_progress(table, |_| false)
    }

    /// Train a model from an already indexed event table.
    ///
    /// `progress` is called once per iteration; returning `true` stops
    /// training and keeps the current parameters.
    pub fn train_indexed_with_progress<F>(
        &self,
        table: IndexedEventTable,
        progress: F,
    ) -> Result<(MaxentModel, TrainingReport)>
    where
        F: FnMut(&Progress) -> bool,
    {
        info!(
            "training on {} rows from {} events ({} dropped)",
            table.len(),
            table.num_raw_events(),
            table.dropped_events()
        );
        let mut state = TrainingState::initialize(table, &self.params, self.prior.as_ref())?;
        let report = gis::run(&mut state, &self.params, progress);
        let (table, params) = state.into_parts();
        let IndexedEventTable {
            outcomes,
            predicates,
            ..
        } = table;
        let model = MaxentModel::new(outcomes, predicates, params)?.with_prior(self.prior.clone());
        Ok((model, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_trainer() -> Trainer {
        let mut trainer = Trainer::new().with_cutoff(0);
        for _ in 0..3 {
            trainer.append("sunny", ["sky=clear", "temp=warm"]);
            trainer.append("rainy", ["sky=cloudy", "temp=cold"]);
        }
        trainer.append("sunny", ["sky=cloudy", "temp=warm"]);
        trainer
    }

    #[test]
    fn test_train_separable_data() {
        let trainer = toy_trainer();
        let (model, report) = trainer.train_with_report().unwrap();
        assert!(report.iterations >= 1);
        assert_eq!(report.log_likelihoods.len(), report.iterations);
        let probs = model.eval(&["sky=clear", "temp=warm"]);
        assert_eq!(model.best_outcome_label(&probs), Some("sunny"));
        let probs = model.eval(&["sky=cloudy", "temp=cold"]);
        assert_eq!(model.best_outcome_label(&probs), Some("rainy"));
    }

    #[test]
    fn test_train_without_events() {
        assert!(matches!(Trainer::new().train(), Err(Error::NoTrainingData)));
    }

    #[test]
    fn test_everything_cut_off() {
        let mut trainer = Trainer::new().with_cutoff(100);
        trainer.append("a", ["x"]);
        assert!(matches!(trainer.train(), Err(Error::NoTrainingData)));
    }

    #[test]
    fn test_progress_cancels() {
        let trainer = toy_trainer();
        let table = trainer.indexer().index(trainer.events.iter().cloned()).unwrap();
        let mut calls = 0;
        let (_, report) = trainer
            .train_indexed_with_progress(table, |p| {
                calls += 1;
                assert_eq!(p.iteration, calls);
                p.iteration == 2
            })
            .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(report.termination, Termination::Cancelled);
        assert_eq!(report.iterations, 2);
    }

    #[test]
    fn test_clear() {
        let mut trainer = toy_trainer();
        assert_eq!(trainer.num_events(), 7);
        trainer.clear();
        assert_eq!(trainer.num_events(), 0);
    }
}
