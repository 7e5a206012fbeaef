use rayon::prelude::*;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::MaxentModel;
use crate::sequence::Sequence;

/// Default number of candidates kept at every position
pub const DEFAULT_BEAM_SIZE: usize = 3;

/// A per-position scoring model
pub trait Classifier {
    /// Number of outcomes scored
    fn num_outcomes(&self) -> usize;

    /// Label of outcome `index`
    fn outcome(&self, index: usize) -> Option<&str>;

    /// Probability distribution over outcomes for a context
    fn score(&self, context: &[String]) -> Vec<f64>;
}

impl Classifier for MaxentModel {
    fn num_outcomes(&self) -> usize {
        MaxentModel::num_outcomes(self)
    }

    fn outcome(&self, index: usize) -> Option<&str> {
        self.outcome_label(index)
    }

    fn score(&self, context: &[String]) -> Vec<f64> {
        self.eval(context)
    }
}

impl<C: Classifier + ?Sized> Classifier for &C {
    fn num_outcomes(&self) -> usize {
        (**self).num_outcomes()
    }

    fn outcome(&self, index: usize) -> Option<&str> {
        (**self).outcome(index)
    }

    fn score(&self, context: &[String]) -> Vec<f64> {
        (**self).score(context)
    }
}

/// Builds the feature context of one position from the input tokens, the
/// outcomes chosen so far and caller-supplied auxiliary data.
pub trait ContextGenerator<T, A: ?Sized> {
    fn context(&self, index: usize, tokens: &[T], history: &[String], aux: &A) -> Vec<String>;
}

impl<T, A: ?Sized, F> ContextGenerator<T, A> for F
where
    F: Fn(usize, &[T], &[String], &A) -> Vec<String>,
{
    fn context(&self, index: usize, tokens: &[T], history: &[String], aux: &A) -> Vec<String> {
        self(index, tokens, history, aux)
    }
}

/// Decides whether an outcome may follow a history at a position
pub trait SequenceValidator<T> {
    fn is_valid(&self, index: usize, tokens: &[T], history: &[String], outcome: &str) -> bool;
}

/// Accepts every outcome
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysValid;

impl<T> SequenceValidator<T> for AlwaysValid {
    fn is_valid(&self, _index: usize, _tokens: &[T], _history: &[String], _outcome: &str) -> bool {
        true
    }
}

impl<T, F> SequenceValidator<T> for F
where
    F: Fn(usize, &[T], &[String], &str) -> bool,
{
    fn is_valid(&self, index: usize, tokens: &[T], history: &[String], outcome: &str) -> bool {
        self(index, tokens, history, outcome)
    }
}

/// Top-K sequence decoder over a per-position classifier
#[derive(Debug, Clone)]
pub struct BeamSearch<C, G, V = AlwaysValid> {
    size: usize,
    classifier: C,
    context_generator: G,
    validator: V,
}

impl<C, G> BeamSearch<C, G> {
    /// Create a decoder keeping `size` candidates per position
    pub fn new(size: usize, classifier: C, context_generator: G) -> Result<Self> {
        if size < 1 {
            return Err(Error::InvalidParameter {
                name: "beam_size",
                reason: "must be at least 1",
            });
        }
        Ok(Self {
            size,
            classifier,
            context_generator,
            validator: AlwaysValid,
        })
    }

    /// Create a decoder keeping [`DEFAULT_BEAM_SIZE`] candidates per position
    pub fn with_default_size(classifier: C, context_generator: G) -> Self {
        Self {
            size: DEFAULT_BEAM_SIZE,
            classifier,
            context_generator,
            validator: AlwaysValid,
        }
    }
}

impl<C, G, V> BeamSearch<C, G, V> {
    /// Restrict which outcomes may extend a candidate
    pub fn with_validator<W>(self, validator: W) -> BeamSearch<C, G, W> {
        BeamSearch {
            size: self.size,
            classifier: self.classifier,
            context_generator: self.context_generator,
            validator,
        }
    }

    /// Number of candidates kept per position
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }
}

impl<C: Classifier, G, V> BeamSearch<C, G, V> {
    /// The highest-scoring outcome sequence for `tokens`
    pub fn best_sequence<T, A>(&self, tokens: &[T], aux: &A) -> Result<Sequence>
    where
        A: ?Sized,
        G: ContextGenerator<T, A>,
        V: SequenceValidator<T>,
    {
        let mut beam = self.search(self.size, tokens, aux, None)?;
        // A successful search always leaves at least one candidate
        Ok(beam.swap_remove(0))
    }

    /// Up to `k` sequences in descending score order, each scoring at
    /// least `min_score` when one is given.
    ///
    /// The beam is widened to `k` when `k` exceeds the beam size.
    pub fn best_sequences<T, A>(
        &self,
        k: usize,
        tokens: &[T],
        aux: &A,
        min_score: Option<f64>,
    ) -> Result<Vec<Sequence>>
    where
        A: ?Sized,
        G: ContextGenerator<T, A>,
        V: SequenceValidator<T>,
    {
        if k < 1 {
            return Err(Error::InvalidParameter {
                name: "num_sequences",
                reason: "must be at least 1",
            });
        }
        let mut beam = self.search(self.size.max(k), tokens, aux, min_score)?;
        if let Some(min_score) = min_score {
            beam.retain(|seq| seq.score() >= min_score);
        }
        beam.truncate(k);
        Ok(beam)
    }

    /// Decode independent inputs in parallel
    pub fn best_sequences_batch<T, S, A>(&self, inputs: &[S], aux: &A) -> Vec<Result<Sequence>>
    where
        S: AsRef<[T]> + Sync,
        A: ?Sized + Sync,
        C: Sync,
        G: ContextGenerator<T, A> + Sync,
        V: SequenceValidator<T> + Sync,
    {
        inputs
            .par_iter()
            .map(|tokens| self.best_sequence(tokens.as_ref(), aux))
            .collect()
    }

    /// Run the search with a beam of `width`, returning the final beam in
    /// descending score order. The result is never empty.
    fn search<T, A>(
        &self,
        width: usize,
        tokens: &[T],
        aux: &A,
        min_score: Option<f64>,
    ) -> Result<Vec<Sequence>>
    where
        A: ?Sized,
        G: ContextGenerator<T, A>,
        V: SequenceValidator<T>,
    {
        let mut beam = vec![Sequence::new()];
        let mut sorted = Vec::with_capacity(self.classifier.num_outcomes());

        for position in 0..tokens.len() {
            let mut next: Vec<Sequence> = Vec::new();
            let mut scored = Vec::with_capacity(beam.len());
            for candidate in &beam {
                let context = self.context_generator.context(
                    position,
                    tokens,
                    candidate.outcomes(),
                    aux,
                );
                let probs = self.classifier.score(&context);

                // Only this candidate's top `width` outcomes are extended
                sorted.clear();
                sorted.extend_from_slice(&probs);
                sorted.sort_unstable_by(|a, b| b.total_cmp(a));
                let threshold = sorted
                    .get(width.min(sorted.len()).saturating_sub(1))
                    .copied()
                    .unwrap_or(f64::NEG_INFINITY);

                for (oid, &p) in probs.iter().enumerate() {
                    if p < threshold {
                        continue;
                    }
                    if let Some(seq) = self.advance(position, tokens, candidate, oid, p) {
                        if min_score.map_or(true, |min| seq.score() >= min) {
                            next.push(seq);
                        }
                    }
                }
                scored.push(probs);
            }

            if next.is_empty() {
                // Pruning left nothing, admit every valid outcome
                for (candidate, probs) in beam.iter().zip(&scored) {
                    for (oid, &p) in probs.iter().enumerate() {
                        if let Some(seq) = self.advance(position, tokens, candidate, oid, p) {
                            next.push(seq);
                        }
                    }
                }
            }

            if next.is_empty() {
                debug!("beam is empty at position {}", position);
                return Err(Error::DecodeInfeasible { position });
            }

            // Stable: equal scores keep discovery order
            next.sort_by(|a, b| b.score().total_cmp(&a.score()));
            next.truncate(width);
            beam = next;
        }

        Ok(beam)
    }

    fn advance<T>(
        &self,
        position: usize,
        tokens: &[T],
        candidate: &Sequence,
        oid: usize,
        prob: f64,
    ) -> Option<Sequence>
    where
        V: SequenceValidator<T>,
    {
        let outcome = self.classifier.outcome(oid)?;
        if self
            .validator
            .is_valid(position, tokens, candidate.outcomes(), outcome)
        {
            Some(candidate.extend(outcome, prob))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scores outcomes from a fixed table indexed by position
    struct Table {
        labels: Vec<String>,
        rows: Vec<Vec<f64>>,
    }

    impl Classifier for Table {
        fn num_outcomes(&self) -> usize {
            self.labels.len()
        }

        fn outcome(&self, index: usize) -> Option<&str> {
            self.labels.get(index).map(String::as_str)
        }

        fn score(&self, context: &[String]) -> Vec<f64> {
            let position: usize = context[0].parse().unwrap();
            self.rows[position].clone()
        }
    }

    fn position_context(index: usize, _tokens: &[&str], _history: &[String], _aux: &()) -> Vec<String> {
        vec![index.to_string()]
    }

    fn table() -> Table {
        Table {
            labels: vec!["A".to_string(), "B".to_string()],
            rows: vec![vec![0.6, 0.4], vec![0.3, 0.7], vec![0.5, 0.5]],
        }
    }

    #[test]
    fn test_best_sequence() {
        let search = BeamSearch::new(2, table(), position_context).unwrap();
        let seq = search.best_sequence(&["x", "y", "z"], &()).unwrap();
        assert_eq!(seq.outcomes(), ["A", "B", "A"]);
        assert!((seq.probability() - 0.6 * 0.7 * 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_length_input() {
        let search = BeamSearch::new(3, table(), position_context).unwrap();
        let empty: [&str; 0] = [];
        let seq = search.best_sequence(&empty, &()).unwrap();
        assert!(seq.is_empty());
        assert_eq!(seq.probability(), 1.0);
    }

    #[test]
    fn test_validator_rejecting_everything_fails() {
        let search = BeamSearch::new(3, table(), position_context).unwrap().with_validator(
            |index: usize, _tokens: &[&str], _history: &[String], _outcome: &str| index != 1,
        );
        let err = search.best_sequence(&["x", "y", "z"], &()).unwrap_err();
        assert!(matches!(err, Error::DecodeInfeasible { position: 1 }));
    }

    #[test]
    fn test_ties_keep_discovery_order() {
        let search = BeamSearch::new(1, table(), position_context).unwrap();
        let seq = search.best_sequence(&["z"; 3], &()).unwrap();
        // position 2 is a tie and "A" is discovered first
        assert_eq!(seq.outcomes()[2], "A");
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(BeamSearch::new(0, table(), position_context).is_err());
        let search = BeamSearch::new(3, table(), position_context).unwrap();
        assert!(search.best_sequences(0, &["x"], &(), None).is_err());
    }
}
