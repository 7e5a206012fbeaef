use std::fmt;

/// A (possibly partial) outcome sequence produced by beam search.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sequence {
    outcomes: Vec<String>,
    probs: Vec<f64>,
    score: f64,
}

impl Sequence {
    /// The empty sequence, with log score 0
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of this sequence extended by one outcome
    pub(crate) fn extend(&self, outcome: &str, prob: f64) -> Self {
        let mut outcomes = Vec::with_capacity(self.outcomes.len() + 1);
        outcomes.extend_from_slice(&self.outcomes);
        outcomes.push(outcome.to_string());
        let mut probs = Vec::with_capacity(self.probs.len() + 1);
        probs.extend_from_slice(&self.probs);
        probs.push(prob);
        Self {
            outcomes,
            probs,
            score: self.score + prob.ln(),
        }
    }

    /// Outcome labels, one per input position
    pub fn outcomes(&self) -> &[String] {
        &self.outcomes
    }

    /// Probability the model gave each outcome when it was chosen
    pub fn probs(&self) -> &[f64] {
        &self.probs
    }

    /// Sum of the log probabilities
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Probability of the whole sequence
    pub fn probability(&self) -> f64 {
        self.score.exp()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6} [", self.score)?;
        for (i, outcome) in self.outcomes.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", outcome)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sequence() {
        let seq = Sequence::new();
        assert!(seq.is_empty());
        assert_eq!(seq.score(), 0.0);
        assert_eq!(seq.probability(), 1.0);
    }

    #[test]
    fn test_extend_accumulates_log_probs() {
        let seq = Sequence::new().extend("B", 0.5).extend("I", 0.25);
        assert_eq!(seq.outcomes(), ["B", "I"]);
        assert_eq!(seq.probs(), [0.5, 0.25]);
        assert!((seq.score() - 0.125f64.ln()).abs() < 1e-12);
        assert!((seq.probability() - 0.125).abs() < 1e-12);
        assert_eq!(seq.to_string(), format!("{:.6} [B I]", 0.125f64.ln()));
    }
}
