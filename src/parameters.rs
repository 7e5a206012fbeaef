use crate::error::{Error, Result};

/// Parameters of one predicate
///
/// A view into the flat parameter arrays, pairing each active outcome with
/// its weight.
#[derive(Debug, Clone, Copy)]
pub struct PredicateParams<'a> {
    /// Active outcome indices, strictly increasing
    pub outcomes: &'a [u32],
    /// Weights parallel to `outcomes`
    pub weights: &'a [f64],
}

impl<'a> PredicateParams<'a> {
    /// Number of active outcomes
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns `true` if the predicate has no active outcome
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Iterate over (outcome, weight) pairs
    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + 'a {
        self.outcomes
            .iter()
            .copied()
            .zip(self.weights.iter().copied())
    }

    /// Weight of `outcome`, if active
    pub fn weight(&self, outcome: u32) -> Option<f64> {
        self.outcomes
            .binary_search(&outcome)
            .ok()
            .map(|i| self.weights[i])
    }
}

/// Sparse per-predicate weights plus the correction feature
///
/// Predicate `p` owns the entries `offsets[p]..offsets[p + 1]` of the flat
/// `outcomes` and `weights` arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    offsets: Vec<usize>,
    outcomes: Vec<u32>,
    weights: Vec<f64>,
    correction_constant: f64,
    correction_weight: f64,
}

impl Parameters {
    /// Assemble parameters from flat arrays, checking every structural
    /// invariant.
    pub fn from_parts(
        num_outcomes: usize,
        offsets: Vec<usize>,
        outcomes: Vec<u32>,
        weights: Vec<f64>,
        correction_constant: f64,
        correction_weight: f64,
    ) -> Result<Self> {
        if offsets.first() != Some(&0) {
            return Err(Error::invalid_model("parameter offsets must start at zero"));
        }
        if offsets.last() != Some(&outcomes.len()) || outcomes.len() != weights.len() {
            return Err(Error::invalid_model("parameter arrays have inconsistent sizes"));
        }
        for w in offsets.windows(2) {
            if w[0] > w[1] || w[1] > outcomes.len() {
                return Err(Error::invalid_model("parameter offsets must be non-decreasing"));
            }
            let active = &outcomes[w[0]..w[1]];
            if active.iter().any(|&o| o as usize >= num_outcomes) {
                return Err(Error::invalid_model("parameter refers to an unknown outcome"));
            }
            if active.windows(2).any(|pair| pair[0] >= pair[1]) {
                return Err(Error::invalid_model(
                    "active outcomes must be strictly increasing",
                ));
            }
        }
        if !(correction_constant.is_finite() && correction_constant >= 1.0) {
            return Err(Error::invalid_model("correction constant must be at least 1"));
        }
        if !correction_weight.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(Error::invalid_model("weights must be finite"));
        }
        Ok(Self {
            offsets,
            outcomes,
            weights,
            correction_constant,
            correction_weight,
        })
    }

    /// Zero-weight parameters for the given active outcome sets
    pub(crate) fn zeroed(active: &[Vec<u32>], correction_constant: f64) -> Self {
        let mut offsets = Vec::with_capacity(active.len() + 1);
        let mut outcomes = Vec::with_capacity(active.iter().map(Vec::len).sum());
        offsets.push(0);
        for set in active {
            outcomes.extend_from_slice(set);
            offsets.push(outcomes.len());
        }
        let weights = vec![0.0; outcomes.len()];
        Self {
            offsets,
            outcomes,
            weights,
            correction_constant,
            correction_weight: 0.0,
        }
    }

    /// Number of predicates
    pub fn num_predicates(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total number of (predicate, outcome) weights
    pub fn num_parameters(&self) -> usize {
        self.weights.len()
    }

    /// Parameters of predicate `pid`
    #[inline]
    pub fn predicate(&self, pid: usize) -> PredicateParams<'_> {
        let range = self.offsets[pid]..self.offsets[pid + 1];
        PredicateParams {
            outcomes: &self.outcomes[range.clone()],
            weights: &self.weights[range],
        }
    }

    /// Range of predicate `pid` in the flat arrays
    #[inline]
    pub(crate) fn range(&self, pid: usize) -> std::ops::Range<usize> {
        self.offsets[pid]..self.offsets[pid + 1]
    }

    pub(crate) fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub(crate) fn flat_outcomes(&self) -> &[u32] {
        &self.outcomes
    }

    pub(crate) fn flat_weights(&self) -> &[f64] {
        &self.weights
    }

    pub(crate) fn flat_weights_mut(&mut self) -> &mut [f64] {
        &mut self.weights
    }

    /// Upper bound on the feature mass of any event
    pub fn correction_constant(&self) -> f64 {
        self.correction_constant
    }

    /// Weight of the correction (slack) feature
    pub fn correction_weight(&self) -> f64 {
        self.correction_weight
    }

    pub(crate) fn set_correction_weight(&mut self, weight: f64) {
        self.correction_weight = weight;
    }
}
