use crate::dictionary::Dictionary;

/// A distinct (predicates, values, outcome) combination with its frequency
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedEvent {
    /// Outcome index
    pub outcome: u32,
    /// Active predicate indices, strictly increasing
    pub predicates: Vec<u32>,
    /// Predicate values parallel to `predicates`, `None` when all are `1.0`
    pub values: Option<Vec<f64>>,
    /// Number of times this combination occurred
    pub count: u32,
}

impl IndexedEvent {
    /// Value of the predicate at position `i`
    #[inline]
    pub fn value(&self, i: usize) -> f64 {
        match &self.values {
            Some(values) => values[i],
            None => 1.0,
        }
    }

    /// Sum of all predicate values
    pub fn value_sum(&self) -> f64 {
        match &self.values {
            Some(values) => values.iter().sum(),
            None => self.predicates.len() as f64,
        }
    }
}

/// The deduplicated, cutoff-filtered form of a training event stream
#[derive(Debug, Clone, Default)]
pub struct IndexedEventTable {
    pub(crate) events: Vec<IndexedEvent>,
    pub(crate) outcomes: Dictionary,
    pub(crate) predicates: Dictionary,
    pub(crate) predicate_counts: Vec<u32>,
    pub(crate) num_raw_events: usize,
    pub(crate) dropped_events: usize,
}

impl IndexedEventTable {
    /// Distinct rows
    pub fn events(&self) -> &[IndexedEvent] {
        &self.events
    }

    /// Number of distinct rows
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if no row survived indexing
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Outcome label table
    pub fn outcomes(&self) -> &Dictionary {
        &self.outcomes
    }

    /// Predicate label table, restricted to predicates that passed the cutoff
    pub fn predicates(&self) -> &Dictionary {
        &self.predicates
    }

    /// Total occurrence count of every kept predicate, by predicate index
    pub fn predicate_counts(&self) -> &[u32] {
        &self.predicate_counts
    }

    /// Number of events read from the input stream
    pub fn num_raw_events(&self) -> usize {
        self.num_raw_events
    }

    /// Number of events dropped because no predicate survived the cutoff
    pub fn dropped_events(&self) -> usize {
        self.dropped_events
    }

    /// Sum of all row counts, i.e. the number of events that are trained on
    pub fn total_count(&self) -> u64 {
        self.events.iter().map(|e| u64::from(e.count)).sum()
    }

    /// Returns `true` if any row carries explicit values
    pub fn is_real_valued(&self) -> bool {
        self.events.iter().any(|e| e.values.is_some())
    }
}
