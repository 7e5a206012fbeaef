use std::cmp::Ordering;

use tracing::{debug, info, warn};

use crate::dataset::{IndexedEvent, IndexedEventTable};
use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use crate::predicate::Event;

/// Default minimum number of occurrences for a predicate to be kept
pub const DEFAULT_CUTOFF: u32 = 5;

/// What to do with an event whose context is empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyContextPolicy {
    /// Reject empty input contexts and drop events emptied by the cutoff
    #[default]
    Drop,
    /// Keep such events with no predicates; they only feed the prior and
    /// the correction feature
    Keep,
}

impl EmptyContextPolicy {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Drop => "drop",
            Self::Keep => "keep",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "drop" => Some(Self::Drop),
            "keep" => Some(Self::Keep),
            _ => None,
        }
    }
}

/// Compresses a stream of events into an [`IndexedEventTable`]
#[derive(Debug, Clone, Copy)]
pub struct EventIndexer {
    cutoff: u32,
    empty_context: EmptyContextPolicy,
}

impl Default for EventIndexer {
    fn default() -> Self {
        Self::new(DEFAULT_CUTOFF)
    }
}

/// An event after validation, with predicates interned into a scratch
/// dictionary that still contains every predicate.
struct RawEvent {
    outcome: String,
    context: Vec<(u32, f64)>,
}

impl EventIndexer {
    /// Create an indexer keeping predicates seen at least `cutoff` times
    pub fn new(cutoff: u32) -> Self {
        Self {
            cutoff,
            empty_context: EmptyContextPolicy::default(),
        }
    }

    /// Set the policy for events with empty contexts (builder pattern)
    pub fn with_empty_context_policy(mut self, policy: EmptyContextPolicy) -> Self {
        self.empty_context = policy;
        self
    }

    /// Minimum predicate frequency
    pub fn cutoff(&self) -> u32 {
        self.cutoff
    }

    /// Policy for events with empty contexts
    pub fn empty_context_policy(&self) -> EmptyContextPolicy {
        self.empty_context
    }

    /// Index the events in a single pass.
    ///
    /// Every event is held in memory until predicate frequencies are known.
    pub fn index<I>(&self, events: I) -> Result<IndexedEventTable>
    where
        I: IntoIterator<Item = Event>,
    {
        let mut all_preds = Dictionary::new();
        let mut counts: Vec<u32> = Vec::new();
        let mut raw = Vec::new();

        for (index, event) in events.into_iter().enumerate() {
            self.validate(index, &event)?;
            let mut context = Vec::with_capacity(event.context.len());
            for pred in &event.context {
                let pid = all_preds.get_or_insert(&pred.name);
                if pid as usize == counts.len() {
                    counts.push(0);
                }
                counts[pid as usize] += 1;
                context.push((pid, pred.value));
            }
            raw.push(RawEvent {
                outcome: event.outcome,
                context,
            });
        }

        let (predicates, pmap, predicate_counts) = self.apply_cutoff(&all_preds, &counts);
        let num_raw_events = raw.len();
        let mut builder = RowBuilder::new(self.empty_context);
        for event in raw {
            let context = event
                .context
                .into_iter()
                .filter_map(|(pid, value)| pmap[pid as usize].map(|new_pid| (new_pid, value)))
                .collect();
            builder.push(&event.outcome, context);
        }

        Ok(builder.finish(predicates, predicate_counts, num_raw_events))
    }

    /// Index the events in two passes over the source.
    ///
    /// The first pass only counts predicate frequencies so rare predicates
    /// are never stored. `source` is called once per pass and must yield
    /// the same events both times.
    pub fn index_two_pass<F, I>(&self, mut source: F) -> Result<IndexedEventTable>
    where
        F: FnMut() -> I,
        I: IntoIterator<Item = Event>,
    {
        let mut all_preds = Dictionary::new();
        let mut counts: Vec<u32> = Vec::new();
        let mut num_raw_events = 0;

        for (index, event) in source().into_iter().enumerate() {
            self.validate(index, &event)?;
            for pred in &event.context {
                let pid = all_preds.get_or_insert(&pred.name);
                if pid as usize == counts.len() {
                    counts.push(0);
                }
                counts[pid as usize] += 1;
            }
            num_raw_events += 1;
        }
        debug!(
            "first pass: {} events, {} distinct predicates",
            num_raw_events,
            all_preds.len()
        );

        let (predicates, _, predicate_counts) = self.apply_cutoff(&all_preds, &counts);
        let mut builder = RowBuilder::new(self.empty_context);
        let mut seen = 0;
        for (index, event) in source().into_iter().enumerate() {
            self.validate(index, &event)?;
            let context = event
                .context
                .iter()
                .filter_map(|pred| predicates.get_id(&pred.name).map(|pid| (pid, pred.value)))
                .collect();
            builder.push(&event.outcome, context);
            seen += 1;
        }
        if seen != num_raw_events {
            return Err(Error::malformed(
                seen.min(num_raw_events),
                format!(
                    "event source yielded {} events on the first pass and {} on the second",
                    num_raw_events, seen
                ),
            ));
        }

        Ok(builder.finish(predicates, predicate_counts, num_raw_events))
    }

    fn validate(&self, index: usize, event: &Event) -> Result<()> {
        if event.outcome.is_empty() {
            return Err(Error::malformed(index, "empty outcome label"));
        }
        if event.context.is_empty() && self.empty_context == EmptyContextPolicy::Drop {
            return Err(Error::malformed(index, "empty context"));
        }
        for pred in &event.context {
            if !pred.value.is_finite() {
                return Err(Error::malformed(
                    index,
                    format!("predicate {:?} has a non-finite value", pred.name),
                ));
            }
            if pred.value < 0.0 {
                return Err(Error::malformed(
                    index,
                    format!("predicate {:?} has a negative value", pred.name),
                ));
            }
        }
        Ok(())
    }

    /// Build the kept predicate table. Kept predicates are renumbered in
    /// order of first appearance.
    fn apply_cutoff(
        &self,
        all_preds: &Dictionary,
        counts: &[u32],
    ) -> (Dictionary, Vec<Option<u32>>, Vec<u32>) {
        let mut predicates = Dictionary::new();
        let mut pmap = vec![None; counts.len()];
        let mut kept_counts = Vec::new();
        for (name, pid) in all_preds.iter() {
            let count = counts[pid as usize];
            if count >= self.cutoff {
                pmap[pid as usize] = Some(predicates.get_or_insert(name));
                kept_counts.push(count);
            }
        }
        debug!(
            "cutoff {} kept {} of {} predicates",
            self.cutoff,
            predicates.len(),
            all_preds.len()
        );
        (predicates, pmap, kept_counts)
    }
}

/// Accumulates rows, then sorts and merges identical ones.
struct RowBuilder {
    empty_context: EmptyContextPolicy,
    outcomes: Dictionary,
    rows: Vec<IndexedEvent>,
    dropped: usize,
}

impl RowBuilder {
    fn new(empty_context: EmptyContextPolicy) -> Self {
        Self {
            empty_context,
            outcomes: Dictionary::new(),
            rows: Vec::new(),
            dropped: 0,
        }
    }

    fn push(&mut self, outcome: &str, mut context: Vec<(u32, f64)>) {
        if context.is_empty() && self.empty_context == EmptyContextPolicy::Drop {
            self.dropped += 1;
            return;
        }

        // Repeated predicates collapse into one entry carrying the summed value
        context.sort_by_key(|&(pid, _)| pid);
        context.dedup_by(|later, earlier| {
            if later.0 == earlier.0 {
                earlier.1 += later.1;
                true
            } else {
                false
            }
        });

        let binary = context.iter().all(|&(_, value)| value == 1.0);
        let predicates = context.iter().map(|&(pid, _)| pid).collect();
        let values = if binary {
            None
        } else {
            Some(context.iter().map(|&(_, value)| value).collect())
        };
        self.rows.push(IndexedEvent {
            outcome: self.outcomes.get_or_insert(outcome),
            predicates,
            values,
            count: 1,
        });
    }

    fn finish(
        mut self,
        predicates: Dictionary,
        predicate_counts: Vec<u32>,
        num_raw_events: usize,
    ) -> IndexedEventTable {
        self.rows.sort_by(compare_rows);
        self.rows.dedup_by(|later, earlier| {
            if compare_rows(later, earlier) == Ordering::Equal {
                earlier.count += later.count;
                true
            } else {
                false
            }
        });

        info!(
            "indexed {} events into {} unique rows ({} predicates, {} outcomes, {} dropped)",
            num_raw_events,
            self.rows.len(),
            predicates.len(),
            self.outcomes.len(),
            self.dropped
        );
        if self.dropped > 0 {
            warn!(
                "dropped {} events left without predicates after applying the cutoff",
                self.dropped
            );
        }

        IndexedEventTable {
            events: self.rows,
            outcomes: self.outcomes,
            predicates,
            predicate_counts,
            num_raw_events,
            dropped_events: self.dropped,
        }
    }
}

fn compare_rows(a: &IndexedEvent, b: &IndexedEvent) -> Ordering {
    a.outcome
        .cmp(&b.outcome)
        .then_with(|| a.predicates.cmp(&b.predicates))
        .then_with(|| match (&a.values, &b.values) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(va), Some(vb)) => va
                .iter()
                .zip(vb)
                .map(|(x, y)| x.total_cmp(y))
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal),
        })
}

/// Index `events` in one pass with the default empty-context policy.
pub fn index<I>(events: I, cutoff: u32) -> Result<IndexedEventTable>
where
    I: IntoIterator<Item = Event>,
{
    EventIndexer::new(cutoff).index(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Predicate;

    fn news() -> Vec<Event> {
        vec![
            Event::new("politics", ["the", "united", "nations"]),
            Event::new("politics", ["the", "united", "states", "and"]),
            Event::new("sports", ["manchester", "united"]),
            Event::new("sports", ["manchester", "and", "barca"]),
        ]
    }

    #[test]
    fn test_index_deduplicates() {
        let mut events = news();
        events.push(Event::new("sports", ["united", "manchester"]));
        let table = index(events, 1).unwrap();

        assert_eq!(table.num_raw_events(), 5);
        assert_eq!(table.len(), 4);
        assert_eq!(table.total_count(), 5);
        assert_eq!(table.outcomes().len(), 2);
        assert_eq!(table.predicates().len(), 7);

        let united = table.predicates().get_id("united").unwrap();
        assert_eq!(table.predicate_counts()[united as usize], 4);

        let merged: Vec<_> = table.events().iter().filter(|e| e.count == 2).collect();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].predicates.len(), 2);
    }

    #[test]
    fn test_cutoff_removes_rare_predicates() {
        let table = index(news(), 2).unwrap();
        let kept: Vec<_> = table.predicates().iter().map(|(s, _)| s).collect();
        assert_eq!(kept, vec!["the", "united", "and", "manchester"]);
        for row in table.events() {
            for w in row.predicates.windows(2) {
                assert!(w[0] < w[1]);
            }
        }
    }

    #[test]
    fn test_empty_after_cutoff_is_dropped_by_default() {
        let events = vec![
            Event::new("a", ["x", "y"]),
            Event::new("a", ["x"]),
            Event::new("b", ["z"]),
        ];
        let table = index(events.clone(), 2).unwrap();
        assert_eq!(table.dropped_events(), 1);
        assert_eq!(table.total_count(), 2);
        // "b" only occurred in the dropped event
        assert_eq!(table.outcomes().len(), 1);

        let table = EventIndexer::new(2)
            .with_empty_context_policy(EmptyContextPolicy::Keep)
            .index(events)
            .unwrap();
        assert_eq!(table.dropped_events(), 0);
        assert_eq!(table.total_count(), 3);
        assert!(table.events().iter().any(|e| e.predicates.is_empty()));
    }

    #[test]
    fn test_duplicate_predicates_are_merged() {
        let events = vec![Event::new("a", ["w=the", "w=cat", "w=the"])];
        let table = index(events, 0).unwrap();
        let row = &table.events()[0];
        assert_eq!(row.predicates, vec![0, 1]);
        assert_eq!(row.values, Some(vec![2.0, 1.0]));
        assert_eq!(table.predicate_counts(), &[2, 1]);
    }

    #[test]
    fn test_real_values_distinguish_rows() {
        let events = vec![
            Event::new("a", vec![Predicate::new("len", 0.5)]),
            Event::new("a", vec![Predicate::new("len", 0.5)]),
            Event::new("a", vec![Predicate::new("len", 1.5)]),
        ];
        let table = index(events, 0).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.is_real_valued());
        let half = table
            .events()
            .iter()
            .find(|e| e.values == Some(vec![0.5]))
            .unwrap();
        assert_eq!(half.count, 2);
    }

    #[test]
    fn test_two_pass_matches_one_pass() {
        let events = news();
        let one = index(events.clone(), 2).unwrap();
        let two = EventIndexer::new(2)
            .index_two_pass(|| events.clone())
            .unwrap();
        assert_eq!(one.events(), two.events());
        assert_eq!(one.predicates(), two.predicates());
        assert_eq!(one.outcomes(), two.outcomes());
        assert_eq!(one.predicate_counts(), two.predicate_counts());
    }

    #[test]
    fn test_malformed_events() {
        let err = index(vec![Event::new("", ["x"])], 0).unwrap_err();
        assert!(err.to_string().contains("empty outcome"));

        let empty: [&str; 0] = [];
        let err = index(vec![Event::new("a", ["x"]), Event::new("a", empty)], 0).unwrap_err();
        assert!(matches!(err, Error::MalformedEvent { index: 1, .. }));

        let err = index(vec![Event::new("a", [("x", f64::NAN)])], 0).unwrap_err();
        assert!(err.to_string().contains("non-finite"));

        let err = index(vec![Event::new("a", [("x", -1.0)])], 0).unwrap_err();
        assert!(err.to_string().contains("negative"));
    }
}
