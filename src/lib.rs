//! Maximum entropy (log-linear) classifiers trained with Generalized
//! Iterative Scaling, and beam-search decoding of outcome sequences.
//!
//! # Examples
//!
//! ## Training
//!
//! ```no_run
//! use maxent::train::Trainer;
//! use maxent::ModelFormat;
//!
//! let mut trainer = Trainer::new().with_cutoff(1);
//! trainer.append("sports", ["manchester", "united", "goal"]);
//! trainer.append("politics", ["united", "nations", "vote"]);
//!
//! trainer.set("max_iterations", "50")?;
//! let model = trainer.train()?;
//! model.save("model.bin", ModelFormat::Binary)?;
//! # Ok::<(), maxent::Error>(())
//! ```
//!
//! ## Prediction
//!
//! ```no_run
//! use maxent::MaxentModel;
//!
//! let model = MaxentModel::load("model.bin")?;
//! let probs = model.eval(&["united", "vote"]);
//! println!("{}", model.all_outcomes(&probs));
//! # Ok::<(), maxent::Error>(())
//! ```
//!
//! ## Sequence decoding
//!
//! ```no_run
//! use maxent::{BeamSearch, MaxentModel};
//!
//! let model = MaxentModel::load("tagger.bin")?;
//! let context = |i: usize, tokens: &[&str], history: &[String], _: &()| {
//!     let prev = history.last().map_or("BOS", String::as_str);
//!     vec![format!("w={}", tokens[i]), format!("prev={}", prev)]
//! };
//! let search = BeamSearch::with_default_size(&model, context);
//! let best = search.best_sequence(&["John", "lives", "here"], &())?;
//! println!("{:?}", best.outcomes());
//! # Ok::<(), maxent::Error>(())
//! ```

mod beam_search;
mod dataset;
mod dictionary;
mod error;
mod model;
mod parameters;
mod predicate;
mod sequence;

pub mod format;
pub mod prior;
/// Event indexing and GIS training
pub mod train;

// Re-export main types
pub use self::beam_search::{
    AlwaysValid, BeamSearch, Classifier, ContextGenerator, SequenceValidator, DEFAULT_BEAM_SIZE,
};
pub use self::dataset::{IndexedEvent, IndexedEventTable};
pub use self::dictionary::Dictionary;
pub use self::error::{Error, Result};
pub use self::format::ModelFormat;
pub use self::model::{best_outcome, MaxentModel};
pub use self::parameters::{Parameters, PredicateParams};
pub use self::predicate::{Event, Predicate};
pub use self::sequence::Sequence;

// Re-export training types for convenience
pub use self::train::{EventIndexer, GisParams, Smoothing, Trainer};
