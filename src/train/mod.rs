//! Training module for maximum entropy models
//!
//! This module contains the event indexer, which compresses raw events
//! into a deduplicated table, and the GIS trainer, which fits model
//! parameters to that table.

mod indexer;
mod trainer;

// Re-export public types
pub use self::indexer::{index, EmptyContextPolicy, EventIndexer, DEFAULT_CUTOFF};
pub use self::trainer::{
    GisParams, Progress, Smoothing, Termination, Trainer, TrainingReport,
};
