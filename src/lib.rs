//! Vitalbench - training harness for clinical time-series benchmarks
//!
//! This crate wraps two classes of predictive models behind one uniform
//! train / evaluate / test / persist contract, plus a declarative
//! preprocessing pipeline for grouped tabular data:
//!
//! - [`models::IterativeWrapper`] - epoch-based gradient training of a
//!   sequence encoder with masking, early stopping and best-checkpoint
//!   reloading
//! - [`models::BatchWrapper`] - single-shot fitting of tabular estimators
//!   with capability-gated class weighting and eval-set early stopping
//! - [`recipe`] - ordered, stateful fit-then-apply transforms over grouped
//!   time-series tables ("recipe steps")
//!
//! # Modules
//!
//! - [`data`] - dataset collaborator interfaces and the batch shape contract
//! - [`recipe`] - selector predicates, steps, and the recipe pipeline
//! - [`models`] - the two wrapper engines, metric suites, losses, and
//!   persisted-results handling
//! - [`device`] - explicit compute-target resolution
//! - [`error`] - crate-wide error type

pub mod data;
pub mod device;
pub mod error;
pub mod models;
pub mod recipe;

pub use error::{Result, VitalError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, VitalError};

    // Data access
    pub use crate::data::{
        BatchIter, InMemorySequenceDataset, SequenceBatch, SequenceDataset, TabularDataset,
    };

    // Compute target
    pub use crate::device::ComputeTarget;

    // Recipe pipeline
    pub use crate::recipe::{
        CenterTransform, ColumnTransform, FillStrategy, HistoricalFun, Recipe, RecipeTable,
        Selector, Step, StepHistorical, StepImputeFill, StepScale, StepTransform,
    };

    // Wrapper engines
    pub use crate::models::{
        AffineLabelScaler, BatchTrainConfig, BatchWrapper, Estimator, EstimatorCaps,
        GradientBooster, GradientBoosterConfig, IterativeTrainConfig, IterativeWrapper,
        LabelScaler, SequenceModel, SequenceOutput, TimestepMlp, TimestepMlpConfig, TrainReport,
        WeightSpec,
    };

    // Metrics and tasks
    pub use crate::models::{
        batch_suite, iterative_suite, Metric, MetricRecord, MetricSuite, MetricValue, TaskKind,
    };
}
