//! Sequence evaluation: single-sequence scoring and the parallel worker pool.

pub mod cancellation;
pub mod pool;
pub mod sequence;

pub use cancellation::{Cancellable, CancellationToken};
pub use pool::{
    BatchEvaluation, DetailedProgressCallback, ProgressCallback, WorkerPool, DEFAULT_WORKERS,
};
pub use sequence::{compare_results, evaluate_sequence, evaluate_single, simulate, SequenceComparison};
