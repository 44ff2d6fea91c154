//! Frame Execution
//!
//! The executor runs one frame through its bounded attempt loop. The
//! coordinator runs a batch of frames group by group. Both append to the
//! shared [`ExecutionHistory`].

pub mod context;
pub mod coordinator;
pub mod executor;
pub mod history;
pub mod outcome;

pub use context::{BatchContext, ExecutionContext};
pub use coordinator::ParallelCoordinator;
pub use executor::FrameExecutor;
pub use history::{AttemptRecord, BatchSummary, ExecutionHistory, ExecutionRecord};
pub use outcome::{BatchOutcome, FrameOutcome, FrameReport, FrameStatus};
