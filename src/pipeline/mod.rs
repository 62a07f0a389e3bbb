pub mod persist;
pub mod push;
pub mod runner;

pub use persist::{PersistError, Persister};
pub use push::{run_push, PushRun, PushSource, PushSummary};
pub use runner::{
    run_batch, run_processor, run_stream, BatchRun, BatchSummary, LoopState, LoopSummary, ProcessorRun, RunError,
    StreamRun, UnitOutcome,
};
