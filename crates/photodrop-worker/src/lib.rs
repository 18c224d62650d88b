//! Background execution of pipeline jobs.

pub mod dispatcher;

pub use dispatcher::{
    DispatchError, DispatcherConfig, OutcomeSender, TaskDispatcher, TaskId, TaskOutcome,
    HANDLE_PRUNE_THRESHOLD,
};
