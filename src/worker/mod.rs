//! The execution engine: spawns job processes one at a time as the run
//! slot frees up, redirects their output, and reports pid, output path
//! and exit code back to the queue core.

pub mod executor;

pub use executor::{JobExecutor, RunningJob};
