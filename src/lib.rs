pub mod config;
pub mod daemon;
pub mod error;
pub mod ipc;
pub mod shutdown;
pub mod spool;
pub mod tail;
pub mod worker;

pub use error::{Result, SpoolError};
