pub mod client;
pub mod protocol;
pub mod server;

pub use client::DaemonConnection;
pub use protocol::{Request, Response};
