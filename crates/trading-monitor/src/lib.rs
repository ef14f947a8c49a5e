//! Logging setup and plain-text reports of agent state.

mod logging;
pub mod report;

pub use logging::{setup_logging, LogFile};
