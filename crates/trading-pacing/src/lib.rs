//! Request pacing and humanization.
//!
//! Independent of the rest of the agent: the [`Humanizer`] decides how long
//! to wait before acting, whether the clock allows trading at all, how an
//! order is split into chunks and whether the action budget is spent.

mod config;
mod error;
mod humanizer;

pub use config::PacingConfig;
pub use error::PacingError;
pub use humanizer::{ActionGate, Humanizer, TimeGate, MAX_DELAY_MS, MIN_DELAY_MS};
